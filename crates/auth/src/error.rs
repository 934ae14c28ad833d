//! Authentication error taxonomy.

use thiserror::Error;

use gatehouse_core::{ProviderError, StorageError};

/// Failure reasons surfaced to consumers.
///
/// These are reported as state, not thrown past the public operations;
/// `login` additionally returns the failure to its caller so it can be
/// shown inline. Consumers branch on the presence of a principal, not on
/// the error text.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// The provider could not tell us whether a session exists.
    #[error("session error")]
    Session,

    /// The role record fetch failed (storage-level, not "no record").
    #[error("role lookup failed")]
    RoleLookup,

    /// Valid session, but the role is not in the privileged set.
    #[error("access denied — admin privileges required")]
    AccessDenied,

    /// The privilege check exceeded its budget.
    #[error("timed out")]
    TimedOut,

    /// A check was already running when `login` was called.
    #[error("authentication in progress")]
    AuthenticationInProgress,

    /// Provider-level failure message, passed through verbatim.
    #[error("{0}")]
    Provider(String),
}

impl From<ProviderError> for AuthError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::Session => AuthError::Session,
            ProviderError::AuthenticationFailed(msg) => AuthError::Provider(msg),
            ProviderError::SignOutFailed(msg) => {
                AuthError::Provider(format!("sign out failed: {msg}"))
            }
        }
    }
}

impl From<StorageError> for AuthError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::RoleLookup => AuthError::RoleLookup,
        }
    }
}
