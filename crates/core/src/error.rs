//! Provider-boundary error model.

use thiserror::Error;

/// Failure reported by the identity provider itself.
///
/// Network failure and provider-side auth corruption are deliberately not
/// distinguished; the provider client does not give us a reliable signal
/// to tell them apart, so they share one variant.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// Session lookup or provider call failed (transport or provider-side).
    #[error("session error")]
    Session,

    /// Sign-in was rejected with a provider-supplied reason.
    #[error("{0}")]
    AuthenticationFailed(String),

    /// Sign-out could not be completed at the provider.
    #[error("sign out failed: {0}")]
    SignOutFailed(String),
}

/// Failure reported by the relational storage backing role records.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("role lookup failed")]
    RoleLookup,
}
