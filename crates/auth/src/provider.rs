//! Provider boundary traits.
//!
//! The hosted backend exposes two services the authenticator consumes: the
//! identity service (sessions, credentials, change notifications) and the
//! relational store holding role records. Both are black boxes here; no
//! atomicity is assumed across their operations.

use async_trait::async_trait;
use tokio::sync::broadcast;

use gatehouse_core::{ProviderError, RoleRecord, Session, SessionChange, StorageError, UserId};

/// The identity provider's session API.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Current session, if any. `Ok(None)` is the normal logged-out case;
    /// `Err` means the provider itself could not answer.
    async fn current_session(&self) -> Result<Option<Session>, ProviderError>;

    /// Authenticate with credentials, establishing a provider session.
    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Session, ProviderError>;

    /// End the current provider session.
    async fn sign_out(&self) -> Result<(), ProviderError>;

    /// Subscribe to session-change notifications (sign-in, sign-out,
    /// token refresh). Dropping the receiver unsubscribes.
    fn subscribe(&self) -> broadcast::Receiver<SessionChange>;
}

/// Role-record storage, keyed by the provider's user id.
#[async_trait]
pub trait RoleStore: Send + Sync {
    async fn fetch_role_record(&self, id: UserId) -> Result<Option<RoleRecord>, StorageError>;
}
