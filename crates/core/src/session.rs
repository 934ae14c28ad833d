use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::UserId;

/// Provider-issued session handle.
///
/// The provider owns session lifecycle (refresh, expiry, revocation); this
/// is the slice of it the authenticator consumes. The access token is
/// carried opaquely for provider calls that need it and is never inspected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub user_id: UserId,
    pub email: String,
    pub access_token: String,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Kind of session-change notification pushed by the identity provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionEventKind {
    SignedIn,
    SignedOut,
    TokenRefreshed,
}

impl core::fmt::Display for SessionEventKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            SessionEventKind::SignedIn => write!(f, "signed_in"),
            SessionEventKind::SignedOut => write!(f, "signed_out"),
            SessionEventKind::TokenRefreshed => write!(f, "token_refreshed"),
        }
    }
}

/// A session-change notification (event tag + the session after the change).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionChange {
    pub kind: SessionEventKind,
    pub session: Option<Session>,
}
