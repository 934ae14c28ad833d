use serde::{Deserialize, Serialize};

use gatehouse_core::{Role, RoleRecord, Session, UserId};

/// The privilege-confirmed representation of the current user.
///
/// Exists only in memory while a privileged session is active; recomputed on
/// every successful check and discarded on logout, sign-out, or a failed
/// check. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: UserId,
    pub email: String,
    pub role: Role,
    pub full_name: Option<String>,
    pub company: Option<String>,
}

impl Principal {
    /// Combine a provider session with its role record.
    pub fn from_session(session: Session, record: RoleRecord) -> Self {
        Self {
            id: session.user_id,
            email: session.email,
            role: record.role,
            full_name: record.full_name,
            company: record.company,
        }
    }
}
