use serde::{Deserialize, Serialize};

use crate::{Role, UserId};

/// One stored role row per identity, fetched by the identity's id.
///
/// `id` matches the provider's user id 1:1. Display attributes are
/// nullable in storage and stay optional here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleRecord {
    pub id: UserId,
    pub role: Role,
    pub full_name: Option<String>,
    pub company: Option<String>,
}

impl RoleRecord {
    pub fn new(id: UserId, role: Role) -> Self {
        Self {
            id,
            role,
            full_name: None,
            company: None,
        }
    }
}
