use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Role identifier attached to a user's role record.
///
/// Roles are intentionally an open string set at this layer; the
/// authenticator only distinguishes the privileged pair below. Every other
/// value (including values added to the backend after this build shipped)
/// is unprivileged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Role(Cow<'static, str>);

/// Roles allowed into the admin back-office.
const PRIVILEGED: [&str; 2] = ["admin", "super_admin"];

impl Role {
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this role grants admin-area access.
    pub fn is_privileged(&self) -> bool {
        PRIVILEGED.contains(&self.0.as_ref())
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}
