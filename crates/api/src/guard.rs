//! Route-guard policy for protected areas.
//!
//! Pure function of the auth snapshot; the HTTP layer maps the decision to
//! responses. While loading, consumers wait (showing the error alongside if
//! one is set); once resolved, absence of a principal means "go log in".

use gatehouse_auth::AuthSnapshot;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    /// A check is still running (or none has completed yet).
    Wait { error: Option<String> },
    /// Resolved, no privileged principal.
    RedirectToLogin,
    /// Resolved with a privileged principal.
    Allow,
}

pub fn evaluate(snapshot: &AuthSnapshot) -> GuardDecision {
    if snapshot.loading {
        return GuardDecision::Wait {
            error: snapshot.error.clone(),
        };
    }
    if snapshot.principal.is_none() {
        return GuardDecision::RedirectToLogin;
    }
    GuardDecision::Allow
}
