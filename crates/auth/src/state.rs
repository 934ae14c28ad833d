//! Authentication state machine.
//!
//! The phase is a tagged variant with a pure transition function so the
//! re-entrancy rule ("a check started while one is running is dropped") is
//! a single match arm rather than scattered flags. `Checking` keeps the
//! previous resolved phase so the exposed principal is never cleared
//! prematurely while a check is in flight.

use serde::Serialize;

use crate::{AuthError, Principal};

/// Current phase of the authenticator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthPhase {
    /// No check has run yet.
    Uninitialized,
    /// A privilege check is in flight; `previous` is the last resolved phase.
    Checking { previous: Box<AuthPhase> },
    /// The most recent check found a privileged role record.
    Authorized(Principal),
    /// Logged out, or authenticated without sufficient privilege
    /// (`denied` carries the denial in the latter case).
    Unauthorized { denied: Option<AuthError> },
    /// The check itself failed (provider error, storage error, timeout).
    Failed(AuthError),
}

/// Events driving phase transitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEvent {
    /// A privilege check (or login) began.
    CheckStarted,
    /// The provider reported no session: the normal logged-out outcome.
    NoSession,
    /// The check found a privileged role record.
    Privileged(Principal),
    /// Valid session, insufficient role (or no role record at all).
    Denied(AuthError),
    /// The check could not complete.
    CheckFailed(AuthError),
}

/// Pure transition function: current phase + event → next phase.
pub fn transition(phase: AuthPhase, event: AuthEvent) -> AuthPhase {
    match (phase, event) {
        // At most one check in flight; a second start is dropped, not queued.
        (p @ AuthPhase::Checking { .. }, AuthEvent::CheckStarted) => p,
        (p, AuthEvent::CheckStarted) => AuthPhase::Checking {
            previous: Box::new(p),
        },
        (_, AuthEvent::NoSession) => AuthPhase::Unauthorized { denied: None },
        (_, AuthEvent::Privileged(principal)) => AuthPhase::Authorized(principal),
        (_, AuthEvent::Denied(err)) => AuthPhase::Unauthorized { denied: Some(err) },
        (_, AuthEvent::CheckFailed(err)) => AuthPhase::Failed(err),
    }
}

impl AuthPhase {
    /// True while a check is in flight or none has completed yet.
    pub fn loading(&self) -> bool {
        matches!(self, AuthPhase::Uninitialized | AuthPhase::Checking { .. })
    }

    /// The current principal. While checking, this is the principal of the
    /// previous resolved phase (no premature clearing).
    pub fn principal(&self) -> Option<&Principal> {
        match self {
            AuthPhase::Authorized(principal) => Some(principal),
            AuthPhase::Checking { previous } => previous.principal(),
            _ => None,
        }
    }

    /// Last failure reason, if any. Cleared when a new check starts.
    pub fn error(&self) -> Option<&AuthError> {
        match self {
            AuthPhase::Failed(err) => Some(err),
            AuthPhase::Unauthorized { denied: Some(err) } => Some(err),
            _ => None,
        }
    }

    /// Flattened view for consumers (route guards, JSON endpoints).
    pub fn snapshot(&self) -> AuthSnapshot {
        AuthSnapshot {
            principal: self.principal().cloned(),
            loading: self.loading(),
            error: self.error().map(ToString::to_string),
        }
    }
}

/// The `{ principal, loading, error }` triple consumers key UI branching on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthSnapshot {
    pub principal: Option<Principal>,
    pub loading: bool,
    pub error: Option<String>,
}
