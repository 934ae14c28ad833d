//! The session/role authenticator.
//!
//! One `AuthCore` is owned by the application's composition root and
//! disposed at shutdown. It establishes whether the current provider
//! session belongs to a privileged principal, keeps that decision current
//! as session-change notifications arrive, and never leaves consumers in
//! an indefinite loading state.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

use gatehouse_core::Session;

use crate::error::AuthError;
use crate::principal::Principal;
use crate::provider::{IdentityProvider, RoleStore};
use crate::state::{AuthEvent, AuthPhase, AuthSnapshot, transition};

/// Budget for a privilege check before it is abandoned as timed out.
const CHECK_TIMEOUT: Duration = Duration::from_secs(8);

/// Handle to the authenticator. Cheap to clone; all clones share one state.
#[derive(Clone)]
pub struct AuthCore {
    inner: Arc<Inner>,
}

struct Inner {
    identity: Arc<dyn IdentityProvider>,
    roles: Arc<dyn RoleStore>,
    state_tx: watch::Sender<AuthPhase>,
    /// Re-entrancy flag: a privilege check is currently running.
    checking: AtomicBool,
    /// The initial check has completed (reset by `logout`).
    initialized: AtomicBool,
    /// Cleared on disposal; every async continuation checks it before
    /// touching state.
    alive: AtomicBool,
    /// Bumped whenever a sequence is superseded (timeout, logout,
    /// disposal); a stale continuation fails the epoch comparison and
    /// mutates nothing.
    epoch: AtomicU64,
    check_timeout: Duration,
    listener: Mutex<Option<JoinHandle<()>>>,
}

/// Outcome of the role-record half of the privilege check.
enum Decision {
    Privileged(Principal),
    Denied,
    Failed(AuthError),
}

impl AuthCore {
    pub fn new(identity: Arc<dyn IdentityProvider>, roles: Arc<dyn RoleStore>) -> Self {
        Self::with_check_timeout(identity, roles, CHECK_TIMEOUT)
    }

    /// Construct with a non-default check budget (tests, aggressive UIs).
    pub fn with_check_timeout(
        identity: Arc<dyn IdentityProvider>,
        roles: Arc<dyn RoleStore>,
        check_timeout: Duration,
    ) -> Self {
        let (state_tx, _) = watch::channel(AuthPhase::Uninitialized);
        Self {
            inner: Arc::new(Inner {
                identity,
                roles,
                state_tx,
                checking: AtomicBool::new(false),
                initialized: AtomicBool::new(false),
                alive: AtomicBool::new(true),
                epoch: AtomicU64::new(0),
                check_timeout,
                listener: Mutex::new(None),
            }),
        }
    }

    /// Reactive read access to the auth phase.
    pub fn watch(&self) -> watch::Receiver<AuthPhase> {
        self.inner.state_tx.subscribe()
    }

    /// Current `{ principal, loading, error }` view.
    pub fn snapshot(&self) -> AuthSnapshot {
        self.inner.state_tx.borrow().snapshot()
    }

    /// Run the initial privilege check and subscribe to session changes.
    ///
    /// Safe to call repeatedly: a call while a check is running is dropped,
    /// and a call after a completed check (without an intervening `logout`)
    /// is a no-op.
    pub async fn initialize(&self) {
        self.ensure_listener();

        let resolved = {
            let phase = self.inner.state_tx.borrow();
            self.inner.initialized.load(Ordering::SeqCst) && !phase.loading()
        };
        if resolved {
            return;
        }

        self.inner.run_check().await;
    }

    /// Authenticate with credentials and require a privileged role.
    ///
    /// On privilege denial the provider session is signed out again so no
    /// unprivileged session survives a failed admin login. The failure is
    /// both recorded in state and returned, so forms can show it inline.
    pub async fn login(&self, email: &str, password: &str) -> Result<(), AuthError> {
        let inner = &self.inner;
        let Some(_guard) = inner.begin_check() else {
            return Err(AuthError::AuthenticationInProgress);
        };
        let epoch = inner.next_epoch();
        inner.apply(epoch, AuthEvent::CheckStarted);

        let session = match inner.identity.sign_in_with_password(email, password).await {
            Ok(session) => session,
            Err(err) => {
                let err = AuthError::from(err);
                inner.apply(epoch, AuthEvent::CheckFailed(err.clone()));
                return Err(err);
            }
        };

        match inner.authorize(session).await {
            Decision::Privileged(principal) => {
                if inner.apply(epoch, AuthEvent::Privileged(principal)) {
                    inner.initialized.store(true, Ordering::SeqCst);
                }
                Ok(())
            }
            Decision::Denied => {
                // Sign the unprivileged session back out before reporting.
                if let Err(err) = inner.identity.sign_out().await {
                    tracing::warn!(error = %err, "sign-out after denied login failed");
                }
                inner.apply(epoch, AuthEvent::Denied(AuthError::AccessDenied));
                Err(AuthError::AccessDenied)
            }
            Decision::Failed(err) => {
                inner.apply(epoch, AuthEvent::CheckFailed(err.clone()));
                Err(err)
            }
        }
    }

    /// End the provider session and clear the principal.
    ///
    /// The principal is cleared even when provider sign-out fails: local
    /// state must never claim a privileged session the provider may not
    /// honor. Resets the initial-check marker so the next `initialize`
    /// re-runs the full sequence.
    pub async fn logout(&self) -> Result<(), AuthError> {
        let inner = &self.inner;
        inner.initialized.store(false, Ordering::SeqCst);
        // Supersede any in-flight check; its continuation must not
        // resurrect a principal we are discarding.
        let epoch = inner.next_epoch();

        match inner.identity.sign_out().await {
            Ok(()) => {
                inner.apply(epoch, AuthEvent::NoSession);
                Ok(())
            }
            Err(err) => {
                let err = AuthError::from(err);
                inner.apply(epoch, AuthEvent::CheckFailed(err.clone()));
                Err(err)
            }
        }
    }

    /// Tear down: cancel pending work and release the event subscription.
    ///
    /// Any in-flight sequence that later resolves detects disposal and
    /// performs no state mutation.
    pub fn dispose(&self) {
        self.inner.alive.store(false, Ordering::SeqCst);
        self.inner.next_epoch();
        if let Ok(mut slot) = self.inner.listener.lock() {
            if let Some(handle) = slot.take() {
                handle.abort();
            }
        }
    }

    /// Spawn the session-change listener once per authenticator lifetime.
    fn ensure_listener(&self) {
        let Ok(mut slot) = self.inner.listener.lock() else {
            return;
        };
        if slot.is_some() {
            return;
        }

        let mut rx = self.inner.identity.subscribe();
        let weak = Arc::downgrade(&self.inner);
        *slot = Some(tokio::spawn(async move {
            loop {
                let change = match rx.recv().await {
                    Ok(change) => change,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        // Stale notifications are not retried; the next
                        // one after the current check wins.
                        tracing::debug!(skipped, "session-change stream lagged");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                };

                let Some(inner) = weak.upgrade() else { break };
                if !inner.alive.load(Ordering::SeqCst) {
                    break;
                }

                tracing::debug!(kind = %change.kind, "session change notification");
                // Best-effort re-check; dropped when a check is already
                // running.
                inner.run_check().await;
            }
        }));
    }
}

impl Inner {
    /// Acquire the re-entrancy flag. The guard releases it on every exit
    /// path, early returns and failures included.
    fn begin_check(&self) -> Option<InFlightGuard<'_>> {
        if self.checking.swap(true, Ordering::SeqCst) {
            None
        } else {
            Some(InFlightGuard(&self.checking))
        }
    }

    fn next_epoch(&self) -> u64 {
        self.epoch.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Apply an event unless this sequence was superseded or the
    /// authenticator disposed.
    fn apply(&self, epoch: u64, event: AuthEvent) -> bool {
        if !self.alive.load(Ordering::SeqCst) || self.epoch.load(Ordering::SeqCst) != epoch {
            tracing::debug!(?event, "discarding stale auth event");
            return false;
        }
        self.state_tx.send_modify(|phase| {
            let current = std::mem::replace(phase, AuthPhase::Uninitialized);
            *phase = transition(current, event);
        });
        true
    }

    /// The privilege check sequence, raced against the timeout budget.
    async fn run_check(&self) {
        let Some(_guard) = self.begin_check() else {
            tracing::debug!("privilege check already in flight; dropping request");
            return;
        };
        let epoch = self.next_epoch();
        self.apply(epoch, AuthEvent::CheckStarted);

        match tokio::time::timeout(self.check_timeout, self.privilege_check()).await {
            Ok(event) => {
                // A sequence superseded by logout/disposal must not mark
                // the initial check as completed either.
                if self.apply(epoch, event) {
                    self.initialized.store(true, Ordering::SeqCst);
                }
            }
            Err(_elapsed) => {
                tracing::warn!(
                    budget_ms = self.check_timeout.as_millis() as u64,
                    "privilege check timed out"
                );
                self.apply(epoch, AuthEvent::CheckFailed(AuthError::TimedOut));
                // Supersede the abandoned sequence's epoch as well, so
                // nothing that observed it can mutate state later.
                self.next_epoch();
            }
        }
    }

    /// Session lookup → role lookup → authorization decision.
    async fn privilege_check(&self) -> AuthEvent {
        let session = match self.identity.current_session().await {
            Ok(Some(session)) => session,
            Ok(None) => return AuthEvent::NoSession,
            Err(err) => {
                tracing::warn!(error = %err, "session lookup failed");
                return AuthEvent::CheckFailed(AuthError::Session);
            }
        };

        match self.authorize(session).await {
            Decision::Privileged(principal) => AuthEvent::Privileged(principal),
            Decision::Denied => AuthEvent::Denied(AuthError::AccessDenied),
            Decision::Failed(err) => AuthEvent::CheckFailed(err),
        }
    }

    /// Fetch the role record for a session and decide privilege.
    ///
    /// An unknown role value and a missing record are the same outcome.
    async fn authorize(&self, session: Session) -> Decision {
        match self.roles.fetch_role_record(session.user_id).await {
            Err(err) => {
                tracing::warn!(error = %err, user_id = %session.user_id, "role lookup failed");
                Decision::Failed(AuthError::RoleLookup)
            }
            Ok(Some(record)) if record.role.is_privileged() => {
                Decision::Privileged(Principal::from_session(session, record))
            }
            Ok(_) => Decision::Denied,
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Ok(mut slot) = self.listener.lock() {
            if let Some(handle) = slot.take() {
                handle.abort();
            }
        }
    }
}

/// Releases the "check running" flag when dropped.
struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}
