//! Black-box tests for the authenticator against a scripted backend.
//!
//! All timing-sensitive tests run on a paused clock so the 8-second check
//! budget elapses instantly.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast;

use gatehouse_auth::{AuthCore, AuthError, AuthPhase, IdentityProvider, RoleStore};
use gatehouse_core::{
    ProviderError, Role, RoleRecord, Session, SessionChange, SessionEventKind, StorageError,
    UserId,
};

struct MockBackend {
    accounts: Mutex<HashMap<String, (String, UserId)>>,
    roles: Mutex<HashMap<UserId, RoleRecord>>,
    session: Mutex<Option<Session>>,
    events: broadcast::Sender<SessionChange>,

    session_calls: AtomicUsize,
    role_calls: AtomicUsize,

    fail_sessions: AtomicBool,
    hang_sessions: AtomicBool,
    fail_sign_out: AtomicBool,
    session_delay: Mutex<Option<Duration>>,
    role_delay: Mutex<Option<Duration>>,
}

impl MockBackend {
    fn new() -> Arc<Self> {
        let (events, _) = broadcast::channel(16);
        Arc::new(Self {
            accounts: Mutex::new(HashMap::new()),
            roles: Mutex::new(HashMap::new()),
            session: Mutex::new(None),
            events,
            session_calls: AtomicUsize::new(0),
            role_calls: AtomicUsize::new(0),
            fail_sessions: AtomicBool::new(false),
            hang_sessions: AtomicBool::new(false),
            fail_sign_out: AtomicBool::new(false),
            session_delay: Mutex::new(None),
            role_delay: Mutex::new(None),
        })
    }

    fn seed_account(&self, email: &str, password: &str, role: Option<&'static str>) -> UserId {
        let id = UserId::new();
        self.accounts
            .lock()
            .unwrap()
            .insert(email.to_string(), (password.to_string(), id));
        if let Some(role) = role {
            self.roles
                .lock()
                .unwrap()
                .insert(id, RoleRecord::new(id, Role::new(role)));
        }
        id
    }

    /// Pre-establish a session, as if the provider had persisted one.
    fn preset_session(&self, id: UserId, email: &str) {
        *self.session.lock().unwrap() = Some(Session {
            user_id: id,
            email: email.to_string(),
            access_token: "token".to_string(),
            expires_at: None,
        });
    }

    fn set_session_delay(&self, delay: Duration) {
        *self.session_delay.lock().unwrap() = Some(delay);
    }

    fn set_role_delay(&self, delay: Duration) {
        *self.role_delay.lock().unwrap() = Some(delay);
    }

    fn emit(&self, kind: SessionEventKind) {
        let session = self.session.lock().unwrap().clone();
        let _ = self.events.send(SessionChange { kind, session });
    }
}

#[async_trait]
impl IdentityProvider for MockBackend {
    async fn current_session(&self) -> Result<Option<Session>, ProviderError> {
        self.session_calls.fetch_add(1, Ordering::SeqCst);
        if self.hang_sessions.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        let delay = *self.session_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_sessions.load(Ordering::SeqCst) {
            return Err(ProviderError::Session);
        }
        Ok(self.session.lock().unwrap().clone())
    }

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Session, ProviderError> {
        let id = {
            let accounts = self.accounts.lock().unwrap();
            match accounts.get(email) {
                Some((stored, id)) if stored == password => *id,
                _ => {
                    return Err(ProviderError::AuthenticationFailed(
                        "invalid login credentials".to_string(),
                    ));
                }
            }
        };
        let session = Session {
            user_id: id,
            email: email.to_string(),
            access_token: "token".to_string(),
            expires_at: None,
        };
        *self.session.lock().unwrap() = Some(session.clone());
        self.emit(SessionEventKind::SignedIn);
        Ok(session)
    }

    async fn sign_out(&self) -> Result<(), ProviderError> {
        if self.fail_sign_out.load(Ordering::SeqCst) {
            return Err(ProviderError::SignOutFailed("provider unavailable".to_string()));
        }
        *self.session.lock().unwrap() = None;
        self.emit(SessionEventKind::SignedOut);
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<SessionChange> {
        self.events.subscribe()
    }
}

#[async_trait]
impl RoleStore for MockBackend {
    async fn fetch_role_record(&self, id: UserId) -> Result<Option<RoleRecord>, StorageError> {
        self.role_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.role_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.roles.lock().unwrap().get(&id).cloned())
    }
}

fn auth_core(backend: &Arc<MockBackend>) -> AuthCore {
    AuthCore::new(backend.clone(), backend.clone())
}

/// Wait until the watched phase satisfies a predicate, bounded so a broken
/// build fails instead of hanging.
async fn wait_for(
    rx: &mut tokio::sync::watch::Receiver<AuthPhase>,
    pred: impl Fn(&AuthPhase) -> bool,
) {
    tokio::time::timeout(Duration::from_secs(30), async {
        loop {
            if pred(&rx.borrow_and_update()) {
                return;
            }
            rx.changed().await.unwrap();
        }
    })
    .await
    .expect("phase never reached");
}

#[tokio::test(start_paused = true)]
async fn unresponsive_provider_resolves_loading_within_budget() {
    let backend = MockBackend::new();
    backend.hang_sessions.store(true, Ordering::SeqCst);
    let core = auth_core(&backend);

    core.initialize().await;

    let snap = core.snapshot();
    assert!(!snap.loading);
    assert!(snap.principal.is_none());
    assert_eq!(snap.error.as_deref(), Some("timed out"));
}

#[tokio::test(start_paused = true)]
async fn concurrent_initialize_runs_one_check() {
    let backend = MockBackend::new();
    backend.set_session_delay(Duration::from_millis(50));
    let core = auth_core(&backend);

    tokio::join!(core.initialize(), core.initialize());

    assert_eq!(backend.session_calls.load(Ordering::SeqCst), 1);
    assert!(!core.snapshot().loading);
}

#[tokio::test]
async fn denied_login_signs_the_session_back_out() {
    let backend = MockBackend::new();
    backend.seed_account("bob@example.com", "hunter2", Some("user"));
    let core = auth_core(&backend);

    let err = core.login("bob@example.com", "hunter2").await.unwrap_err();
    assert_eq!(err, AuthError::AccessDenied);
    assert_eq!(
        err.to_string(),
        "access denied — admin privileges required"
    );

    // No lingering unprivileged session at the provider.
    assert_eq!(backend.current_session().await.unwrap(), None);

    let snap = core.snapshot();
    assert!(snap.principal.is_none());
    assert_eq!(snap.error.as_deref(), Some("access denied — admin privileges required"));
}

#[tokio::test]
async fn initialize_after_completed_check_is_a_no_op() {
    let backend = MockBackend::new();
    let id = backend.seed_account("alice@example.com", "secret", Some("admin"));
    backend.preset_session(id, "alice@example.com");
    let core = auth_core(&backend);

    core.initialize().await;
    assert!(core.snapshot().principal.is_some());
    let sessions = backend.session_calls.load(Ordering::SeqCst);
    let roles = backend.role_calls.load(Ordering::SeqCst);

    core.initialize().await;
    assert_eq!(backend.session_calls.load(Ordering::SeqCst), sessions);
    assert_eq!(backend.role_calls.load(Ordering::SeqCst), roles);
}

#[tokio::test(start_paused = true)]
async fn timeout_discards_late_role_fetch() {
    let backend = MockBackend::new();
    let id = backend.seed_account("alice@example.com", "secret", Some("admin"));
    backend.preset_session(id, "alice@example.com");
    backend.set_role_delay(Duration::from_secs(10));
    let core = auth_core(&backend);

    core.initialize().await;
    assert_eq!(core.snapshot().error.as_deref(), Some("timed out"));

    // Let the abandoned fetch's deadline pass; the late result must not
    // flip the state to authorized.
    tokio::time::sleep(Duration::from_secs(5)).await;
    let snap = core.snapshot();
    assert!(snap.principal.is_none());
    assert!(!snap.loading);
    assert_eq!(snap.error.as_deref(), Some("timed out"));
}

#[tokio::test(start_paused = true)]
async fn logout_supersedes_in_flight_check() {
    let backend = MockBackend::new();
    let id = backend.seed_account("alice@example.com", "secret", Some("admin"));
    backend.preset_session(id, "alice@example.com");
    backend.set_role_delay(Duration::from_secs(1));
    let core = auth_core(&backend);

    let logout = async {
        tokio::time::sleep(Duration::from_millis(100)).await;
        core.logout().await.unwrap();
    };
    tokio::join!(core.initialize(), logout);

    // The check resolved after logout; its authorized result is discarded.
    let snap = core.snapshot();
    assert!(snap.principal.is_none());
    assert!(!snap.loading);
}

#[tokio::test]
async fn login_logout_round_trip() {
    let backend = MockBackend::new();
    backend.seed_account("alice@example.com", "secret", Some("super_admin"));
    let core = auth_core(&backend);

    core.login("alice@example.com", "secret").await.unwrap();
    let snap = core.snapshot();
    let principal = snap.principal.expect("principal set after login");
    assert!(principal.role.is_privileged());
    assert_eq!(principal.email, "alice@example.com");
    assert!(snap.error.is_none());

    core.logout().await.unwrap();
    let snap = core.snapshot();
    assert!(snap.principal.is_none());
    assert!(snap.error.is_none());
}

#[tokio::test]
async fn unknown_role_behaves_like_missing_record() {
    let backend = MockBackend::new();
    let editor = backend.seed_account("carol@example.com", "secret", Some("editor"));
    backend.preset_session(editor, "carol@example.com");
    let core = auth_core(&backend);
    core.initialize().await;
    let editor_snap = core.snapshot();

    let backend = MockBackend::new();
    let norecord = backend.seed_account("dave@example.com", "secret", None);
    backend.preset_session(norecord, "dave@example.com");
    let core = auth_core(&backend);
    core.initialize().await;
    let norecord_snap = core.snapshot();

    assert!(editor_snap.principal.is_none());
    assert_eq!(editor_snap.error, norecord_snap.error);
    assert_eq!(
        editor_snap.error.as_deref(),
        Some("access denied — admin privileges required")
    );
}

#[tokio::test(start_paused = true)]
async fn login_while_check_running_is_rejected() {
    let backend = MockBackend::new();
    let id = backend.seed_account("alice@example.com", "secret", Some("admin"));
    backend.preset_session(id, "alice@example.com");
    backend.set_role_delay(Duration::from_secs(1));
    let core = auth_core(&backend);

    let late_login = async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        core.login("alice@example.com", "secret").await
    };
    let (_, login) = tokio::join!(core.initialize(), late_login);

    assert_eq!(login.unwrap_err(), AuthError::AuthenticationInProgress);
    // The original check still resolved.
    assert!(core.snapshot().principal.is_some());
}

#[tokio::test]
async fn provider_session_failure_surfaces_session_error() {
    let backend = MockBackend::new();
    backend.fail_sessions.store(true, Ordering::SeqCst);
    let core = auth_core(&backend);

    core.initialize().await;

    let snap = core.snapshot();
    assert!(!snap.loading);
    assert!(snap.principal.is_none());
    assert_eq!(snap.error.as_deref(), Some("session error"));
}

#[tokio::test]
async fn wrong_password_propagates_provider_message() {
    let backend = MockBackend::new();
    backend.seed_account("alice@example.com", "secret", Some("admin"));
    let core = auth_core(&backend);

    let err = core.login("alice@example.com", "wrong").await.unwrap_err();
    assert_eq!(err.to_string(), "invalid login credentials");
    assert_eq!(core.snapshot().error.as_deref(), Some("invalid login credentials"));
}

#[tokio::test]
async fn failed_sign_out_still_clears_principal() {
    let backend = MockBackend::new();
    let id = backend.seed_account("alice@example.com", "secret", Some("admin"));
    backend.preset_session(id, "alice@example.com");
    let core = auth_core(&backend);
    core.initialize().await;
    assert!(core.snapshot().principal.is_some());

    backend.fail_sign_out.store(true, Ordering::SeqCst);
    let err = core.logout().await.unwrap_err();
    assert!(matches!(err, AuthError::Provider(_)));

    let snap = core.snapshot();
    assert!(snap.principal.is_none());
    assert!(snap.error.is_some());
}

#[tokio::test(start_paused = true)]
async fn sign_in_notification_triggers_recheck() {
    let backend = MockBackend::new();
    let core = auth_core(&backend);
    core.initialize().await;
    assert!(core.snapshot().principal.is_none());

    let id = backend.seed_account("alice@example.com", "secret", Some("admin"));
    backend.preset_session(id, "alice@example.com");
    backend.emit(SessionEventKind::SignedIn);

    let mut rx = core.watch();
    wait_for(&mut rx, |phase| matches!(phase, AuthPhase::Authorized(_))).await;
}

#[tokio::test(start_paused = true)]
async fn sign_out_notification_clears_principal() {
    let backend = MockBackend::new();
    let id = backend.seed_account("alice@example.com", "secret", Some("admin"));
    backend.preset_session(id, "alice@example.com");
    let core = auth_core(&backend);
    core.initialize().await;
    assert!(core.snapshot().principal.is_some());

    *backend.session.lock().unwrap() = None;
    backend.emit(SessionEventKind::SignedOut);

    let mut rx = core.watch();
    wait_for(&mut rx, |phase| {
        matches!(phase, AuthPhase::Unauthorized { denied: None })
    })
    .await;
}

#[tokio::test(start_paused = true)]
async fn disposed_core_ignores_late_events() {
    let backend = MockBackend::new();
    let id = backend.seed_account("alice@example.com", "secret", Some("admin"));
    backend.preset_session(id, "alice@example.com");
    backend.set_role_delay(Duration::from_secs(1));
    let core = auth_core(&backend);

    let dispose = async {
        tokio::time::sleep(Duration::from_millis(100)).await;
        core.dispose();
    };
    tokio::join!(core.initialize(), dispose);

    // The in-flight check resolved after disposal and mutated nothing.
    let snap = core.snapshot();
    assert!(snap.principal.is_none());
    assert!(snap.loading);
}
