//! In-memory identity/role backend for tests and local development.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast;
use uuid::Uuid;

use gatehouse_auth::{IdentityProvider, RoleStore};
use gatehouse_core::{
    ProviderError, Role, RoleRecord, Session, SessionChange, SessionEventKind, StorageError,
    UserId,
};

struct Account {
    password: String,
    user_id: UserId,
}

/// In-memory backend with failure and latency injection.
///
/// Holds at most one session, mirroring the single persisted session of
/// the real provider client.
pub struct MemoryBackend {
    accounts: Mutex<HashMap<String, Account>>,
    roles: Mutex<HashMap<UserId, RoleRecord>>,
    session: Mutex<Option<Session>>,
    events: broadcast::Sender<SessionChange>,

    fail_sessions: AtomicBool,
    role_latency: Mutex<Option<Duration>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(32);
        Self {
            accounts: Mutex::new(HashMap::new()),
            roles: Mutex::new(HashMap::new()),
            session: Mutex::new(None),
            events,
            fail_sessions: AtomicBool::new(false),
            role_latency: Mutex::new(None),
        }
    }

    /// Backend pre-seeded with one admin account for local development.
    pub fn with_dev_fixtures() -> Self {
        let backend = Self::new();
        let id = backend.seed_account("admin@example.com", "admin");
        backend.seed_role(RoleRecord {
            id,
            role: Role::new("admin"),
            full_name: Some("Dev Admin".to_string()),
            company: None,
        });
        backend
    }

    /// Register an account; returns the minted user id.
    pub fn seed_account(&self, email: &str, password: &str) -> UserId {
        let user_id = UserId::new();
        if let Ok(mut accounts) = self.accounts.lock() {
            accounts.insert(
                email.to_string(),
                Account {
                    password: password.to_string(),
                    user_id,
                },
            );
        }
        user_id
    }

    pub fn seed_role(&self, record: RoleRecord) {
        if let Ok(mut roles) = self.roles.lock() {
            roles.insert(record.id, record);
        }
    }

    /// Make `current_session` fail with a provider-level error.
    pub fn fail_sessions(&self, fail: bool) {
        self.fail_sessions.store(fail, Ordering::SeqCst);
    }

    /// Delay role-record fetches (timeout-path exercise).
    pub fn set_role_latency(&self, latency: Option<Duration>) {
        if let Ok(mut slot) = self.role_latency.lock() {
            *slot = latency;
        }
    }

    fn emit(&self, kind: SessionEventKind) {
        let session = self
            .session
            .lock()
            .ok()
            .and_then(|guard| guard.clone());
        // No receivers is fine (nobody subscribed yet).
        let _ = self.events.send(SessionChange { kind, session });
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IdentityProvider for MemoryBackend {
    async fn current_session(&self) -> Result<Option<Session>, ProviderError> {
        if self.fail_sessions.load(Ordering::SeqCst) {
            return Err(ProviderError::Session);
        }
        let session = self
            .session
            .lock()
            .map_err(|_| ProviderError::Session)?
            .clone();
        Ok(session)
    }

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Session, ProviderError> {
        let user_id = {
            let accounts = self
                .accounts
                .lock()
                .map_err(|_| ProviderError::Session)?;
            match accounts.get(email) {
                Some(account) if account.password == password => account.user_id,
                _ => {
                    return Err(ProviderError::AuthenticationFailed(
                        "invalid login credentials".to_string(),
                    ));
                }
            }
        };

        let session = Session {
            user_id,
            email: email.to_string(),
            access_token: Uuid::now_v7().to_string(),
            expires_at: None,
        };
        if let Ok(mut slot) = self.session.lock() {
            *slot = Some(session.clone());
        }
        self.emit(SessionEventKind::SignedIn);
        Ok(session)
    }

    async fn sign_out(&self) -> Result<(), ProviderError> {
        if let Ok(mut slot) = self.session.lock() {
            *slot = None;
        }
        self.emit(SessionEventKind::SignedOut);
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<SessionChange> {
        self.events.subscribe()
    }
}

#[async_trait]
impl RoleStore for MemoryBackend {
    async fn fetch_role_record(&self, id: UserId) -> Result<Option<RoleRecord>, StorageError> {
        let latency = self
            .role_latency
            .lock()
            .ok()
            .and_then(|guard| *guard);
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        let record = self
            .roles
            .lock()
            .map_err(|_| StorageError::RoleLookup)?
            .get(&id)
            .cloned();
        Ok(record)
    }
}
