//! REST identity/role backend for the hosted service.
//!
//! Speaks the backend's password-grant auth API and its relational REST
//! surface for role records. The session is cached locally, the way the
//! vendor's own client persists it, so `current_session` only goes to the
//! network to revalidate an expired token.

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use tokio::sync::broadcast;

use gatehouse_auth::{IdentityProvider, RoleStore};
use gatehouse_core::{
    ProviderError, RoleRecord, Session, SessionChange, SessionEventKind, StorageError, UserId,
};

/// Connection settings for the hosted backend.
#[derive(Debug, Clone)]
pub struct RestConfig {
    /// Service base URL, without a trailing slash.
    pub base_url: String,
    /// Public (anon) API key sent with every request.
    pub api_key: String,
    /// Table holding one role row per user.
    pub role_table: String,
}

impl RestConfig {
    /// Read settings from `GATEHOUSE_API_URL` / `GATEHOUSE_API_KEY` /
    /// `GATEHOUSE_ROLE_TABLE`. Returns `None` when the URL is unset so the
    /// caller can fall back to the in-memory backend.
    pub fn from_env() -> Option<Self> {
        let base_url = std::env::var("GATEHOUSE_API_URL").ok()?;
        let api_key = std::env::var("GATEHOUSE_API_KEY").unwrap_or_else(|_| {
            tracing::warn!("GATEHOUSE_API_KEY not set; sending requests without a key");
            String::new()
        });
        let role_table =
            std::env::var("GATEHOUSE_ROLE_TABLE").unwrap_or_else(|_| "profiles".to_string());
        Some(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            role_table,
        })
    }
}

#[derive(Debug, Deserialize)]
struct TokenUser {
    id: UserId,
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: Option<i64>,
    user: TokenUser,
}

#[derive(Debug, Deserialize)]
struct AuthErrorBody {
    error_description: Option<String>,
    msg: Option<String>,
}

impl AuthErrorBody {
    fn message(self) -> String {
        self.error_description
            .or(self.msg)
            .unwrap_or_else(|| "authentication failed".to_string())
    }
}

pub struct RestBackend {
    http: reqwest::Client,
    config: RestConfig,
    session: Mutex<Option<Session>>,
    events: broadcast::Sender<SessionChange>,
}

impl RestBackend {
    pub fn new(config: RestConfig) -> Self {
        let (events, _) = broadcast::channel(32);
        Self {
            http: reqwest::Client::new(),
            config,
            session: Mutex::new(None),
            events,
        }
    }

    fn cached_session(&self) -> Option<Session> {
        self.session.lock().ok().and_then(|guard| guard.clone())
    }

    fn store_session(&self, session: Option<Session>) {
        if let Ok(mut slot) = self.session.lock() {
            *slot = session;
        }
    }

    fn emit(&self, kind: SessionEventKind) {
        let _ = self.events.send(SessionChange {
            kind,
            session: self.cached_session(),
        });
    }

    fn session_from_token(&self, token: TokenResponse, fallback_email: &str) -> Session {
        Session {
            user_id: token.user.id,
            email: token.user.email.unwrap_or_else(|| fallback_email.to_string()),
            access_token: token.access_token,
            expires_at: token
                .expires_in
                .map(|secs| Utc::now() + chrono::Duration::seconds(secs)),
        }
    }

    /// Ask the auth service whether the cached token is still honored.
    async fn revalidate(&self, session: &Session) -> Result<bool, ProviderError> {
        let response = self
            .http
            .get(format!("{}/auth/v1/user", self.config.base_url))
            .header("apikey", &self.config.api_key)
            .bearer_auth(&session.access_token)
            .send()
            .await
            .map_err(|err| {
                tracing::warn!(error = %err, "session revalidation request failed");
                ProviderError::Session
            })?;

        if response.status() == reqwest::StatusCode::UNAUTHORIZED {
            return Ok(false);
        }
        if !response.status().is_success() {
            tracing::warn!(status = %response.status(), "session revalidation rejected");
            return Err(ProviderError::Session);
        }
        Ok(true)
    }
}

#[async_trait]
impl IdentityProvider for RestBackend {
    async fn current_session(&self) -> Result<Option<Session>, ProviderError> {
        let Some(session) = self.cached_session() else {
            return Ok(None);
        };

        let expired = session
            .expires_at
            .is_some_and(|deadline| deadline <= Utc::now());
        if expired && !self.revalidate(&session).await? {
            self.store_session(None);
            return Ok(None);
        }
        Ok(Some(session))
    }

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Session, ProviderError> {
        let response = self
            .http
            .post(format!(
                "{}/auth/v1/token?grant_type=password",
                self.config.base_url
            ))
            .header("apikey", &self.config.api_key)
            .json(&serde_json::json!({ "email": email, "password": password }))
            .send()
            .await
            .map_err(|err| {
                tracing::warn!(error = %err, "sign-in request failed");
                ProviderError::Session
            })?;

        if !response.status().is_success() {
            let message = response
                .json::<AuthErrorBody>()
                .await
                .map(AuthErrorBody::message)
                .unwrap_or_else(|_| "authentication failed".to_string());
            return Err(ProviderError::AuthenticationFailed(message));
        }

        let token = response.json::<TokenResponse>().await.map_err(|err| {
            tracing::warn!(error = %err, "malformed token response");
            ProviderError::Session
        })?;

        let session = self.session_from_token(token, email);
        self.store_session(Some(session.clone()));
        self.emit(SessionEventKind::SignedIn);
        Ok(session)
    }

    async fn sign_out(&self) -> Result<(), ProviderError> {
        let Some(session) = self.cached_session() else {
            return Ok(());
        };

        let response = self
            .http
            .post(format!("{}/auth/v1/logout", self.config.base_url))
            .header("apikey", &self.config.api_key)
            .bearer_auth(&session.access_token)
            .send()
            .await
            .map_err(|err| ProviderError::SignOutFailed(err.to_string()))?;

        // 401 means the token is already dead; treat it as signed out.
        if !response.status().is_success()
            && response.status() != reqwest::StatusCode::UNAUTHORIZED
        {
            return Err(ProviderError::SignOutFailed(format!(
                "status {}",
                response.status()
            )));
        }

        self.store_session(None);
        self.emit(SessionEventKind::SignedOut);
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<SessionChange> {
        self.events.subscribe()
    }
}

#[async_trait]
impl RoleStore for RestBackend {
    async fn fetch_role_record(&self, id: UserId) -> Result<Option<RoleRecord>, StorageError> {
        let mut request = self
            .http
            .get(format!(
                "{}/rest/v1/{}",
                self.config.base_url, self.config.role_table
            ))
            .header("apikey", &self.config.api_key)
            .query(&[
                ("id", format!("eq.{id}")),
                ("select", "id,role,full_name,company".to_string()),
            ]);
        if let Some(session) = self.cached_session() {
            request = request.bearer_auth(&session.access_token);
        }

        let response = request.send().await.map_err(|err| {
            tracing::warn!(error = %err, "role record request failed");
            StorageError::RoleLookup
        })?;

        if !response.status().is_success() {
            tracing::warn!(status = %response.status(), "role record request rejected");
            return Err(StorageError::RoleLookup);
        }

        let mut rows = response.json::<Vec<RoleRecord>>().await.map_err(|err| {
            tracing::warn!(error = %err, "malformed role record response");
            StorageError::RoleLookup
        })?;

        if rows.len() > 1 {
            tracing::warn!(user_id = %id, "multiple role rows for one user; taking the first");
        }
        Ok(if rows.is_empty() {
            None
        } else {
            Some(rows.remove(0))
        })
    }
}
