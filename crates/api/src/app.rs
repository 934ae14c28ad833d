use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    http::{StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::json;

use gatehouse_auth::{AuthCore, AuthError, IdentityProvider, Principal, RoleStore};
use gatehouse_provider::{MemoryBackend, RestBackend, RestConfig};

use crate::guard::{GuardDecision, evaluate};

#[derive(Clone)]
pub struct AppState {
    pub auth: AuthCore,
}

/// Build the production app: pick a backend from the environment,
/// construct the one authenticator, run its initial check, and wire the
/// router. Returns the core alongside so the caller can dispose it at
/// shutdown.
pub async fn build_app() -> (Router, AuthCore) {
    let (identity, roles): (Arc<dyn IdentityProvider>, Arc<dyn RoleStore>) =
        match RestConfig::from_env() {
            Some(config) => {
                tracing::info!(base_url = %config.base_url, "using REST backend");
                let backend = Arc::new(RestBackend::new(config));
                (backend.clone(), backend)
            }
            None => {
                tracing::warn!("GATEHOUSE_API_URL not set; using in-memory dev backend");
                let backend = Arc::new(MemoryBackend::with_dev_fixtures());
                (backend.clone(), backend)
            }
        };

    let auth = AuthCore::new(identity, roles);
    auth.initialize().await;
    (router(auth.clone()), auth)
}

/// Wire routes around an already-constructed authenticator (tests inject
/// their own backend this way).
pub fn router(auth: AuthCore) -> Router {
    let state = AppState { auth };

    let admin = Router::new()
        .route("/admin", get(admin_home))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            admin_guard,
        ));

    Router::new()
        .route("/auth/login", post(login))
        .route("/auth/logout", post(logout))
        .route("/auth/session", get(session))
        .merge(admin)
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct LoginRequest {
    email: String,
    password: String,
}

async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> Response {
    match state.auth.login(&body.email, &body.password).await {
        Ok(()) => (StatusCode::OK, Json(state.auth.snapshot())).into_response(),
        Err(err) => {
            let status = match err {
                AuthError::AccessDenied => StatusCode::FORBIDDEN,
                AuthError::AuthenticationInProgress => StatusCode::CONFLICT,
                _ => StatusCode::UNAUTHORIZED,
            };
            (status, Json(json!({ "error": err.to_string() }))).into_response()
        }
    }
}

async fn logout(State(state): State<AppState>) -> Response {
    match state.auth.logout().await {
        Ok(()) => (StatusCode::OK, Json(state.auth.snapshot())).into_response(),
        Err(err) => (
            StatusCode::BAD_GATEWAY,
            Json(json!({ "error": err.to_string() })),
        )
            .into_response(),
    }
}

async fn session(State(state): State<AppState>) -> Response {
    Json(state.auth.snapshot()).into_response()
}

/// Map the route-guard contract onto HTTP for the admin area.
async fn admin_guard(
    State(state): State<AppState>,
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Response {
    let snapshot = state.auth.snapshot();
    match evaluate(&snapshot) {
        GuardDecision::Wait { error } => (
            StatusCode::SERVICE_UNAVAILABLE,
            [(header::RETRY_AFTER, "1")],
            Json(json!({ "status": "checking", "error": error })),
        )
            .into_response(),
        GuardDecision::RedirectToLogin => Redirect::temporary("/login").into_response(),
        GuardDecision::Allow => {
            if let Some(principal) = snapshot.principal {
                req.extensions_mut().insert(principal);
            }
            next.run(req).await
        }
    }
}

async fn admin_home(principal: axum::Extension<Principal>) -> Response {
    Json(json!({
        "area": "admin",
        "principal": principal.0,
    }))
    .into_response()
}
