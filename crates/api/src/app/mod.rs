//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: store selection and auth service construction
//! - `routes/`: HTTP routes + handlers (one file per area)
//! - `pages.rs`: server-rendered pages of the browser handshake
//! - `dto.rs`: request/response DTOs
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::Router;
use tower::ServiceBuilder;

use ssogate_auth::{AuthService, SsoHandshake};
use ssogate_core::StoreError;
use ssogate_infra::AppConfig;

use crate::middleware;

pub mod dto;
pub mod errors;
pub mod pages;
pub mod routes;
pub mod services;

/// Shared state of every handler.
pub struct AppState {
    pub auth: Arc<AuthService>,
    pub sso: SsoHandshake,
}

impl AppState {
    pub fn new(auth: AuthService) -> Self {
        let auth = Arc::new(auth);
        Self {
            sso: SsoHandshake::new(auth.clone()),
            auth,
        }
    }
}

/// Build the full HTTP router (public entrypoint used by `main.rs`).
pub async fn build_app(config: AppConfig) -> Result<Router, StoreError> {
    let stores = services::build_stores(&config).await?;
    let auth = AuthService::new(stores, services::auth_config(&config));
    Ok(build_router(Arc::new(AppState::new(auth))))
}

/// Router over an already assembled state.
pub fn build_router(state: Arc<AppState>) -> Router {
    let protected = routes::protected_router().layer(axum::middleware::from_fn_with_state(
        state.clone(),
        middleware::bearer_auth,
    ));

    Router::new()
        .merge(routes::router())
        .merge(protected)
        .with_state(state)
        .layer(ServiceBuilder::new())
}
