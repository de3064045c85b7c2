use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};

use crate::app::AppState;

pub mod audit;
pub mod auth;
pub mod sso;
pub mod system;

/// Endpoints reachable without a bearer token.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(system::health))
        .route("/auth/login", post(auth::login))
        .route("/auth/register", post(auth::register))
        .route("/auth/validate", post(auth::validate))
        .route("/api/audit/login", post(audit::record_login))
        .route("/api/audit/logout", post(audit::record_logout))
        .merge(sso::router())
}

/// Endpoints behind the bearer middleware.
pub fn protected_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/auth/user", get(auth::user))
        .route("/auth/refresh", post(auth::refresh))
        .route("/auth/logout", post(auth::logout))
}
