use std::sync::Arc;

use axum::{
    Json,
    extract::{Extension, State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

use ssogate_auth::{LoginInput, RegisterInput, ValidatedToken};

use crate::app::{AppState, dto, errors};
use crate::context::ClientContext;

pub async fn login(
    State(state): State<Arc<AppState>>,
    client: ClientContext,
    body: Result<Json<dto::LoginRequest>, JsonRejection>,
) -> Response {
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => return errors::json_rejection_to_response(rejection),
    };

    let input = LoginInput {
        email: body.email,
        password: body.password,
        tenant_slug: body.tenant_slug,
        client: client.into_client_info(),
    };
    match state.auth.login(input).await {
        Ok(out) => (StatusCode::OK, Json(dto::AuthResponse::new(&out.token, &out.user))).into_response(),
        Err(e) => errors::auth_error_to_response(e),
    }
}

pub async fn register(
    State(state): State<Arc<AppState>>,
    client: ClientContext,
    body: Result<Json<dto::RegisterRequest>, JsonRejection>,
) -> Response {
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => return errors::json_rejection_to_response(rejection),
    };

    let input = RegisterInput {
        name: body.name,
        email: body.email,
        password: body.password,
        password_confirmation: body.password_confirmation,
        tenant_slug: body.tenant_slug,
        client: client.into_client_info(),
    };
    match state.auth.register(input).await {
        Ok(out) => (StatusCode::CREATED, Json(dto::AuthResponse::new(&out.token, &out.user))).into_response(),
        Err(e) => errors::auth_error_to_response(e),
    }
}

/// Token check for tenant applications: the token travels in the body
/// together with the tenant the caller serves.
pub async fn validate(
    State(state): State<Arc<AppState>>,
    body: Result<Json<dto::ValidateRequest>, JsonRejection>,
) -> Response {
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => return errors::json_rejection_to_response(rejection),
    };

    let token = body.token.unwrap_or_default();
    let tenant_slug = body.tenant_slug.unwrap_or_default();
    match state.auth.validate(&token, &tenant_slug).await {
        Ok(validated) => (
            StatusCode::OK,
            Json(dto::ValidateResponse::new(&validated.user, &validated.claims)),
        )
            .into_response(),
        Err(e) => errors::auth_error_to_response(e),
    }
}

pub async fn user(Extension(current): Extension<ValidatedToken>) -> Response {
    let body = dto::CurrentUserResponse {
        user: dto::UserResponse::from(&current.user),
        tenants: dto::tenant_slugs(&current.claims),
        current_tenant: current.claims.current_tenant.to_string(),
    };
    (StatusCode::OK, Json(body)).into_response()
}

pub async fn refresh(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<ValidatedToken>,
) -> Response {
    match state.auth.refresh(&current).await {
        Ok(issued) => (StatusCode::OK, Json(dto::TokenResponse::from(&issued))).into_response(),
        Err(e) => errors::auth_error_to_response(e),
    }
}

pub async fn logout(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<ValidatedToken>,
) -> Response {
    match state.auth.logout(&current).await {
        Ok(()) => (StatusCode::OK, Json(json!({ "message": "Successfully logged out" }))).into_response(),
        Err(e) => errors::auth_error_to_response(e),
    }
}
