//! Trusted audit API used by tenant applications that authenticate users
//! themselves and report the outcome.

use std::str::FromStr;
use std::sync::Arc;

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::Utc;

use ssogate_auth::{ExternalLoginAudit, ValidationErrors};
use ssogate_core::{LoginMethod, UserId};

use crate::app::{AppState, dto, errors};
use crate::context::ClientContext;

pub async fn record_login(
    State(state): State<Arc<AppState>>,
    client: ClientContext,
    body: Result<Json<dto::AuditLoginRequest>, JsonRejection>,
) -> Response {
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => return errors::json_rejection_to_response(rejection),
    };

    let input = match parse_audit_login(body, client) {
        Ok(input) => input,
        Err(validation) => return errors::validation_error(&validation),
    };
    match state.auth.record_external_login(input).await {
        Ok(audit) => (StatusCode::OK, Json(dto::AuditLoginResponse::from(&audit))).into_response(),
        Err(e) => errors::auth_error_to_response(e),
    }
}

pub async fn record_logout(
    State(state): State<Arc<AppState>>,
    body: Result<Json<dto::AuditLogoutRequest>, JsonRejection>,
) -> Response {
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => return errors::json_rejection_to_response(rejection),
    };

    let session_id = body.session_id.unwrap_or_default();
    match state.auth.record_external_logout(&session_id, Utc::now()).await {
        Ok(outcome) => (StatusCode::OK, Json(dto::AuditLogoutResponse::from(&outcome))).into_response(),
        Err(e) => errors::auth_error_to_response(e),
    }
}

fn parse_audit_login(body: dto::AuditLoginRequest, client: ClientContext) -> Result<ExternalLoginAudit, ValidationErrors> {
    let mut errors = ValidationErrors::new();

    let user_id = errors
        .required("user_id", body.user_id.as_deref())
        .and_then(|raw| match UserId::from_str(raw) {
            Ok(id) => Some(id),
            Err(_) => {
                errors.add("user_id", "The user id must be a valid identifier.");
                None
            }
        });
    let login_method = match body.login_method.as_deref().map(str::trim).filter(|m| !m.is_empty()) {
        None => Some(LoginMethod::Sso),
        Some(raw) => match LoginMethod::from_str(raw) {
            Ok(method) => Some(method),
            Err(_) => {
                errors.add("login_method", "The selected login method is invalid.");
                None
            }
        },
    };
    if body.is_successful.is_none() {
        errors.add("is_successful", "The is successful field is required.");
    }

    match (user_id, login_method, body.is_successful) {
        (Some(user_id), Some(login_method), Some(is_successful)) => Ok(ExternalLoginAudit {
            user_id,
            tenant_slug: body.tenant_slug,
            login_method,
            is_successful,
            failure_reason: body.failure_reason,
            session_id: body.session_id,
            client: client.into_client_info(),
        }),
        _ => Err(errors),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn audit_login_requires_user_and_outcome() {
        let errors = parse_audit_login(dto::AuditLoginRequest::default(), ClientContext::default()).unwrap_err();
        assert!(errors.has("user_id"));
        assert!(errors.has("is_successful"));
        assert!(!errors.has("login_method"));
    }

    #[test]
    fn audit_login_defaults_to_sso_method() {
        let body = dto::AuditLoginRequest {
            user_id: Some(UserId::new().to_string()),
            is_successful: Some(true),
            ..Default::default()
        };
        let input = parse_audit_login(body, ClientContext::default()).unwrap();
        assert_eq!(input.login_method, LoginMethod::Sso);
    }

    #[test]
    fn audit_login_rejects_unknown_method() {
        let body = dto::AuditLoginRequest {
            user_id: Some(UserId::new().to_string()),
            login_method: Some("carrier-pigeon".into()),
            is_successful: Some(false),
            ..Default::default()
        };
        let errors = parse_audit_login(body, ClientContext::default()).unwrap_err();
        assert!(errors.has("login_method"));
    }
}
