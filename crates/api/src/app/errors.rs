use axum::extract::rejection::{FormRejection, JsonRejection};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;
use tracing::error;

use ssogate_auth::{AuthError, ValidationErrors};

/// Status code for each error kind.
pub fn auth_error_status(err: &AuthError) -> StatusCode {
    match err {
        AuthError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        AuthError::InvalidCredentials | AuthError::InvalidToken(_) => StatusCode::UNAUTHORIZED,
        AuthError::TenantAccessDenied(_) | AuthError::TenantUnavailable { .. } => StatusCode::FORBIDDEN,
        AuthError::NotFound { .. } => StatusCode::NOT_FOUND,
        AuthError::Signing(_) | AuthError::Infrastructure(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn auth_error_code(err: &AuthError) -> &'static str {
    match err {
        AuthError::Validation(_) => "validation_error",
        AuthError::InvalidCredentials => "invalid_credentials",
        AuthError::InvalidToken(_) => "invalid_token",
        AuthError::TenantAccessDenied(_) => "tenant_access_denied",
        AuthError::TenantUnavailable { .. } => "tenant_unavailable",
        AuthError::NotFound { .. } => "not_found",
        AuthError::Signing(_) => "signing_error",
        AuthError::Infrastructure(_) => "token_infrastructure_error",
    }
}

/// Client-facing message. Internal failures are logged in full and
/// reported generically.
pub fn auth_error_message(err: &AuthError) -> String {
    match err {
        AuthError::Validation(errors) => errors.to_string(),
        AuthError::InvalidCredentials => "Invalid credentials".to_string(),
        AuthError::TenantAccessDenied(_) => "Access denied to tenant".to_string(),
        AuthError::TenantUnavailable { reason, .. } => reason.clone(),
        AuthError::Signing(_) => "Could not create token".to_string(),
        AuthError::Infrastructure(_) => "Authentication service unavailable".to_string(),
        other => other.to_string(),
    }
}

pub fn auth_error_to_response(err: AuthError) -> axum::response::Response {
    let status = auth_error_status(&err);
    if err.is_internal() {
        error!(error = %err, "request failed");
    }
    match &err {
        AuthError::Validation(errors) => validation_error(errors),
        _ => json_error(status, auth_error_code(&err), auth_error_message(&err)),
    }
}

pub fn validation_error(errors: &ValidationErrors) -> axum::response::Response {
    (
        StatusCode::UNPROCESSABLE_ENTITY,
        axum::Json(json!({
            "error": "validation_error",
            "message": errors.to_string(),
            "errors": errors,
        })),
    )
        .into_response()
}

/// A body that is not valid JSON for the expected shape is a 422, like any
/// other malformed input.
pub fn json_rejection_to_response(rejection: JsonRejection) -> axum::response::Response {
    json_error(StatusCode::UNPROCESSABLE_ENTITY, "validation_error", rejection.body_text())
}

pub fn form_rejection_to_response(rejection: FormRejection) -> axum::response::Response {
    json_error(StatusCode::UNPROCESSABLE_ENTITY, "validation_error", rejection.body_text())
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn taxonomy_maps_to_status_codes() {
        let cases = [
            (AuthError::validation("email", "bad"), StatusCode::UNPROCESSABLE_ENTITY),
            (AuthError::InvalidCredentials, StatusCode::UNAUTHORIZED),
            (AuthError::invalid_token("expired"), StatusCode::UNAUTHORIZED),
            (AuthError::TenantAccessDenied("t2".into()), StatusCode::FORBIDDEN),
            (AuthError::not_found("tenant", "t9"), StatusCode::NOT_FOUND),
            (AuthError::Signing("no key".into()), StatusCode::INTERNAL_SERVER_ERROR),
            (AuthError::Infrastructure("db down".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(auth_error_status(&err), status, "{err:?}");
        }
    }

    #[test]
    fn internal_details_are_not_exposed() {
        let msg = auth_error_message(&AuthError::Infrastructure("password=hunter2".into()));
        assert!(!msg.contains("hunter2"));
    }
}
