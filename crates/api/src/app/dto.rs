use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use ssogate_auth::{IssuedToken, TokenClaims};
use ssogate_core::{CloseOutcome, LoginAudit, User};

// -------------------------
// Request DTOs
// -------------------------
//
// Every field is optional so that missing input surfaces as a field-level
// 422 from the auth layer rather than a deserialization failure.

#[derive(Debug, Default, Deserialize)]
pub struct LoginRequest {
    pub email: Option<String>,
    pub password: Option<String>,
    pub tenant_slug: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RegisterRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub password_confirmation: Option<String>,
    pub tenant_slug: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ValidateRequest {
    pub token: Option<String>,
    pub tenant_slug: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AuditLoginRequest {
    pub user_id: Option<String>,
    pub tenant_slug: Option<String>,
    pub login_method: Option<String>,
    pub is_successful: Option<bool>,
    pub failure_reason: Option<String>,
    pub session_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AuditLogoutRequest {
    pub session_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct HandshakeQuery {
    pub tenant_slug: Option<String>,
    pub callback_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct LoginForm {
    pub email: Option<String>,
    pub password: Option<String>,
    pub tenant_slug: Option<String>,
    pub callback_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SelectTenantForm {
    pub tenant_slug: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AccessDeniedQuery {
    pub tenant: Option<String>,
}

// -------------------------
// Response DTOs
// -------------------------

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: String,
    pub name: String,
    pub email: String,
    pub is_admin: bool,
    pub created_at: DateTime<Utc>,
}

impl From<&User> for UserResponse {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.to_string(),
            name: user.name.clone(),
            email: user.email.to_string(),
            is_admin: user.is_admin,
            created_at: user.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub token: String,
    pub token_type: &'static str,
    pub expires_in: i64,
}

impl From<&IssuedToken> for TokenResponse {
    fn from(issued: &IssuedToken) -> Self {
        Self {
            token: issued.token.clone(),
            token_type: "bearer",
            expires_in: issued.expires_in(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    #[serde(flatten)]
    pub token: TokenResponse,
    pub user: UserResponse,
    pub tenants: Vec<String>,
    pub current_tenant: String,
}

impl AuthResponse {
    pub fn new(issued: &IssuedToken, user: &User) -> Self {
        Self {
            token: TokenResponse::from(issued),
            user: UserResponse::from(user),
            tenants: tenant_slugs(&issued.claims),
            current_tenant: issued.claims.current_tenant.to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ValidateResponse {
    pub valid: bool,
    pub user: UserResponse,
    pub tenants: Vec<String>,
    pub current_tenant: String,
    pub expires_at: DateTime<Utc>,
}

impl ValidateResponse {
    pub fn new(user: &User, claims: &TokenClaims) -> Self {
        Self {
            valid: true,
            user: UserResponse::from(user),
            tenants: tenant_slugs(claims),
            current_tenant: claims.current_tenant.to_string(),
            expires_at: claims.expires_at(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CurrentUserResponse {
    pub user: UserResponse,
    pub tenants: Vec<String>,
    pub current_tenant: String,
}

#[derive(Debug, Serialize)]
pub struct AuditLoginResponse {
    pub audit_id: String,
}

impl From<&LoginAudit> for AuditLoginResponse {
    fn from(audit: &LoginAudit) -> Self {
        Self {
            audit_id: audit.id.to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AuditLogoutResponse {
    pub message: &'static str,
    pub closed: bool,
    pub session_duration_secs: Option<i64>,
}

impl From<&CloseOutcome> for AuditLogoutResponse {
    fn from(outcome: &CloseOutcome) -> Self {
        match outcome {
            CloseOutcome::Closed(audit) => Self {
                message: "Logout recorded",
                closed: true,
                session_duration_secs: audit.session_duration_secs,
            },
            CloseOutcome::AlreadyClosed(audit) => Self {
                message: "Logout already recorded",
                closed: false,
                session_duration_secs: audit.session_duration_secs,
            },
            CloseOutcome::NotFound => Self {
                message: "No open session found",
                closed: false,
                session_duration_secs: None,
            },
        }
    }
}

/// Polling response of `GET /sso/check`.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct SsoCheckResponse {
    pub authenticated: bool,
    pub access_denied: bool,
    pub redirect_to: String,
}

pub fn tenant_slugs(claims: &TokenClaims) -> Vec<String> {
    claims.tenants.iter().map(ToString::to_string).collect()
}
