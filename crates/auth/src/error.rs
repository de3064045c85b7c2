//! Authentication error taxonomy.
//!
//! Each variant maps to exactly one transport status; see `ssogate-api`.

use ssogate_core::{DomainError, StoreError};
use thiserror::Error;

use crate::validation::ValidationErrors;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// Malformed or missing input (422).
    #[error("validation failed: {0}")]
    Validation(ValidationErrors),

    /// Unknown email or wrong password (401).
    #[error("invalid credentials")]
    InvalidCredentials,

    /// Bad signature, expired, malformed or invalidated token (401).
    #[error("invalid token: {0}")]
    InvalidToken(String),

    /// Identity is fine but the tenant is out of scope (403). Kept apart from
    /// `InvalidCredentials` so clients never read it as "wrong password".
    #[error("access denied to tenant '{0}'")]
    TenantAccessDenied(String),

    /// The tenant exists but refuses the operation (403).
    #[error("tenant '{tenant}' unavailable: {reason}")]
    TenantUnavailable { tenant: String, reason: String },

    /// Tenant or user absent (404).
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Key material missing or signing failed (500). Never retried.
    #[error("token signing failed: {0}")]
    Signing(String),

    /// Store, denylist or hashing infrastructure failed (500).
    #[error("token infrastructure error: {0}")]
    Infrastructure(String),
}

impl AuthError {
    pub fn validation(field: &str, message: impl Into<String>) -> Self {
        Self::Validation(ValidationErrors::single(field, message))
    }

    pub fn invalid_token(reason: impl Into<String>) -> Self {
        Self::InvalidToken(reason.into())
    }

    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    /// Reason string stored on a failed login audit row.
    pub fn audit_reason(&self) -> &'static str {
        match self {
            AuthError::InvalidCredentials => "Invalid credentials",
            AuthError::TenantAccessDenied(_) | AuthError::TenantUnavailable { .. } => {
                "Access denied to tenant"
            }
            AuthError::Signing(_) => "Token issuance failed",
            AuthError::Validation(_) => "Invalid input",
            AuthError::InvalidToken(_) | AuthError::NotFound { .. } | AuthError::Infrastructure(_) => {
                "Authentication error"
            }
        }
    }

    /// Whether this is an unexpected server-side failure.
    pub fn is_internal(&self) -> bool {
        matches!(self, AuthError::Signing(_) | AuthError::Infrastructure(_))
    }
}

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { entity, id } => AuthError::NotFound { entity, id },
            other => AuthError::Infrastructure(other.to_string()),
        }
    }
}

/// Value-object validation failures are attributed to the given field.
pub(crate) fn field_error(field: &str, err: DomainError) -> AuthError {
    let message = match err {
        DomainError::Validation(msg)
        | DomainError::InvariantViolation(msg)
        | DomainError::InvalidId(msg) => msg,
    };
    AuthError::validation(field, message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn audit_reasons_match_recorded_wording() {
        assert_eq!(AuthError::InvalidCredentials.audit_reason(), "Invalid credentials");
        assert_eq!(
            AuthError::TenantAccessDenied("t2".into()).audit_reason(),
            "Access denied to tenant"
        );
    }

    #[test]
    fn store_errors_become_infrastructure() {
        let err: AuthError = StoreError::Timeout(3000).into();
        assert!(matches!(err, AuthError::Infrastructure(_)));
        assert!(err.is_internal());

        let err: AuthError = StoreError::not_found("tenant", "t9").into();
        assert!(matches!(err, AuthError::NotFound { entity: "tenant", .. }));
    }
}
