//! Append-only login audit trail.

use core::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{AuditId, DomainError, TenantId, UserId};

/// How the login attempt reached the central server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoginMethod {
    /// Tenant-initiated browser handshake.
    Sso,
    /// Generic browser login on the central server.
    Direct,
    /// JSON API (machine clients).
    Api,
}

impl LoginMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoginMethod::Sso => "sso",
            LoginMethod::Direct => "direct",
            LoginMethod::Api => "api",
        }
    }
}

impl core::fmt::Display for LoginMethod {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LoginMethod {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sso" => Ok(LoginMethod::Sso),
            "direct" => Ok(LoginMethod::Direct),
            "api" => Ok(LoginMethod::Api),
            other => Err(DomainError::validation(format!(
                "login method must be one of: sso, direct, api (got '{other}')"
            ))),
        }
    }
}

/// One login attempt and, once it ends, its logout.
///
/// # Invariants
/// - `logout_at` is set at most once and never changes afterwards.
/// - `session_duration_secs` is always `logout_at - login_at` (clamped at 0).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginAudit {
    pub id: AuditId,
    /// `None` when the attempt failed before the identity was resolved.
    pub user_id: Option<UserId>,
    pub tenant_id: Option<TenantId>,
    pub login_method: LoginMethod,
    pub is_successful: bool,
    pub failure_reason: Option<String>,
    /// Browser session id, or the token id (`jti`) for API logins.
    pub session_id: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub login_at: DateTime<Utc>,
    pub logout_at: Option<DateTime<Utc>>,
    pub session_duration_secs: Option<i64>,
}

impl LoginAudit {
    pub fn from_new(id: AuditId, input: NewLoginAudit) -> Self {
        Self {
            id,
            user_id: input.user_id,
            tenant_id: input.tenant_id,
            login_method: input.login_method,
            is_successful: input.is_successful,
            failure_reason: input.failure_reason,
            session_id: input.session_id,
            ip_address: input.ip_address,
            user_agent: input.user_agent,
            login_at: input.login_at,
            logout_at: None,
            session_duration_secs: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.logout_at.is_none()
    }

    /// Record the logout. Returns `false` (and changes nothing) if the row was
    /// already closed.
    pub fn close(&mut self, logout_at: DateTime<Utc>) -> bool {
        if self.logout_at.is_some() {
            return false;
        }
        self.logout_at = Some(logout_at);
        self.session_duration_secs = Some(session_duration(self.login_at, logout_at));
        true
    }
}

/// Whole seconds between login and logout, never negative.
pub fn session_duration(login_at: DateTime<Utc>, logout_at: DateTime<Utc>) -> i64 {
    (logout_at - login_at).num_seconds().max(0)
}

/// Input for appending a login audit row.
#[derive(Debug, Clone)]
pub struct NewLoginAudit {
    pub user_id: Option<UserId>,
    pub tenant_id: Option<TenantId>,
    pub login_method: LoginMethod,
    pub is_successful: bool,
    pub failure_reason: Option<String>,
    pub session_id: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub login_at: DateTime<Utc>,
}

impl NewLoginAudit {
    pub fn success(
        user_id: UserId,
        tenant_id: Option<TenantId>,
        login_method: LoginMethod,
        session_id: Option<String>,
    ) -> Self {
        Self {
            user_id: Some(user_id),
            tenant_id,
            login_method,
            is_successful: true,
            failure_reason: None,
            session_id,
            ip_address: None,
            user_agent: None,
            login_at: Utc::now(),
        }
    }

    pub fn failure(
        user_id: Option<UserId>,
        tenant_id: Option<TenantId>,
        login_method: LoginMethod,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            user_id,
            tenant_id,
            login_method,
            is_successful: false,
            failure_reason: Some(reason.into()),
            session_id: None,
            ip_address: None,
            user_agent: None,
            login_at: Utc::now(),
        }
    }

    pub fn with_client(mut self, ip_address: Option<String>, user_agent: Option<String>) -> Self {
        self.ip_address = ip_address;
        self.user_agent = user_agent;
        self
    }
}

/// Result of closing the audit row of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseOutcome {
    /// The open row was closed by this call.
    Closed(LoginAudit),
    /// The row had already been closed; it is returned unchanged.
    AlreadyClosed(LoginAudit),
    /// No successful login is recorded for the session.
    NotFound,
}
