//! Browser SSO handshake between a tenant application and the central server.
//!
//! The handshake is driven by the first-party browser session, never by a
//! JWT. A check walks `Unchecked -> Checking` and lands in one of the
//! authenticated/unauthenticated states, each of which has exactly one
//! terminal state:
//!
//! | intermediate              | terminal               |
//! |---------------------------|------------------------|
//! | `AuthenticatedWithAccess` | `Redirected`           |
//! | `AuthenticatedNoAccess`   | `AccessDeniedShown`    |
//! | `Unauthenticated`         | `LoginFormShown`       |
//!
//! A generic (not tenant-initiated) login of a user with several tenants
//! ends in `TenantSelectionShown` instead of a redirect.
//!
//! Checks never write; only login submissions record audit rows.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info};
use url::Url;

use ssogate_core::{
    BrowserSession, Email, LoginMethod, NewLoginAudit, SessionId, Tenant, TenantId, TenantSlug, User,
    UserId,
};

use crate::bounded::bounded;
use crate::error::{AuthError, field_error};
use crate::issuer::IssuedToken;
use crate::service::{AuthService, ClientInfo, CredentialCheck, LoginFailure};
use crate::validation::ValidationErrors;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    Unchecked,
    Checking,
    AuthenticatedWithAccess,
    AuthenticatedNoAccess,
    Unauthenticated,
    Redirected,
    LoginFormShown,
    AccessDeniedShown,
    TenantSelectionShown,
}

impl HandshakeState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            HandshakeState::Redirected
                | HandshakeState::LoginFormShown
                | HandshakeState::AccessDeniedShown
                | HandshakeState::TenantSelectionShown
        )
    }
}

fn transition(from: HandshakeState, to: HandshakeState) -> HandshakeState {
    debug!(?from, ?to, "sso handshake transition");
    to
}

/// A tenant-initiated handshake: where the browser came from and where it
/// goes back to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeRequest {
    pub tenant_slug: TenantSlug,
    pub callback_url: Url,
}

impl HandshakeRequest {
    pub fn parse(tenant_slug: &str, callback_url: Option<&str>) -> Result<Self, AuthError> {
        let mut errors = ValidationErrors::new();
        let slug = match TenantSlug::parse(tenant_slug) {
            Ok(slug) => Some(slug),
            Err(e) => {
                errors.add("tenant_slug", e.to_string());
                None
            }
        };
        let callback = errors
            .required("callback_url", callback_url)
            .and_then(|raw| match parse_callback(raw) {
                Ok(url) => Some(url),
                Err(msg) => {
                    errors.add("callback_url", msg);
                    None
                }
            });

        match (slug, callback) {
            (Some(tenant_slug), Some(callback_url)) => Ok(Self {
                tenant_slug,
                callback_url,
            }),
            _ => Err(AuthError::Validation(errors)),
        }
    }
}

fn parse_callback(raw: &str) -> Result<Url, &'static str> {
    let url = Url::parse(raw).map_err(|_| "The callback url must be a valid URL.")?;
    match url.scheme() {
        "http" | "https" if url.host_str().is_some() => Ok(url),
        _ => Err("The callback url must be an absolute http(s) URL."),
    }
}

/// The authenticated principal of a first-party browser session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionPrincipal {
    pub session_id: SessionId,
    pub user_id: UserId,
}

#[derive(Debug, Clone)]
pub enum SsoOutcome {
    /// Send the browser to `redirect_to`, which carries the token as the
    /// `token` query parameter.
    Redirect { redirect_to: String, token: IssuedToken },
    AccessDenied { tenant_slug: Option<TenantSlug> },
    LoginRequired,
    SelectTenant { tenants: Vec<Tenant> },
}

impl SsoOutcome {
    pub fn state(&self) -> HandshakeState {
        match self {
            SsoOutcome::Redirect { .. } => HandshakeState::Redirected,
            SsoOutcome::AccessDenied { .. } => HandshakeState::AccessDeniedShown,
            SsoOutcome::LoginRequired => HandshakeState::LoginFormShown,
            SsoOutcome::SelectTenant { .. } => HandshakeState::TenantSelectionShown,
        }
    }
}

/// Credentials posted by the central login form.
#[derive(Debug, Clone, Default)]
pub struct LoginFormInput {
    pub email: Option<String>,
    pub password: Option<String>,
    /// Present when the form was reached through a tenant-initiated handshake.
    pub request: Option<HandshakeRequest>,
    pub client: ClientInfo,
}

/// Result of a successful credential submission.
#[derive(Debug, Clone)]
pub struct LoginSubmission {
    pub session: BrowserSession,
    pub outcome: SsoOutcome,
}

#[derive(Clone)]
pub struct SsoHandshake {
    auth: Arc<AuthService>,
}

impl SsoHandshake {
    pub fn new(auth: Arc<AuthService>) -> Self {
        Self { auth }
    }

    /// Resolve the session cookie to a principal. Unknown or expired
    /// sessions resolve to `None`.
    pub async fn resolve_principal(&self, session_id: Option<&SessionId>) -> Result<Option<SessionPrincipal>, AuthError> {
        let Some(session_id) = session_id else {
            return Ok(None);
        };
        let session = bounded(
            self.auth.config().store_timeout,
            "sessions.get",
            self.auth.stores().sessions.get(session_id),
        )
        .await?;
        Ok(session.map(|s| SessionPrincipal {
            session_id: s.id,
            user_id: s.user_id,
        }))
    }

    pub async fn check(
        &self,
        principal: Option<&SessionPrincipal>,
        request: &HandshakeRequest,
    ) -> Result<SsoOutcome, AuthError> {
        self.check_at(principal, request, Utc::now()).await
    }

    /// Authentication check for a tenant-initiated handshake.
    ///
    /// Safe to poll: the only effect is a freshly minted token.
    pub async fn check_at(
        &self,
        principal: Option<&SessionPrincipal>,
        request: &HandshakeRequest,
        now: DateTime<Utc>,
    ) -> Result<SsoOutcome, AuthError> {
        let state = transition(HandshakeState::Unchecked, HandshakeState::Checking);

        let tenant = self.auth.find_tenant(&request.tenant_slug).await?;
        if let Some(tenant) = &tenant {
            enforce_callback_policy(tenant, &request.callback_url)?;
        }

        let user = match principal {
            Some(principal) => self.auth.find_user(principal.user_id).await?,
            None => None,
        };
        let Some(user) = user else {
            transition(state, HandshakeState::Unauthenticated);
            return Ok(SsoOutcome::LoginRequired);
        };

        match self.auth.ensure_access(&user, &request.tenant_slug).await {
            Ok(tenant) => {
                transition(state, HandshakeState::AuthenticatedWithAccess);
                let token = self
                    .auth
                    .issue_for(&user, &tenant, self.auth.config().access_ttl(), now)
                    .await?;
                Ok(redirect(&request.callback_url, token))
            }
            Err(LoginFailure {
                error: AuthError::TenantAccessDenied(_),
                ..
            }) => {
                transition(state, HandshakeState::AuthenticatedNoAccess);
                Ok(SsoOutcome::AccessDenied {
                    tenant_slug: Some(request.tenant_slug.clone()),
                })
            }
            Err(failure) => Err(failure.error),
        }
    }

    pub async fn submit_login(&self, input: LoginFormInput) -> Result<LoginSubmission, AuthError> {
        self.submit_login_at(input, Utc::now()).await
    }

    /// Verify posted credentials, open a browser session and decide where
    /// the browser goes next.
    ///
    /// Malformed input is rejected without an audit row; every other outcome
    /// records exactly one.
    pub async fn submit_login_at(&self, input: LoginFormInput, now: DateTime<Utc>) -> Result<LoginSubmission, AuthError> {
        let mut errors = ValidationErrors::new();
        let email = errors
            .required("email", input.email.as_deref())
            .and_then(|raw| match Email::parse(raw) {
                Ok(email) => Some(email),
                Err(_) => {
                    errors.add("email", "The email must be a valid email address.");
                    None
                }
            });
        let password = input.password.as_deref().filter(|p| !p.is_empty());
        if password.is_none() {
            errors.add("password", "The password field is required.");
        }
        let (Some(email), Some(password)) = (email, password) else {
            return Err(AuthError::Validation(errors));
        };

        let method = if input.request.is_some() {
            LoginMethod::Sso
        } else {
            LoginMethod::Direct
        };

        match self.login_flow(&email, password, input.request.as_ref(), now).await {
            Ok(flow) => {
                let audit = match &flow.denied {
                    None => NewLoginAudit::success(
                        flow.submission.session.user_id,
                        flow.tenant_id,
                        method,
                        Some(flow.submission.session.id.as_str().to_string()),
                    ),
                    Some(failure) => {
                        let mut audit = failure.into_audit(method, &input.client, now);
                        audit.session_id = Some(flow.submission.session.id.as_str().to_string());
                        audit
                    }
                };
                let mut audit = audit.with_client(input.client.ip_address.clone(), input.client.user_agent.clone());
                audit.login_at = now;
                self.auth.recorder().record_login(audit).await;
                info!(
                    user_id = %flow.submission.session.user_id,
                    state = ?flow.submission.outcome.state(),
                    "browser login completed"
                );
                Ok(flow.submission)
            }
            Err(failure) => {
                self.auth
                    .recorder()
                    .record_login(failure.into_audit(method, &input.client, now))
                    .await;
                Err(failure.error)
            }
        }
    }

    async fn login_flow(
        &self,
        email: &Email,
        password: &str,
        request: Option<&HandshakeRequest>,
        now: DateTime<Utc>,
    ) -> Result<FormLogin, LoginFailure> {
        let user = match self.auth.check_credentials(email, password).await? {
            CredentialCheck::Verified(user) => user,
            CredentialCheck::Rejected { user_id } => {
                return Err(LoginFailure {
                    error: AuthError::InvalidCredentials,
                    user_id,
                    tenant_id: None,
                });
            }
        };

        let (outcome, tenant_id, denied) = self.decide(&user, request, now).await?;

        // Only a decided login gets a session; earlier failures leave no record.
        let session = bounded(
            self.auth.config().store_timeout,
            "sessions.create",
            self.auth
                .stores()
                .sessions
                .create(user.id, now + self.auth.config().session_ttl()),
        )
        .await
        .map_err(|error| LoginFailure {
            error,
            user_id: Some(user.id),
            tenant_id,
        })?;

        Ok(FormLogin {
            submission: LoginSubmission { session, outcome },
            tenant_id,
            denied,
        })
    }

    /// Where a verified user goes next, with the tenant and denial for the audit row.
    async fn decide(
        &self,
        user: &User,
        request: Option<&HandshakeRequest>,
        now: DateTime<Utc>,
    ) -> Result<(SsoOutcome, Option<TenantId>, Option<LoginFailure>), LoginFailure> {
        let with_user = |error: AuthError| LoginFailure {
            error,
            user_id: Some(user.id),
            tenant_id: None,
        };

        if let Some(request) = request {
            return match self.auth.ensure_access(user, &request.tenant_slug).await {
                Ok(tenant) => {
                    enforce_callback_policy(&tenant, &request.callback_url).map_err(with_user)?;
                    let token = self
                        .auth
                        .issue_for(user, &tenant, self.auth.config().access_ttl(), now)
                        .await
                        .map_err(with_user)?;
                    Ok((redirect(&request.callback_url, token), Some(tenant.id), None))
                }
                Err(
                    failure @ LoginFailure {
                        error: AuthError::TenantAccessDenied(_),
                        ..
                    },
                ) => Ok((
                    SsoOutcome::AccessDenied {
                        tenant_slug: Some(request.tenant_slug.clone()),
                    },
                    failure.tenant_id,
                    Some(failure),
                )),
                Err(failure) => Err(failure),
            };
        }

        let mut tenants = self.auth.tenants_for_user(user.id).await.map_err(with_user)?;
        tenants.retain(|t| t.is_active);
        match tenants.len() {
            0 => Ok((
                SsoOutcome::AccessDenied { tenant_slug: None },
                None,
                Some(with_user(AuthError::TenantAccessDenied(String::new()))),
            )),
            1 => {
                let tenant = tenants.remove(0);
                let outcome = self
                    .redirect_to_default(user, &tenant, now)
                    .await
                    .map_err(with_user)?;
                Ok((outcome, Some(tenant.id), None))
            }
            _ => Ok((SsoOutcome::SelectTenant { tenants }, None, None)),
        }
    }

    pub async fn select_tenant(&self, principal: &SessionPrincipal, tenant_slug: &str) -> Result<SsoOutcome, AuthError> {
        self.select_tenant_at(principal, tenant_slug, Utc::now()).await
    }

    /// Finish a generic login by picking one of the user's tenants.
    pub async fn select_tenant_at(
        &self,
        principal: &SessionPrincipal,
        tenant_slug: &str,
        now: DateTime<Utc>,
    ) -> Result<SsoOutcome, AuthError> {
        let slug = TenantSlug::parse(tenant_slug).map_err(|e| field_error("tenant_slug", e))?;
        let user = self
            .auth
            .find_user(principal.user_id)
            .await?
            .ok_or_else(|| AuthError::not_found("user", principal.user_id.to_string()))?;

        match self.auth.ensure_access(&user, &slug).await {
            Ok(tenant) => self.redirect_to_default(&user, &tenant, now).await,
            Err(LoginFailure {
                error: AuthError::TenantAccessDenied(_),
                ..
            }) => Ok(SsoOutcome::AccessDenied {
                tenant_slug: Some(slug),
            }),
            Err(failure) => Err(failure.error),
        }
    }

    async fn redirect_to_default(
        &self,
        user: &User,
        tenant: &Tenant,
        now: DateTime<Utc>,
    ) -> Result<SsoOutcome, AuthError> {
        let callback = tenant
            .callback_url()
            .and_then(|raw| parse_callback(&raw).ok())
            .ok_or_else(|| AuthError::TenantUnavailable {
                tenant: tenant.slug.to_string(),
                reason: "Tenant has no callback domain".into(),
            })?;
        let token = self
            .auth
            .issue_for(user, tenant, self.auth.config().access_ttl(), now)
            .await?;
        Ok(redirect(&callback, token))
    }

    pub async fn logout(&self, session_id: &SessionId) -> Result<(), AuthError> {
        self.logout_at(session_id, Utc::now()).await
    }

    /// End the browser session and close its audit row.
    pub async fn logout_at(&self, session_id: &SessionId, now: DateTime<Utc>) -> Result<(), AuthError> {
        bounded(
            self.auth.config().store_timeout,
            "sessions.destroy",
            self.auth.stores().sessions.destroy(session_id),
        )
        .await?;
        self.auth.recorder().record_logout(session_id.as_str(), now).await;
        Ok(())
    }
}

struct FormLogin {
    submission: LoginSubmission,
    tenant_id: Option<TenantId>,
    /// Set when the user authenticated but has no access; recorded as a
    /// failed attempt.
    denied: Option<LoginFailure>,
}

/// The callback host must match the tenant's domain, when it has one.
fn enforce_callback_policy(tenant: &Tenant, callback: &Url) -> Result<(), AuthError> {
    let Some(domain) = tenant.domain.as_deref() else {
        return Ok(());
    };
    let host = callback.host_str().unwrap_or_default();
    if host.eq_ignore_ascii_case(domain) {
        Ok(())
    } else {
        Err(AuthError::validation(
            "callback_url",
            "The callback url does not belong to the tenant.",
        ))
    }
}

fn redirect(callback: &Url, token: IssuedToken) -> SsoOutcome {
    let mut url = callback.clone();
    url.query_pairs_mut().append_pair("token", &token.token);
    SsoOutcome::Redirect {
        redirect_to: url.to_string(),
        token,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_requires_absolute_http_callback() {
        assert!(HandshakeRequest::parse("t1", Some("https://t1.example.com/sso/callback")).is_ok());

        let AuthError::Validation(errors) = HandshakeRequest::parse("t1", Some("ftp://x.y")).unwrap_err() else {
            panic!("expected validation error");
        };
        assert!(errors.has("callback_url"));

        let AuthError::Validation(errors) = HandshakeRequest::parse("T 1", None).unwrap_err() else {
            panic!("expected validation error");
        };
        assert!(errors.has("tenant_slug"));
        assert!(errors.has("callback_url"));
    }

    #[test]
    fn redirect_appends_token_query() {
        let url = Url::parse("https://t1.example.com/sso/callback?next=%2Fhome").unwrap();
        let claims = crate::claims::TokenClaims::new(
            UserId::new(),
            [TenantSlug::parse("t1").unwrap()],
            TenantSlug::parse("t1").unwrap(),
            Utc::now(),
            chrono::Duration::minutes(1),
        )
        .unwrap();
        let token = IssuedToken {
            token: "abc.def.ghi".into(),
            claims,
        };
        let SsoOutcome::Redirect { redirect_to, .. } = redirect(&url, token) else {
            panic!("expected redirect");
        };
        assert_eq!(
            redirect_to,
            "https://t1.example.com/sso/callback?next=%2Fhome&token=abc.def.ghi"
        );
    }

    #[test]
    fn terminal_states() {
        assert!(HandshakeState::Redirected.is_terminal());
        assert!(HandshakeState::AccessDeniedShown.is_terminal());
        assert!(!HandshakeState::Checking.is_terminal());
        assert!(!HandshakeState::AuthenticatedNoAccess.is_terminal());
        assert_eq!(SsoOutcome::LoginRequired.state(), HandshakeState::LoginFormShown);
    }
}
