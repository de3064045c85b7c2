//! Authentication service: login, registration, validation, refresh and
//! logout orchestration over the repository traits.
//!
//! Every operation has an `*_at` variant taking the clock explicitly; the
//! plain variants use `Utc::now()`.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, instrument, warn};

use ssogate_core::{
    CloseOutcome, DenylistEntry, DenylistRepository, Email, LoginAudit, LoginAuditRepository,
    LoginMethod, MembershipRepository, NewLoginAudit, NewUser, SessionRepository, StoreError,
    Tenant, TenantId, TenantRepository, TenantSlug, User, UserId, UserRepository,
};

use crate::audit::LoginAuditRecorder;
use crate::bounded::bounded;
use crate::claims::TokenClaims;
use crate::config::AuthConfig;
use crate::error::{AuthError, field_error};
use crate::issuer::{IssuedToken, TokenIssuer};
use crate::password;
use crate::validation::ValidationErrors;
use crate::validator::TokenValidator;

const MAX_NAME_LEN: usize = 255;
const MIN_PASSWORD_LEN: usize = 8;

/// The persistent collaborators of the auth core.
#[derive(Clone)]
pub struct AuthStores {
    pub users: Arc<dyn UserRepository>,
    pub tenants: Arc<dyn TenantRepository>,
    pub memberships: Arc<dyn MembershipRepository>,
    pub denylist: Arc<dyn DenylistRepository>,
    pub audits: Arc<dyn LoginAuditRepository>,
    pub sessions: Arc<dyn SessionRepository>,
}

/// Request metadata stored on audit rows.
#[derive(Debug, Clone, Default)]
pub struct ClientInfo {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct LoginInput {
    pub email: Option<String>,
    pub password: Option<String>,
    pub tenant_slug: Option<String>,
    pub client: ClientInfo,
}

#[derive(Debug, Clone)]
pub struct LoginOutput {
    pub token: IssuedToken,
    pub user: User,
    pub tenant: Tenant,
}

#[derive(Debug, Clone, Default)]
pub struct RegisterInput {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    /// Checked against `password` when present.
    pub password_confirmation: Option<String>,
    pub tenant_slug: Option<String>,
    pub client: ClientInfo,
}

/// A token that passed every check, with the identity it resolves to.
#[derive(Debug, Clone)]
pub struct ValidatedToken {
    pub user: User,
    pub claims: TokenClaims,
    pub token: String,
}

/// Audit row reported by a trusted tenant application.
#[derive(Debug, Clone)]
pub struct ExternalLoginAudit {
    pub user_id: UserId,
    pub tenant_slug: Option<String>,
    pub login_method: LoginMethod,
    pub is_successful: bool,
    pub failure_reason: Option<String>,
    pub session_id: Option<String>,
    pub client: ClientInfo,
}

/// Outcome of checking an email/password pair.
#[derive(Debug, Clone)]
pub enum CredentialCheck {
    Verified(User),
    /// `user_id` is set when the email matched but the password did not.
    Rejected { user_id: Option<UserId> },
}

/// A failed login, with whatever identity had been resolved for the audit row.
#[derive(Debug, Clone)]
pub(crate) struct LoginFailure {
    pub(crate) error: AuthError,
    pub(crate) user_id: Option<UserId>,
    pub(crate) tenant_id: Option<TenantId>,
}

impl LoginFailure {
    fn new(error: AuthError) -> Self {
        Self {
            error,
            user_id: None,
            tenant_id: None,
        }
    }

    pub(crate) fn into_audit(&self, method: LoginMethod, client: &ClientInfo, at: DateTime<Utc>) -> NewLoginAudit {
        let mut audit = NewLoginAudit::failure(self.user_id, self.tenant_id, method, self.error.audit_reason())
            .with_client(client.ip_address.clone(), client.user_agent.clone());
        audit.login_at = at;
        audit
    }
}

impl From<AuthError> for LoginFailure {
    fn from(error: AuthError) -> Self {
        Self::new(error)
    }
}

pub struct AuthService {
    stores: AuthStores,
    issuer: TokenIssuer,
    validator: TokenValidator,
    recorder: LoginAuditRecorder,
    config: AuthConfig,
}

impl AuthService {
    pub fn new(stores: AuthStores, config: AuthConfig) -> Self {
        if config.jwt_secret.is_empty() {
            warn!("JWT secret is empty; token issuance and validation will fail");
        }
        Self {
            issuer: TokenIssuer::new(&config.jwt_secret),
            validator: TokenValidator::new(
                &config.jwt_secret,
                config.required_claims.clone(),
                config.leeway_secs,
            ),
            recorder: LoginAuditRecorder::new(stores.audits.clone(), config.store_timeout),
            stores,
            config,
        }
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    pub fn recorder(&self) -> &LoginAuditRecorder {
        &self.recorder
    }

    pub fn stores(&self) -> &AuthStores {
        &self.stores
    }

    // ---------------------------------------------------------------------
    // Building blocks shared with the SSO handshake
    // ---------------------------------------------------------------------

    pub async fn find_user(&self, id: UserId) -> Result<Option<User>, AuthError> {
        bounded(self.config.store_timeout, "users.get_by_id", self.stores.users.get_by_id(id)).await
    }

    pub async fn find_tenant(&self, slug: &TenantSlug) -> Result<Option<Tenant>, AuthError> {
        bounded(
            self.config.store_timeout,
            "tenants.get_by_slug",
            self.stores.tenants.get_by_slug(slug),
        )
        .await
    }

    pub async fn tenants_for_user(&self, user_id: UserId) -> Result<Vec<Tenant>, AuthError> {
        bounded(
            self.config.store_timeout,
            "memberships.tenants_for_user",
            self.stores.memberships.tenants_for_user(user_id),
        )
        .await
    }

    /// Look up the user by email and compare the password hash.
    pub async fn check_credentials(&self, email: &Email, password: &str) -> Result<CredentialCheck, AuthError> {
        let user = bounded(
            self.config.store_timeout,
            "users.get_by_email",
            self.stores.users.get_by_email(email),
        )
        .await?;

        let Some(user) = user else {
            return Ok(CredentialCheck::Rejected { user_id: None });
        };

        let matches =
            password::verify_password_blocking(password.to_string(), user.password_hash.clone()).await?;
        if matches {
            Ok(CredentialCheck::Verified(user))
        } else {
            Ok(CredentialCheck::Rejected {
                user_id: Some(user.id),
            })
        }
    }

    /// Membership + active check for a resolved user.
    ///
    /// An unknown tenant is reported as access denied, like a foreign one.
    pub(crate) async fn ensure_access(&self, user: &User, slug: &TenantSlug) -> Result<Tenant, LoginFailure> {
        let failure = |error: AuthError, tenant_id: Option<TenantId>| LoginFailure {
            error,
            user_id: Some(user.id),
            tenant_id,
        };

        let tenant = self
            .find_tenant(slug)
            .await
            .map_err(|e| failure(e, None))?
            .ok_or_else(|| failure(AuthError::TenantAccessDenied(slug.to_string()), None))?;

        let is_member = bounded(
            self.config.store_timeout,
            "memberships.is_member",
            self.stores.memberships.is_member(user.id, tenant.id),
        )
        .await
        .map_err(|e| failure(e, Some(tenant.id)))?;

        if !is_member || !tenant.is_active {
            info!(user_id = %user.id, tenant = %slug, is_member, is_active = tenant.is_active, "tenant access denied");
            return Err(failure(AuthError::TenantAccessDenied(slug.to_string()), Some(tenant.id)));
        }
        Ok(tenant)
    }

    /// Mint a token for `tenant`, listing every tenant the user belongs to.
    pub async fn issue_for(
        &self,
        user: &User,
        tenant: &Tenant,
        ttl: chrono::Duration,
        now: DateTime<Utc>,
    ) -> Result<IssuedToken, AuthError> {
        let tenants = self.tenants_for_user(user.id).await?;
        self.issuer
            .issue(user.id, tenants.into_iter().map(|t| t.slug), &tenant.slug, ttl, now)
    }

    // ---------------------------------------------------------------------
    // API operations
    // ---------------------------------------------------------------------

    pub async fn login(&self, input: LoginInput) -> Result<LoginOutput, AuthError> {
        self.login_at(input, Utc::now()).await
    }

    /// Email/password login into a named tenant.
    ///
    /// Input errors are rejected before anything is recorded; every later
    /// outcome appends exactly one audit row.
    #[instrument(skip_all, fields(tenant = input.tenant_slug.as_deref().unwrap_or_default()))]
    pub async fn login_at(&self, input: LoginInput, now: DateTime<Utc>) -> Result<LoginOutput, AuthError> {
        let (email, password, slug) = parse_login_input(&input)?;

        match self.login_flow(&email, password, &slug, now).await {
            Ok(output) => {
                let mut audit = NewLoginAudit::success(
                    output.user.id,
                    Some(output.tenant.id),
                    LoginMethod::Api,
                    Some(output.token.claims.jti.clone()),
                )
                .with_client(input.client.ip_address.clone(), input.client.user_agent.clone());
                audit.login_at = now;
                self.recorder.record_login(audit).await;
                info!(user_id = %output.user.id, tenant = %slug, "login succeeded");
                Ok(output)
            }
            Err(failure) => {
                self.recorder
                    .record_login(failure.into_audit(LoginMethod::Api, &input.client, now))
                    .await;
                Err(failure.error)
            }
        }
    }

    async fn login_flow(
        &self,
        email: &Email,
        password: &str,
        slug: &TenantSlug,
        now: DateTime<Utc>,
    ) -> Result<LoginOutput, LoginFailure> {
        let user = match self.check_credentials(email, password).await? {
            CredentialCheck::Verified(user) => user,
            CredentialCheck::Rejected { user_id } => {
                return Err(LoginFailure {
                    error: AuthError::InvalidCredentials,
                    user_id,
                    tenant_id: None,
                });
            }
        };

        let tenant = self.ensure_access(&user, slug).await?;
        let token = self
            .issue_for(&user, &tenant, self.config.access_ttl(), now)
            .await
            .map_err(|e| LoginFailure {
                error: e,
                user_id: Some(user.id),
                tenant_id: Some(tenant.id),
            })?;

        Ok(LoginOutput { token, user, tenant })
    }

    pub async fn register(&self, input: RegisterInput) -> Result<LoginOutput, AuthError> {
        self.register_at(input, Utc::now()).await
    }

    /// Create a user, attach it to the named tenant and issue a token for it.
    #[instrument(skip_all, fields(tenant = input.tenant_slug.as_deref().unwrap_or_default()))]
    pub async fn register_at(&self, input: RegisterInput, now: DateTime<Utc>) -> Result<LoginOutput, AuthError> {
        let mut errors = ValidationErrors::new();

        let name = errors.required("name", input.name.as_deref());
        if name.is_some_and(|n| n.chars().count() > MAX_NAME_LEN) {
            errors.add("name", "The name may not be greater than 255 characters.");
        }

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
        match password {
            None => errors.add("password", "The password field is required."),
            Some(p) if p.chars().count() < MIN_PASSWORD_LEN => {
                errors.add("password", "The password must be at least 8 characters.")
            }
            Some(p) => {
                if input.password_confirmation.as_deref().is_some_and(|c| c != p) {
                    errors.add("password", "The password confirmation does not match.");
                }
            }
        }

        let slug = errors
            .required("tenant_slug", input.tenant_slug.as_deref())
            .and_then(|raw| match TenantSlug::parse(raw) {
                Ok(slug) => Some(slug),
                Err(_) => {
                    errors.add("tenant_slug", "The tenant slug format is invalid.");
                    None
                }
            });

        if let Some(email) = &email {
            let existing = bounded(
                self.config.store_timeout,
                "users.get_by_email",
                self.stores.users.get_by_email(email),
            )
            .await?;
            if existing.is_some() {
                errors.add("email", "The email has already been taken.");
            }
        }

        let (Some(name), Some(email), Some(password), Some(slug)) = (name, email, password, slug) else {
            return Err(AuthError::Validation(errors));
        };
        errors.into_result()?;

        let tenant = self
            .find_tenant(&slug)
            .await?
            .ok_or_else(|| AuthError::not_found("tenant", slug.as_str()))?;
        if !tenant.is_active {
            return Err(AuthError::TenantUnavailable {
                tenant: slug.to_string(),
                reason: "Tenant is inactive".into(),
            });
        }
        let members = bounded(
            self.config.store_timeout,
            "memberships.member_count",
            self.stores.memberships.member_count(tenant.id),
        )
        .await?;
        if !tenant.has_capacity(members) {
            return Err(AuthError::TenantUnavailable {
                tenant: slug.to_string(),
                reason: "Tenant user limit reached".into(),
            });
        }

        let password_hash = password::hash_password_blocking(password.to_string(), self.config.bcrypt_cost).await?;
        let user = tokio::time::timeout(
            self.config.store_timeout,
            self.stores.users.create_with_membership(
                NewUser {
                    name: name.to_string(),
                    email,
                    password_hash,
                    is_admin: false,
                },
                tenant.id,
            ),
        )
        .await
        .map_err(|_| AuthError::from(StoreError::Timeout(self.config.store_timeout.as_millis() as u64)))?
        .map_err(|e| match e {
            StoreError::Conflict(_) => AuthError::validation("email", "The email has already been taken."),
            other => other.into(),
        })?;

        // A new user belongs to exactly this tenant.
        let token = self.issuer.issue(
            user.id,
            [tenant.slug.clone()],
            &tenant.slug,
            self.config.access_ttl(),
            now,
        )?;
        info!(user_id = %user.id, tenant = %tenant.slug, "user registered");
        Ok(LoginOutput { token, user, tenant })
    }

    pub async fn validate(&self, token: &str, tenant_slug: &str) -> Result<ValidatedToken, AuthError> {
        self.validate_at(token, tenant_slug, Utc::now()).await
    }

    /// Full validation of a token against the tenant asking about it.
    pub async fn validate_at(
        &self,
        token: &str,
        tenant_slug: &str,
        now: DateTime<Utc>,
    ) -> Result<ValidatedToken, AuthError> {
        let mut errors = ValidationErrors::new();
        let token = errors.required("token", Some(token));
        let slug = errors.required("tenant_slug", Some(tenant_slug));
        errors.into_result()?;
        let (Some(token), Some(slug)) = (token, slug) else {
            return Err(AuthError::validation("token", "The token field is required."));
        };
        let slug = TenantSlug::parse(slug).map_err(|e| field_error("tenant_slug", e))?;

        self.verify(token, Some(&slug), now).await
    }

    pub async fn authenticate_bearer(&self, token: &str) -> Result<ValidatedToken, AuthError> {
        self.authenticate_bearer_at(token, Utc::now()).await
    }

    /// Validate a bearer token against its own `current_tenant`.
    pub async fn authenticate_bearer_at(&self, token: &str, now: DateTime<Utc>) -> Result<ValidatedToken, AuthError> {
        self.verify(token, None, now).await
    }

    async fn verify(
        &self,
        token: &str,
        expected: Option<&TenantSlug>,
        now: DateTime<Utc>,
    ) -> Result<ValidatedToken, AuthError> {
        let claims = self.validator.decode(token, now)?;

        let entry = bounded(
            self.config.store_timeout,
            "denylist.get",
            self.stores.denylist.get(&claims.jti),
        )
        .await?;
        self.validator
            .check_denylist(entry.as_ref(), self.config.blacklist_grace(), now)?;

        if let Some(expected) = expected {
            self.validator.authorize_tenant(&claims, expected)?;
        }

        let user = self
            .find_user(claims.sub)
            .await?
            .ok_or_else(|| AuthError::invalid_token("user no longer exists"))?;

        Ok(ValidatedToken {
            user,
            claims,
            token: token.to_string(),
        })
    }

    pub async fn refresh(&self, current: &ValidatedToken) -> Result<IssuedToken, AuthError> {
        self.refresh_at(current, Utc::now()).await
    }

    /// Reissue with the refresh TTL and invalidate the presented token.
    ///
    /// The open audit row moves to the new `jti`, so a later logout of the
    /// refreshed token still closes it.
    #[instrument(skip_all, fields(user_id = %current.user.id))]
    pub async fn refresh_at(&self, current: &ValidatedToken, now: DateTime<Utc>) -> Result<IssuedToken, AuthError> {
        let tenants = self.tenants_for_user(current.user.id).await?;
        let still_allowed = tenants
            .iter()
            .any(|t| t.slug == current.claims.current_tenant && t.is_active);
        if !still_allowed {
            return Err(AuthError::invalid_token("tenant access has been revoked"));
        }

        let issued = self.issuer.issue(
            current.user.id,
            tenants.into_iter().map(|t| t.slug),
            &current.claims.current_tenant,
            self.config.refresh_ttl(),
            now,
        )?;

        self.invalidate(&current.claims, now).await?;
        self.recorder
            .record_refresh(&current.claims.jti, &issued.claims.jti)
            .await;
        Ok(issued)
    }

    pub async fn logout(&self, current: &ValidatedToken) -> Result<(), AuthError> {
        self.logout_at(current, Utc::now()).await
    }

    /// Denylist the token and close its audit row (keyed by `jti`).
    #[instrument(skip_all, fields(user_id = %current.user.id))]
    pub async fn logout_at(&self, current: &ValidatedToken, now: DateTime<Utc>) -> Result<(), AuthError> {
        self.invalidate(&current.claims, now).await?;
        self.recorder.record_logout(&current.claims.jti, now).await;
        info!(jti = %current.claims.jti, "token logged out");
        Ok(())
    }

    async fn invalidate(&self, claims: &TokenClaims, now: DateTime<Utc>) -> Result<(), AuthError> {
        let entry = DenylistEntry {
            jti: claims.jti.clone(),
            invalidated_at: now,
            expires_at: claims.expires_at(),
        };
        bounded(self.config.store_timeout, "denylist.add", self.stores.denylist.add(entry))
            .await
            .map_err(|e| match e {
                AuthError::Infrastructure(_) => e,
                other => AuthError::Infrastructure(other.to_string()),
            })
    }

    // ---------------------------------------------------------------------
    // Trusted audit API
    // ---------------------------------------------------------------------

    pub async fn record_external_login(&self, input: ExternalLoginAudit) -> Result<LoginAudit, AuthError> {
        self.record_external_login_at(input, Utc::now()).await
    }

    pub async fn record_external_login_at(
        &self,
        input: ExternalLoginAudit,
        now: DateTime<Utc>,
    ) -> Result<LoginAudit, AuthError> {
        self.find_user(input.user_id)
            .await?
            .ok_or_else(|| AuthError::not_found("user", input.user_id.to_string()))?;

        let tenant_id = match input.tenant_slug.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            Some(raw) => {
                let slug = TenantSlug::parse(raw).map_err(|e| field_error("tenant_slug", e))?;
                let tenant = self
                    .find_tenant(&slug)
                    .await?
                    .ok_or_else(|| AuthError::not_found("tenant", slug.as_str()))?;
                Some(tenant.id)
            }
            None => None,
        };

        let audit = NewLoginAudit {
            user_id: Some(input.user_id),
            tenant_id,
            login_method: input.login_method,
            is_successful: input.is_successful,
            failure_reason: if input.is_successful { None } else { input.failure_reason },
            session_id: input.session_id,
            ip_address: input.client.ip_address,
            user_agent: input.client.user_agent,
            login_at: now,
        };
        self.recorder.try_record_login(audit).await
    }

    pub async fn record_external_logout(&self, session_id: &str, now: DateTime<Utc>) -> Result<CloseOutcome, AuthError> {
        let session_id = session_id.trim();
        if session_id.is_empty() {
            return Err(AuthError::validation("session_id", "The session id field is required."));
        }
        self.recorder.try_record_logout(session_id, now).await
    }
}

fn parse_login_input(input: &LoginInput) -> Result<(Email, &str, TenantSlug), AuthError> {
    let mut errors = ValidationErrors::new();
    let email = errors.required("email", input.email.as_deref());
    let password = input.password.as_deref().filter(|p| !p.is_empty());
    if password.is_none() {
        errors.add("password", "The password field is required.");
    }
    let slug = errors.required("tenant_slug", input.tenant_slug.as_deref());

    let email = email.and_then(|raw| match Email::parse(raw) {
        Ok(email) => Some(email),
        Err(_) => {
            errors.add("email", "The email must be a valid email address.");
            None
        }
    });
    let slug = slug.and_then(|raw| match TenantSlug::parse(raw) {
        Ok(slug) => Some(slug),
        Err(_) => {
            errors.add("tenant_slug", "The tenant slug format is invalid.");
            None
        }
    });

    match (email, password, slug) {
        (Some(email), Some(password), Some(slug)) if errors.is_empty() => Ok((email, password, slug)),
        _ => Err(AuthError::Validation(errors)),
    }
}

impl From<LoginFailure> for AuthError {
    fn from(failure: LoginFailure) -> Self {
        failure.error
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn login_input_requires_every_field() {
        let err = parse_login_input(&LoginInput::default()).unwrap_err();
        let AuthError::Validation(errors) = err else {
            panic!("expected validation error");
        };
        assert!(errors.has("email"));
        assert!(errors.has("password"));
        assert!(errors.has("tenant_slug"));
    }

    #[test]
    fn login_input_rejects_malformed_email() {
        let input = LoginInput {
            email: Some("not-an-email".into()),
            password: Some("pw".into()),
            tenant_slug: Some("t1".into()),
            ..Default::default()
        };
        let AuthError::Validation(errors) = parse_login_input(&input).unwrap_err() else {
            panic!("expected validation error");
        };
        assert_eq!(errors.get("email").unwrap(), ["The email must be a valid email address."]);
    }

    #[test]
    fn failure_audit_carries_reason_and_client() {
        let failure = LoginFailure::new(AuthError::InvalidCredentials);
        let client = ClientInfo {
            ip_address: Some("10.0.0.1".into()),
            user_agent: Some("curl".into()),
        };
        let now = Utc::now();
        let audit = failure.into_audit(LoginMethod::Api, &client, now);
        assert!(!audit.is_successful);
        assert_eq!(audit.user_id, None);
        assert_eq!(audit.failure_reason.as_deref(), Some("Invalid credentials"));
        assert_eq!(audit.ip_address.as_deref(), Some("10.0.0.1"));
        assert_eq!(audit.login_at, now);
    }
}
