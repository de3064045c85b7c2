//! Token Issuer: mints HS256 JWTs carrying the multi-tenant claims.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use tracing::error;

use ssogate_core::{TenantSlug, UserId};

use crate::claims::{ClaimsError, TokenClaims};
use crate::error::AuthError;

/// A signed token together with the claims it carries.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub claims: TokenClaims,
}

impl IssuedToken {
    /// Lifetime in seconds, as reported to clients (`expires_in`).
    pub fn expires_in(&self) -> i64 {
        self.claims.lifetime_secs()
    }
}

/// Signs tokens. Holds no state besides the key.
#[derive(Clone)]
pub struct TokenIssuer {
    key: Option<EncodingKey>,
}

impl core::fmt::Debug for TokenIssuer {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TokenIssuer")
            .field("has_key", &self.key.is_some())
            .finish()
    }
}

impl TokenIssuer {
    /// An empty secret yields an issuer that refuses to sign.
    pub fn new(secret: &str) -> Self {
        let key = (!secret.is_empty()).then(|| EncodingKey::from_secret(secret.as_bytes()));
        Self { key }
    }

    /// Mint a token for `user_id` scoped to `current_tenant`.
    ///
    /// `tenants` is the user's full membership at issuance time; the caller
    /// has already verified membership in `current_tenant`.
    pub fn issue(
        &self,
        user_id: UserId,
        tenants: impl IntoIterator<Item = TenantSlug>,
        current_tenant: &TenantSlug,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<IssuedToken, AuthError> {
        let claims = TokenClaims::new(user_id, tenants, current_tenant.clone(), now, ttl).map_err(
            |e| match e {
                ClaimsError::CurrentTenantOutOfScope(slug) => AuthError::TenantAccessDenied(slug),
                other => AuthError::Signing(other.to_string()),
            },
        )?;

        let key = self.key.as_ref().ok_or_else(|| {
            error!(user_id = %user_id, "token signing key is not configured");
            AuthError::Signing("signing key unavailable".into())
        })?;

        let token = jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, key).map_err(|e| {
            error!(user_id = %user_id, error = %e, "JWT encode failed");
            AuthError::Signing(format!("JWT encode: {e}"))
        })?;

        Ok(IssuedToken { token, claims })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slug(s: &str) -> TenantSlug {
        TenantSlug::parse(s).unwrap()
    }

    #[test]
    fn issues_three_part_token() {
        let issuer = TokenIssuer::new("test-secret");
        let issued = issuer
            .issue(UserId::new(), [slug("t1"), slug("t2")], &slug("t2"), Duration::minutes(10), Utc::now())
            .unwrap();
        assert_eq!(issued.token.split('.').count(), 3);
        assert_eq!(issued.claims.current_tenant, slug("t2"));
        assert_eq!(issued.expires_in(), 600);
    }

    #[test]
    fn missing_key_is_a_signing_error() {
        let issuer = TokenIssuer::new("");
        let err = issuer
            .issue(UserId::new(), [slug("t1")], &slug("t1"), Duration::minutes(10), Utc::now())
            .unwrap_err();
        assert!(matches!(err, AuthError::Signing(_)));
    }

    #[test]
    fn jti_is_unique() {
        let issuer = TokenIssuer::new("test-secret");
        let uid = UserId::new();
        let now = Utc::now();
        let a = issuer.issue(uid, [slug("t1")], &slug("t1"), Duration::minutes(1), now).unwrap();
        let b = issuer.issue(uid, [slug("t1")], &slug("t1"), Duration::minutes(1), now).unwrap();
        assert_ne!(a.claims.jti, b.claims.jti);
    }
}
