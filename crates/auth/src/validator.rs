//! Token Validator: signature, required claims, time window, denylist and
//! tenant scope checks.
//!
//! Each check is a separate step so the service can run the cheap,
//! IO-free ones first and only then consult the denylist store.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde_json::{Map, Value};

use ssogate_core::{DenylistEntry, TenantSlug};

use crate::claims::{TokenClaims, validate_claims};
use crate::error::AuthError;

#[derive(Clone)]
pub struct TokenValidator {
    key: Option<DecodingKey>,
    validation: Validation,
    required_claims: Vec<String>,
    leeway_secs: i64,
}

impl core::fmt::Debug for TokenValidator {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TokenValidator")
            .field("has_key", &self.key.is_some())
            .field("required_claims", &self.required_claims)
            .field("leeway_secs", &self.leeway_secs)
            .finish()
    }
}

impl TokenValidator {
    pub fn new(secret: &str, required_claims: Vec<String>, leeway_secs: i64) -> Self {
        let key = (!secret.is_empty()).then(|| DecodingKey::from_secret(secret.as_bytes()));

        // Time checks run in `validate_claims` against an injected clock.
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();
        validation.leeway = 0;

        Self {
            key,
            validation,
            required_claims,
            leeway_secs,
        }
    }

    /// Verify the signature, then the claim set and its time window.
    pub fn decode(&self, token: &str, now: DateTime<Utc>) -> Result<TokenClaims, AuthError> {
        let key = self
            .key
            .as_ref()
            .ok_or_else(|| AuthError::Signing("verification key unavailable".into()))?;

        let data = jsonwebtoken::decode::<Map<String, Value>>(token, key, &self.validation)
            .map_err(|e| AuthError::invalid_token(e.to_string()))?;

        if let Some(missing) = self
            .required_claims
            .iter()
            .find(|claim| !data.claims.contains_key(claim.as_str()))
        {
            return Err(AuthError::invalid_token(format!(
                "missing required claim '{missing}'"
            )));
        }

        let claims: TokenClaims = serde_json::from_value(Value::Object(data.claims))
            .map_err(|e| AuthError::invalid_token(format!("malformed claims: {e}")))?;

        validate_claims(&claims, now, self.leeway_secs)
            .map_err(|e| AuthError::invalid_token(e.to_string()))?;

        Ok(claims)
    }

    /// Reject a token once its invalidation is older than the grace window.
    ///
    /// During the window the token is still honoured so requests racing a
    /// logout are not failed.
    pub fn check_denylist(
        &self,
        entry: Option<&DenylistEntry>,
        grace: Duration,
        now: DateTime<Utc>,
    ) -> Result<(), AuthError> {
        match entry {
            Some(entry) if now >= entry.invalidated_at + grace => {
                Err(AuthError::invalid_token("token has been invalidated"))
            }
            _ => Ok(()),
        }
    }

    /// A valid token that does not list `expected` is a 403, not a 401.
    pub fn authorize_tenant(&self, claims: &TokenClaims, expected: &TenantSlug) -> Result<(), AuthError> {
        if claims.has_tenant(expected) {
            Ok(())
        } else {
            Err(AuthError::TenantAccessDenied(expected.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use jsonwebtoken::{EncodingKey, Header};
    use ssogate_core::UserId;

    use super::*;
    use crate::issuer::TokenIssuer;

    const SECRET: &str = "test-secret";

    fn slug(s: &str) -> TenantSlug {
        TenantSlug::parse(s).unwrap()
    }

    fn validator() -> TokenValidator {
        TokenValidator::new(
            SECRET,
            crate::config::DEFAULT_REQUIRED_CLAIMS.iter().map(|c| c.to_string()).collect(),
            0,
        )
    }

    fn issue(now: DateTime<Utc>) -> (String, TokenClaims) {
        let issued = TokenIssuer::new(SECRET)
            .issue(UserId::new(), [slug("t1"), slug("t2")], &slug("t1"), Duration::minutes(10), now)
            .unwrap();
        (issued.token, issued.claims)
    }

    #[test]
    fn decode_round_trips_claims() {
        let now = Utc::now();
        let (token, claims) = issue(now);
        assert_eq!(validator().decode(&token, now).unwrap(), claims);
    }

    #[test]
    fn wrong_secret_is_invalid_token() {
        let now = Utc::now();
        let (token, _) = issue(now);
        let other = TokenValidator::new("another-secret", vec![], 0);
        assert!(matches!(other.decode(&token, now), Err(AuthError::InvalidToken(_))));
    }

    #[test]
    fn expired_token_is_invalid() {
        let now = Utc::now();
        let (token, _) = issue(now);
        let err = validator().decode(&token, now + Duration::minutes(11)).unwrap_err();
        assert_eq!(err, AuthError::InvalidToken("token has expired".into()));
    }

    #[test]
    fn missing_required_claim_is_rejected() {
        let now = Utc::now().timestamp();
        let payload = serde_json::json!({
            "sub": UserId::new(),
            "iat": now,
            "exp": now + 60,
            "nbf": now,
            "tenants": ["t1"],
            "current_tenant": "t1",
        });
        let token = jsonwebtoken::encode(
            &Header::new(Algorithm::HS256),
            &payload,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap();

        let err = validator().decode(&token, Utc::now()).unwrap_err();
        assert_eq!(err, AuthError::InvalidToken("missing required claim 'jti'".into()));
    }

    #[test]
    fn denylist_honours_grace_window() {
        let v = validator();
        let now = Utc::now();
        let entry = DenylistEntry {
            jti: "abc".into(),
            invalidated_at: now,
            expires_at: now + Duration::minutes(10),
        };
        let grace = Duration::minutes(2);

        assert!(v.check_denylist(None, grace, now).is_ok());
        assert!(v.check_denylist(Some(&entry), grace, now + Duration::minutes(1)).is_ok());
        assert!(matches!(
            v.check_denylist(Some(&entry), grace, now + Duration::minutes(2)),
            Err(AuthError::InvalidToken(_))
        ));
        assert!(v.check_denylist(Some(&entry), Duration::zero(), now).is_err());
    }

    #[test]
    fn foreign_tenant_is_access_denied() {
        let (_, claims) = issue(Utc::now());
        let v = validator();
        assert!(v.authorize_tenant(&claims, &slug("t2")).is_ok());
        assert_eq!(
            v.authorize_tenant(&claims, &slug("t3")),
            Err(AuthError::TenantAccessDenied("t3".into()))
        );
    }
}
