use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use ssogate_core::{TenantSlug, UserId};

/// JWT claims model.
///
/// This is the fixed claim shape shared with tenant applications. Slugs are
/// validated while deserializing, so a decoded value is always well formed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Subject / user identifier.
    pub sub: UserId,

    /// Issued-at (Unix seconds).
    pub iat: i64,

    /// Expiration (Unix seconds).
    pub exp: i64,

    /// Not-before (Unix seconds).
    pub nbf: i64,

    /// Unique token id, the denylist key.
    pub jti: String,

    /// Every tenant the user could access at issuance, sorted.
    pub tenants: Vec<TenantSlug>,

    /// The tenant this token session is scoped to. Always an element of `tenants`.
    pub current_tenant: TenantSlug,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ClaimsError {
    #[error("token has expired")]
    Expired,

    #[error("token not yet valid")]
    NotYetValid,

    #[error("invalid token time window (exp <= iat)")]
    InvalidTimeWindow,

    #[error("current_tenant '{0}' is not in the tenants claim")]
    CurrentTenantOutOfScope(String),

    #[error("token lifetime must be positive")]
    NonPositiveTtl,
}

impl TokenClaims {
    /// Build claims for a fresh token.
    ///
    /// `tenants` is sorted and de-duplicated; `current_tenant` must be one of them.
    pub fn new(
        sub: UserId,
        tenants: impl IntoIterator<Item = TenantSlug>,
        current_tenant: TenantSlug,
        issued_at: DateTime<Utc>,
        ttl: Duration,
    ) -> Result<Self, ClaimsError> {
        if ttl <= Duration::zero() {
            return Err(ClaimsError::NonPositiveTtl);
        }

        let mut tenants: Vec<TenantSlug> = tenants.into_iter().collect();
        tenants.sort();
        tenants.dedup();
        if tenants.binary_search(&current_tenant).is_err() {
            return Err(ClaimsError::CurrentTenantOutOfScope(current_tenant.to_string()));
        }

        let iat = issued_at.timestamp();
        Ok(Self {
            sub,
            iat,
            exp: iat + ttl.num_seconds(),
            nbf: iat,
            jti: Uuid::new_v4().simple().to_string(),
            tenants,
            current_tenant,
        })
    }

    pub fn has_tenant(&self, slug: &TenantSlug) -> bool {
        self.tenants.contains(slug)
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        Utc.timestamp_opt(self.exp, 0)
            .single()
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    pub fn issued_at(&self) -> DateTime<Utc> {
        Utc.timestamp_opt(self.iat, 0)
            .single()
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// Seconds between issuance and expiry.
    pub fn lifetime_secs(&self) -> i64 {
        self.exp - self.iat
    }
}

/// Deterministically validate the time window and tenant shape of claims.
///
/// Signature verification happens before this, in [`crate::TokenValidator`].
pub fn validate_claims(
    claims: &TokenClaims,
    now: DateTime<Utc>,
    leeway_secs: i64,
) -> Result<(), ClaimsError> {
    if claims.exp <= claims.iat {
        return Err(ClaimsError::InvalidTimeWindow);
    }
    let now = now.timestamp();
    if now + leeway_secs < claims.nbf {
        return Err(ClaimsError::NotYetValid);
    }
    if now - leeway_secs >= claims.exp {
        return Err(ClaimsError::Expired);
    }
    if !claims.has_tenant(&claims.current_tenant) {
        return Err(ClaimsError::CurrentTenantOutOfScope(
            claims.current_tenant.to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn slug(s: &str) -> TenantSlug {
        TenantSlug::parse(s).unwrap()
    }

    #[test]
    fn tenants_are_sorted_and_deduplicated() {
        let claims = TokenClaims::new(
            UserId::new(),
            [slug("t2"), slug("t1"), slug("t2")],
            slug("t2"),
            Utc::now(),
            Duration::minutes(5),
        )
        .unwrap();
        assert_eq!(claims.tenants, vec![slug("t1"), slug("t2")]);
        assert_eq!(claims.lifetime_secs(), 300);
        assert_eq!(claims.nbf, claims.iat);
    }

    #[test]
    fn current_tenant_must_be_listed() {
        let err = TokenClaims::new(UserId::new(), [slug("t1")], slug("t2"), Utc::now(), Duration::minutes(5))
            .unwrap_err();
        assert_eq!(err, ClaimsError::CurrentTenantOutOfScope("t2".into()));
    }

    #[test]
    fn time_window_checks() {
        let now = Utc::now();
        let claims = TokenClaims::new(UserId::new(), [slug("t1")], slug("t1"), now, Duration::minutes(1)).unwrap();

        assert_eq!(validate_claims(&claims, now, 0), Ok(()));
        assert_eq!(
            validate_claims(&claims, now + Duration::minutes(1), 0),
            Err(ClaimsError::Expired)
        );
        assert_eq!(validate_claims(&claims, now + Duration::minutes(1), 5), Ok(()));
        assert_eq!(
            validate_claims(&claims, now - Duration::seconds(10), 0),
            Err(ClaimsError::NotYetValid)
        );
    }

    #[test]
    fn wire_shape_uses_plain_strings() {
        let claims = TokenClaims::new(UserId::new(), [slug("t1")], slug("t1"), Utc::now(), Duration::minutes(1)).unwrap();
        let json = serde_json::to_value(&claims).unwrap();
        assert_eq!(json["tenants"], serde_json::json!(["t1"]));
        assert_eq!(json["current_tenant"], "t1");
        assert_eq!(json["sub"], claims.sub.to_string());
    }

    proptest! {
        #[test]
        fn current_tenant_always_in_tenants(
            names in proptest::collection::vec("[a-z][a-z0-9]{0,8}", 1..6),
            pick in any::<prop::sample::Index>(),
        ) {
            let slugs: Vec<TenantSlug> = names.iter().map(|n| slug(n)).collect();
            let current = pick.get(&slugs).clone();
            let claims = TokenClaims::new(UserId::new(), slugs.clone(), current, Utc::now(), Duration::minutes(1)).unwrap();
            prop_assert!(claims.tenants.contains(&claims.current_tenant));
            prop_assert!(claims.tenants.windows(2).all(|w| w[0] < w[1]));
        }
    }
}
