//! Tenant record (Tenant Registry row).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{TenantId, TenantSlug};

/// An isolated customer namespace users may be granted access to.
///
/// # Invariants
/// - `slug` is immutable once tokens reference it (no rename operation exists).
/// - A tenant may only be deleted while it has zero members.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tenant {
    pub id: TenantId,
    pub slug: TenantSlug,
    pub name: String,
    /// Host of the tenant application, used to derive its SSO callback URL.
    pub domain: Option<String>,
    pub is_active: bool,
    pub max_users: Option<u32>,
    pub created_at: DateTime<Utc>,
}

impl Tenant {
    /// Default SSO callback for this tenant's application, if it has a domain.
    pub fn callback_url(&self) -> Option<String> {
        self.domain
            .as_deref()
            .map(|domain| format!("https://{domain}/sso/callback"))
    }

    /// Whether another member can be attached given the current member count.
    pub fn has_capacity(&self, current_members: u64) -> bool {
        match self.max_users {
            Some(max) => current_members < u64::from(max),
            None => true,
        }
    }
}

/// Input for creating a tenant.
#[derive(Debug, Clone)]
pub struct NewTenant {
    pub slug: TenantSlug,
    pub name: String,
    pub domain: Option<String>,
    pub is_active: bool,
    pub max_users: Option<u32>,
}

impl NewTenant {
    /// An active tenant without a user cap or domain.
    pub fn active(slug: TenantSlug, name: impl Into<String>) -> Self {
        Self {
            slug,
            name: name.into(),
            domain: None,
            is_active: true,
            max_users: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tenant(domain: Option<&str>, max_users: Option<u32>) -> Tenant {
        Tenant {
            id: TenantId::new(),
            slug: TenantSlug::parse("t1").unwrap(),
            name: "Tenant One".into(),
            domain: domain.map(str::to_string),
            is_active: true,
            max_users,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn callback_url_is_derived_from_domain() {
        assert_eq!(
            tenant(Some("app.t1.test"), None).callback_url().as_deref(),
            Some("https://app.t1.test/sso/callback")
        );
        assert_eq!(tenant(None, None).callback_url(), None);
    }

    #[test]
    fn capacity_respects_cap() {
        assert!(tenant(None, None).has_capacity(10_000));
        assert!(tenant(None, Some(2)).has_capacity(1));
        assert!(!tenant(None, Some(2)).has_capacity(2));
    }
}
