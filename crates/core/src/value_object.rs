//! Validated value objects: equality by value, not identity.
//!
//! The parsers below are the only way to obtain one, so holding an `Email`
//! or a `TenantSlug` proves the input passed validation.

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};

const MAX_EMAIL_LEN: usize = 255;
const MAX_SLUG_LEN: usize = 100;

/// A syntactically valid, lower-cased email address.
///
/// Emails form a single global identity namespace (not per tenant), so the
/// address is normalised before it is stored or compared.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Email(String);

impl Email {
    pub fn parse(raw: &str) -> DomainResult<Self> {
        let value = raw.trim().to_lowercase();
        if value.is_empty() {
            return Err(DomainError::validation("email must not be empty"));
        }
        if value.len() > MAX_EMAIL_LEN {
            return Err(DomainError::validation("email must not exceed 255 characters"));
        }
        if value.chars().any(char::is_whitespace) {
            return Err(DomainError::validation("email must not contain whitespace"));
        }

        let (local, domain) = value
            .split_once('@')
            .ok_or_else(|| DomainError::validation("email must contain '@'"))?;
        if local.is_empty() || domain.contains('@') {
            return Err(DomainError::validation("email must be a valid email address"));
        }
        let labels: Vec<&str> = domain.split('.').collect();
        if labels.len() < 2 || labels.iter().any(|l| l.is_empty()) {
            return Err(DomainError::validation("email must be a valid email address"));
        }

        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for Email {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Email {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Email> for String {
    fn from(value: Email) -> Self {
        value.0
    }
}

/// Human-readable tenant identifier used in URLs and in the `tenants` /
/// `current_tenant` token claims.
///
/// Allowed: lowercase ASCII letters, digits, `-` and `_`, starting with a
/// letter or digit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TenantSlug(String);

impl TenantSlug {
    pub fn parse(raw: &str) -> DomainResult<Self> {
        let value = raw.trim();
        if value.is_empty() {
            return Err(DomainError::validation("tenant slug must not be empty"));
        }
        if value.len() > MAX_SLUG_LEN {
            return Err(DomainError::validation("tenant slug must not exceed 100 characters"));
        }
        let mut chars = value.chars();
        let first_ok = chars
            .next()
            .is_some_and(|c| c.is_ascii_lowercase() || c.is_ascii_digit());
        let rest_ok = value
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_');
        if !first_ok || !rest_ok {
            return Err(DomainError::validation(
                "tenant slug may only contain lowercase letters, digits, '-' and '_'",
            ));
        }
        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for TenantSlug {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for TenantSlug {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<TenantSlug> for String {
    fn from(value: TenantSlug) -> Self {
        value.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_is_normalised() {
        let email = Email::parse("  A@X.com ").unwrap();
        assert_eq!(email.as_str(), "a@x.com");
    }

    #[test]
    fn email_rejects_malformed_input() {
        for raw in ["", "no-at", "@x.com", "a@", "a@x", "a@@x.com", "a b@x.com", "a@x..com"] {
            assert!(Email::parse(raw).is_err(), "{raw:?} should be rejected");
        }
    }

    #[test]
    fn slug_accepts_url_safe_names() {
        assert_eq!(TenantSlug::parse("t1").unwrap().as_str(), "t1");
        assert_eq!(TenantSlug::parse("acme-corp_2").unwrap().as_str(), "acme-corp_2");
    }

    #[test]
    fn slug_rejects_uppercase_and_symbols() {
        for raw in ["", "Acme", "-lead", "a/b", "a b", "t1?x=1"] {
            assert!(TenantSlug::parse(raw).is_err(), "{raw:?} should be rejected");
        }
    }

    #[test]
    fn slug_deserialization_validates() {
        let ok: TenantSlug = serde_json::from_str("\"t1\"").unwrap();
        assert_eq!(ok.as_str(), "t1");
        assert!(serde_json::from_str::<TenantSlug>("\"Bad Slug\"").is_err());
    }
}
