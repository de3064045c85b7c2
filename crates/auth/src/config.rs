//! Authentication configuration.

use std::time::Duration as StdDuration;

use chrono::Duration;

/// Claims every token must carry to be accepted.
pub const DEFAULT_REQUIRED_CLAIMS: [&str; 5] = ["iat", "exp", "nbf", "sub", "jti"];

/// Configuration for token issuance, validation and the login flows.
///
/// All lifetimes are administrative settings, never compile-time constants.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// HMAC secret for HS256 signing. Empty means "no key material".
    pub jwt_secret: String,
    /// Access token lifetime in minutes (default: 60).
    pub access_ttl_minutes: i64,
    /// Lifetime of tokens minted by refresh, in minutes (default: 20160 = 2 weeks).
    pub refresh_ttl_minutes: i64,
    /// Window after a logout during which the invalidated token is still
    /// honoured, in minutes (default: 0).
    pub blacklist_grace_minutes: i64,
    /// Clock skew tolerated on `exp`/`nbf`, in seconds (default: 0).
    pub leeway_secs: i64,
    /// Claim names that must be present in every token.
    pub required_claims: Vec<String>,
    /// Upper bound for a single store round-trip.
    pub store_timeout: StdDuration,
    /// First-party browser session lifetime in minutes (default: 120).
    pub session_ttl_minutes: i64,
    /// bcrypt cost for newly hashed passwords (default: 10).
    pub bcrypt_cost: u32,
}

impl AuthConfig {
    pub fn access_ttl(&self) -> Duration {
        Duration::minutes(self.access_ttl_minutes)
    }

    pub fn refresh_ttl(&self) -> Duration {
        Duration::minutes(self.refresh_ttl_minutes)
    }

    pub fn blacklist_grace(&self) -> Duration {
        Duration::minutes(self.blacklist_grace_minutes)
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::minutes(self.session_ttl_minutes)
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            access_ttl_minutes: 60,
            refresh_ttl_minutes: 20_160,
            blacklist_grace_minutes: 0,
            leeway_secs: 0,
            required_claims: DEFAULT_REQUIRED_CLAIMS.iter().map(|c| c.to_string()).collect(),
            store_timeout: StdDuration::from_millis(3_000),
            session_ttl_minutes: 120,
            bcrypt_cost: 10,
        }
    }
}
