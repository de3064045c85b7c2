//! Configuration loading from `SSOGATE_*` environment variables.

use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;
use tracing::warn;

pub const DEV_JWT_SECRET: &str = "dev-secret-change-me";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var} is invalid: {reason}")]
    Invalid { var: &'static str, reason: String },
}

/// Process configuration.
///
/// Token lifetimes are administrative settings; nothing here is a
/// compile-time constant beyond its default.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind: SocketAddr,
    pub jwt_secret: String,
    pub access_ttl_minutes: i64,
    pub refresh_ttl_minutes: i64,
    pub blacklist_grace_minutes: i64,
    pub leeway_secs: i64,
    pub required_claims: Vec<String>,
    pub store_timeout: Duration,
    pub session_ttl_minutes: i64,
    pub database_url: Option<String>,
    pub redis_url: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], 8080)),
            jwt_secret: DEV_JWT_SECRET.to_string(),
            access_ttl_minutes: 60,
            refresh_ttl_minutes: 20_160,
            blacklist_grace_minutes: 0,
            leeway_secs: 0,
            required_claims: ["iat", "exp", "nbf", "sub", "jti"].map(String::from).to_vec(),
            store_timeout: Duration::from_millis(3_000),
            session_ttl_minutes: 120,
            database_url: None,
            redis_url: None,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source; unset and blank values fall
    /// back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let mut config = Self::default();

        if let Some(bind) = get("SSOGATE_BIND") {
            config.bind = bind.parse().map_err(|e| invalid("SSOGATE_BIND", e))?;
        }

        match get("SSOGATE_JWT_SECRET") {
            Some(secret) => config.jwt_secret = secret,
            None => warn!("SSOGATE_JWT_SECRET not set; using insecure dev default"),
        }

        config.access_ttl_minutes = positive("SSOGATE_JWT_TTL_MINUTES", get("SSOGATE_JWT_TTL_MINUTES"), config.access_ttl_minutes)?;
        config.refresh_ttl_minutes = positive(
            "SSOGATE_JWT_REFRESH_TTL_MINUTES",
            get("SSOGATE_JWT_REFRESH_TTL_MINUTES"),
            config.refresh_ttl_minutes,
        )?;
        config.blacklist_grace_minutes = non_negative(
            "SSOGATE_BLACKLIST_GRACE_MINUTES",
            get("SSOGATE_BLACKLIST_GRACE_MINUTES"),
            config.blacklist_grace_minutes,
        )?;
        config.leeway_secs = non_negative("SSOGATE_JWT_LEEWAY_SECONDS", get("SSOGATE_JWT_LEEWAY_SECONDS"), config.leeway_secs)?;
        config.session_ttl_minutes = positive(
            "SSOGATE_SESSION_TTL_MINUTES",
            get("SSOGATE_SESSION_TTL_MINUTES"),
            config.session_ttl_minutes,
        )?;

        if let Some(ms) = get("SSOGATE_STORE_TIMEOUT_MS") {
            let ms: u64 = ms.parse().map_err(|e| invalid("SSOGATE_STORE_TIMEOUT_MS", e))?;
            if ms == 0 {
                return Err(invalid("SSOGATE_STORE_TIMEOUT_MS", "must be greater than zero"));
            }
            config.store_timeout = Duration::from_millis(ms);
        }

        if let Some(claims) = get("SSOGATE_REQUIRED_CLAIMS") {
            config.required_claims = claims
                .split(',')
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(String::from)
                .collect();
        }

        config.database_url = get("SSOGATE_DATABASE_URL");
        config.redis_url = get("SSOGATE_REDIS_URL");
        Ok(config)
    }
}

fn invalid(var: &'static str, reason: impl ToString) -> ConfigError {
    ConfigError::Invalid {
        var,
        reason: reason.to_string(),
    }
}

fn parse_int(var: &'static str, raw: Option<String>, default: i64) -> Result<i64, ConfigError> {
    match raw {
        Some(raw) => raw.parse().map_err(|e| invalid(var, e)),
        None => Ok(default),
    }
}

fn positive(var: &'static str, raw: Option<String>, default: i64) -> Result<i64, ConfigError> {
    let value = parse_int(var, raw, default)?;
    if value <= 0 {
        return Err(invalid(var, "must be greater than zero"));
    }
    Ok(value)
}

fn non_negative(var: &'static str, raw: Option<String>, default: i64) -> Result<i64, ConfigError> {
    let value = parse_int(var, raw, default)?;
    if value < 0 {
        return Err(invalid(var, "must not be negative"));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn load(vars: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let map: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        AppConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = load(&[]).unwrap();
        assert_eq!(config.access_ttl_minutes, 60);
        assert_eq!(config.refresh_ttl_minutes, 20_160);
        assert_eq!(config.blacklist_grace_minutes, 0);
        assert_eq!(config.required_claims, vec!["iat", "exp", "nbf", "sub", "jti"]);
        assert_eq!(config.jwt_secret, DEV_JWT_SECRET);
        assert!(config.database_url.is_none());
    }

    #[test]
    fn overrides_are_parsed() {
        let config = load(&[
            ("SSOGATE_BIND", "127.0.0.1:9000"),
            ("SSOGATE_JWT_SECRET", "s3cret"),
            ("SSOGATE_JWT_TTL_MINUTES", "15"),
            ("SSOGATE_BLACKLIST_GRACE_MINUTES", "2"),
            ("SSOGATE_REQUIRED_CLAIMS", "sub, exp ,,jti"),
            ("SSOGATE_STORE_TIMEOUT_MS", "250"),
        ])
        .unwrap();
        assert_eq!(config.bind.port(), 9000);
        assert_eq!(config.jwt_secret, "s3cret");
        assert_eq!(config.access_ttl_minutes, 15);
        assert_eq!(config.blacklist_grace_minutes, 2);
        assert_eq!(config.required_claims, vec!["sub", "exp", "jti"]);
        assert_eq!(config.store_timeout, Duration::from_millis(250));
    }

    #[test]
    fn rejects_bad_values() {
        assert!(matches!(
            load(&[("SSOGATE_JWT_TTL_MINUTES", "0")]),
            Err(ConfigError::Invalid { var: "SSOGATE_JWT_TTL_MINUTES", .. })
        ));
        assert!(load(&[("SSOGATE_BLACKLIST_GRACE_MINUTES", "-1")]).is_err());
        assert!(load(&[("SSOGATE_BIND", "nope")]).is_err());
    }
}
