//! Redis-backed denylist.
//!
//! Each entry is a JSON value under `ssogate:denylist:{jti}` with an `EX`
//! matching the token's remaining lifetime, so Redis evicts entries on its
//! own once the token could no longer be used anyway.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{error, instrument};

use ssogate_core::{DenylistEntry, DenylistRepository, StoreError, StoreResult};

const DEFAULT_KEY_PREFIX: &str = "ssogate:denylist";

#[derive(Debug, Clone)]
pub struct RedisDenylist {
    client: Arc<redis::Client>,
    key_prefix: String,
}

impl RedisDenylist {
    pub fn new(redis_url: impl AsRef<str>) -> StoreResult<Self> {
        let client = redis::Client::open(redis_url.as_ref())
            .map_err(|e| StoreError::backend(format!("failed to create Redis client: {e}")))?;
        Ok(Self {
            client: Arc::new(client),
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
        })
    }

    fn key(&self, jti: &str) -> String {
        format!("{}:{}", self.key_prefix, jti)
    }

    /// Run a blocking Redis round-trip on the blocking pool.
    async fn with_connection<T, F>(&self, operation: &'static str, f: F) -> StoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut redis::Connection) -> redis::RedisResult<T> + Send + 'static,
    {
        let client = self.client.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = client.get_connection()?;
            f(&mut conn)
        })
        .await
        .map_err(|e| StoreError::backend(format!("redis task failed in {operation}: {e}")))?
        .map_err(|e| {
            error!(operation, error = %e, "redis command failed");
            StoreError::backend(format!("redis error in {operation}: {e}"))
        })
    }
}

/// Seconds until the entry is useless; at least one so `EX` is valid.
fn ttl_secs(entry: &DenylistEntry, now: DateTime<Utc>) -> u64 {
    (entry.expires_at - now).num_seconds().max(1) as u64
}

#[async_trait]
impl DenylistRepository for RedisDenylist {
    /// `SET NX`: the first invalidation of a token wins.
    #[instrument(skip(self, entry), fields(jti = %entry.jti))]
    async fn add(&self, entry: DenylistEntry) -> StoreResult<()> {
        let now = Utc::now();
        if entry.expires_at <= now {
            return Ok(());
        }
        let key = self.key(&entry.jti);
        let ttl = ttl_secs(&entry, now);
        let value = serde_json::to_string(&entry)
            .map_err(|e| StoreError::backend(format!("failed to encode denylist entry: {e}")))?;

        self.with_connection("denylist_add", move |conn| {
            redis::cmd("SET")
                .arg(&key)
                .arg(&value)
                .arg("EX")
                .arg(ttl)
                .arg("NX")
                .query::<Option<String>>(conn)
                .map(|_| ())
        })
        .await
    }

    async fn get(&self, jti: &str) -> StoreResult<Option<DenylistEntry>> {
        let key = self.key(jti);
        let raw = self
            .with_connection("denylist_get", move |conn| {
                redis::cmd("GET").arg(&key).query::<Option<String>>(conn)
            })
            .await?;

        raw.map(|raw| {
            serde_json::from_str(&raw)
                .map_err(|e| StoreError::backend(format!("failed to decode denylist entry: {e}")))
        })
        .transpose()
    }

    /// Redis expires keys itself.
    async fn purge_expired(&self, _now: DateTime<Utc>) -> StoreResult<u64> {
        Ok(0)
    }
}
