use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use ssogate_core::{DenylistEntry, DenylistRepository, StoreResult};

use super::poisoned;

/// Invalidated token ids, evicted once the token itself has expired.
#[derive(Debug, Default)]
pub struct InMemoryDenylist {
    entries: RwLock<HashMap<String, DenylistEntry>>,
}

impl InMemoryDenylist {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl DenylistRepository for InMemoryDenylist {
    async fn add(&self, entry: DenylistEntry) -> StoreResult<()> {
        let mut entries = self.entries.write().map_err(|_| poisoned())?;
        entries
            .entry(entry.jti.clone())
            .and_modify(|existing| {
                if entry.invalidated_at < existing.invalidated_at {
                    existing.invalidated_at = entry.invalidated_at;
                }
            })
            .or_insert(entry);
        Ok(())
    }

    async fn get(&self, jti: &str) -> StoreResult<Option<DenylistEntry>> {
        let entries = self.entries.read().map_err(|_| poisoned())?;
        Ok(entries.get(jti).cloned())
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        let mut entries = self.entries.write().map_err(|_| poisoned())?;
        let before = entries.len();
        entries.retain(|_, e| e.expires_at > now);
        Ok((before - entries.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn entry(jti: &str, invalidated_at: DateTime<Utc>, ttl: Duration) -> DenylistEntry {
        DenylistEntry {
            jti: jti.into(),
            invalidated_at,
            expires_at: invalidated_at + ttl,
        }
    }

    #[tokio::test]
    async fn keeps_earliest_invalidation() {
        let store = InMemoryDenylist::new();
        let now = Utc::now();
        store.add(entry("a", now, Duration::minutes(5))).await.unwrap();
        store.add(entry("a", now + Duration::minutes(1), Duration::minutes(5))).await.unwrap();
        assert_eq!(store.get("a").await.unwrap().unwrap().invalidated_at, now);
    }

    #[tokio::test]
    async fn purges_entries_past_token_expiry() {
        let store = InMemoryDenylist::new();
        let now = Utc::now();
        store.add(entry("short", now, Duration::minutes(1))).await.unwrap();
        store.add(entry("long", now, Duration::minutes(60))).await.unwrap();

        assert_eq!(store.purge_expired(now + Duration::minutes(2)).await.unwrap(), 1);
        assert!(store.get("short").await.unwrap().is_none());
        assert!(store.get("long").await.unwrap().is_some());
        assert_eq!(store.len(), 1);
    }
}
