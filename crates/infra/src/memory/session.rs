use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use ssogate_core::{BrowserSession, SessionId, SessionRepository, StoreResult, UserId};

use super::poisoned;

#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<SessionId, BrowserSession>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored sessions, expired ones included.
    pub fn len(&self) -> usize {
        self.sessions.read().map(|s| s.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl SessionRepository for InMemorySessionStore {
    async fn create(&self, user_id: UserId, expires_at: DateTime<Utc>) -> StoreResult<BrowserSession> {
        let session = BrowserSession {
            id: SessionId::generate(),
            user_id,
            created_at: Utc::now(),
            expires_at,
        };
        self.sessions
            .write()
            .map_err(|_| poisoned())?
            .insert(session.id.clone(), session.clone());
        Ok(session)
    }

    async fn get(&self, id: &SessionId) -> StoreResult<Option<BrowserSession>> {
        let sessions = self.sessions.read().map_err(|_| poisoned())?;
        Ok(sessions.get(id).filter(|s| !s.is_expired(Utc::now())).cloned())
    }

    async fn destroy(&self, id: &SessionId) -> StoreResult<()> {
        self.sessions.write().map_err(|_| poisoned())?.remove(id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    #[tokio::test]
    async fn expired_sessions_read_as_absent() {
        let store = InMemorySessionStore::new();
        let live = store.create(UserId::new(), Utc::now() + Duration::minutes(5)).await.unwrap();
        let stale = store.create(UserId::new(), Utc::now() - Duration::seconds(1)).await.unwrap();

        assert!(store.get(&live.id).await.unwrap().is_some());
        assert!(store.get(&stale.id).await.unwrap().is_none());

        store.destroy(&live.id).await.unwrap();
        store.destroy(&live.id).await.unwrap();
        assert!(store.get(&live.id).await.unwrap().is_none());
    }
}
