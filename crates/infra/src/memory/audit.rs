use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use ssogate_core::{AuditId, CloseOutcome, LoginAudit, LoginAuditRepository, NewLoginAudit, StoreResult};

use super::poisoned;

/// Append-only login audit log.
#[derive(Debug, Default)]
pub struct InMemoryLoginAuditStore {
    rows: RwLock<Vec<LoginAudit>>,
}

impl InMemoryLoginAuditStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every row, oldest first.
    pub fn all(&self) -> Vec<LoginAudit> {
        self.rows.read().map(|rows| rows.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl LoginAuditRepository for InMemoryLoginAuditStore {
    async fn append(&self, input: NewLoginAudit) -> StoreResult<LoginAudit> {
        let row = LoginAudit::from_new(AuditId::new(), input);
        self.rows.write().map_err(|_| poisoned())?.push(row.clone());
        Ok(row)
    }

    async fn get(&self, id: AuditId) -> StoreResult<Option<LoginAudit>> {
        let rows = self.rows.read().map_err(|_| poisoned())?;
        Ok(rows.iter().find(|r| r.id == id).cloned())
    }

    async fn close_session(&self, session_id: &str, logout_at: DateTime<Utc>) -> StoreResult<CloseOutcome> {
        let mut rows = self.rows.write().map_err(|_| poisoned())?;
        let Some(row) = rows
            .iter_mut()
            .rev()
            .find(|r| r.is_successful && r.session_id.as_deref() == Some(session_id))
        else {
            return Ok(CloseOutcome::NotFound);
        };

        if row.close(logout_at) {
            Ok(CloseOutcome::Closed(row.clone()))
        } else {
            Ok(CloseOutcome::AlreadyClosed(row.clone()))
        }
    }

    async fn rekey_session(&self, from: &str, to: &str) -> StoreResult<bool> {
        let mut rows = self.rows.write().map_err(|_| poisoned())?;
        let Some(row) = rows
            .iter_mut()
            .rev()
            .find(|r| r.is_successful && r.is_open() && r.session_id.as_deref() == Some(from))
        else {
            return Ok(false);
        };
        row.session_id = Some(to.to_owned());
        Ok(true)
    }

    async fn purge_before(&self, cutoff: DateTime<Utc>) -> StoreResult<u64> {
        let mut rows = self.rows.write().map_err(|_| poisoned())?;
        let before = rows.len();
        rows.retain(|r| r.login_at >= cutoff);
        Ok((before - rows.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use ssogate_core::{LoginMethod, UserId};

    use super::*;

    #[tokio::test]
    async fn second_close_is_a_no_op() {
        let store = InMemoryLoginAuditStore::new();
        let login = NewLoginAudit::success(UserId::new(), None, LoginMethod::Sso, Some("sess-1".into()));
        let login_at = login.login_at;
        store.append(login).await.unwrap();

        let first = store.close_session("sess-1", login_at + Duration::seconds(90)).await.unwrap();
        let CloseOutcome::Closed(closed) = first else {
            panic!("expected Closed, got {first:?}");
        };
        assert_eq!(closed.session_duration_secs, Some(90));

        let second = store.close_session("sess-1", login_at + Duration::seconds(500)).await.unwrap();
        let CloseOutcome::AlreadyClosed(row) = second else {
            panic!("expected AlreadyClosed, got {second:?}");
        };
        assert_eq!(row.logout_at, closed.logout_at);
        assert_eq!(row.session_duration_secs, Some(90));

        assert_eq!(store.close_session("unknown", Utc::now()).await.unwrap(), CloseOutcome::NotFound);
    }

    #[tokio::test]
    async fn failed_attempts_are_never_closed() {
        let store = InMemoryLoginAuditStore::new();
        let mut failed = NewLoginAudit::failure(None, None, LoginMethod::Api, "Invalid credentials");
        failed.session_id = Some("sess-2".into());
        store.append(failed).await.unwrap();
        assert_eq!(store.close_session("sess-2", Utc::now()).await.unwrap(), CloseOutcome::NotFound);
    }

    #[tokio::test]
    async fn purge_removes_only_older_rows() {
        let store = InMemoryLoginAuditStore::new();
        let now = Utc::now();
        for days in [40, 10, 1] {
            let mut row = NewLoginAudit::success(UserId::new(), None, LoginMethod::Direct, None);
            row.login_at = now - Duration::days(days);
            store.append(row).await.unwrap();
        }
        assert_eq!(store.purge_before(now - Duration::days(30)).await.unwrap(), 1);
        assert_eq!(store.all().len(), 2);
    }

    #[tokio::test]
    async fn rekeyed_row_closes_under_its_new_session() {
        let store = InMemoryLoginAuditStore::new();
        let login = NewLoginAudit::success(UserId::new(), None, LoginMethod::Api, Some("jti-old".into()));
        let login_at = login.login_at;
        store.append(login).await.unwrap();

        assert!(store.rekey_session("jti-old", "jti-new").await.unwrap());
        assert!(!store.rekey_session("jti-old", "jti-other").await.unwrap());
        assert_eq!(store.close_session("jti-old", Utc::now()).await.unwrap(), CloseOutcome::NotFound);

        let closed = store.close_session("jti-new", login_at + Duration::seconds(30)).await.unwrap();
        assert!(matches!(closed, CloseOutcome::Closed(ref row) if row.session_duration_secs == Some(30)));
        assert!(!store.rekey_session("jti-new", "jti-later").await.unwrap());
    }
}
