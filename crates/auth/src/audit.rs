//! Login Audit Recorder.
//!
//! Writes are fire-and-forget from the point of view of authentication: a
//! failing audit store is logged and never fails the login or logout that
//! triggered it. The `try_*` variants surface errors for the trusted audit
//! API, where recording is the operation itself.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use ssogate_core::{CloseOutcome, LoginAudit, LoginAuditRepository, NewLoginAudit};

use crate::bounded::bounded;
use crate::error::AuthError;

#[derive(Clone)]
pub struct LoginAuditRecorder {
    repo: Arc<dyn LoginAuditRepository>,
    timeout: Duration,
}

impl LoginAuditRecorder {
    pub fn new(repo: Arc<dyn LoginAuditRepository>, timeout: Duration) -> Self {
        Self { repo, timeout }
    }

    /// Append one row, swallowing store failures.
    pub async fn record_login(&self, audit: NewLoginAudit) -> Option<LoginAudit> {
        match self.try_record_login(audit).await {
            Ok(row) => Some(row),
            Err(err) => {
                warn!(error = %err, "failed to record login audit");
                None
            }
        }
    }

    pub async fn try_record_login(&self, audit: NewLoginAudit) -> Result<LoginAudit, AuthError> {
        bounded(self.timeout, "audit.append", self.repo.append(audit)).await
    }

    /// Close the session's audit row, swallowing store failures.
    ///
    /// A second logout for the same session leaves the row as the first one
    /// wrote it.
    pub async fn record_logout(&self, session_id: &str, at: DateTime<Utc>) -> Option<CloseOutcome> {
        match self.try_record_logout(session_id, at).await {
            Ok(outcome) => Some(outcome),
            Err(err) => {
                warn!(session_id, error = %err, "failed to record logout audit");
                None
            }
        }
    }

    pub async fn try_record_logout(
        &self,
        session_id: &str,
        at: DateTime<Utc>,
    ) -> Result<CloseOutcome, AuthError> {
        bounded(
            self.timeout,
            "audit.close_session",
            self.repo.close_session(session_id, at),
        )
        .await
    }

    /// Carry the open audit row of a refreshed token over to its successor,
    /// swallowing store failures.
    pub async fn record_refresh(&self, old_session_id: &str, new_session_id: &str) -> bool {
        match bounded(
            self.timeout,
            "audit.rekey_session",
            self.repo.rekey_session(old_session_id, new_session_id),
        )
        .await
        {
            Ok(moved) => moved,
            Err(err) => {
                warn!(session_id = old_session_id, error = %err, "failed to rekey login audit");
                false
            }
        }
    }

    /// Retention hook: delete audits whose login is older than `days` days.
    pub async fn purge_older_than(&self, days: u32, now: DateTime<Utc>) -> Result<u64, AuthError> {
        let cutoff = now - chrono::Duration::days(i64::from(days));
        let removed = bounded(self.timeout, "audit.purge_before", self.repo.purge_before(cutoff)).await?;
        info!(days, removed, "purged login audits");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use ssogate_core::{AuditId, LoginMethod, StoreError, StoreResult, UserId};

    use super::*;

    struct BrokenStore;

    #[async_trait]
    impl LoginAuditRepository for BrokenStore {
        async fn append(&self, _input: NewLoginAudit) -> StoreResult<LoginAudit> {
            Err(StoreError::backend("audit store offline"))
        }

        async fn get(&self, _id: AuditId) -> StoreResult<Option<LoginAudit>> {
            Err(StoreError::backend("audit store offline"))
        }

        async fn close_session(&self, _session_id: &str, _at: DateTime<Utc>) -> StoreResult<CloseOutcome> {
            Err(StoreError::backend("audit store offline"))
        }

        async fn rekey_session(&self, _from: &str, _to: &str) -> StoreResult<bool> {
            Err(StoreError::backend("audit store offline"))
        }

        async fn purge_before(&self, _cutoff: DateTime<Utc>) -> StoreResult<u64> {
            Err(StoreError::backend("audit store offline"))
        }
    }

    struct SlowStore;

    #[async_trait]
    impl LoginAuditRepository for SlowStore {
        async fn append(&self, _input: NewLoginAudit) -> StoreResult<LoginAudit> {
            tokio::time::sleep(std::time::Duration::from_secs(5)).await;
            Err(StoreError::backend("unreachable"))
        }

        async fn get(&self, _id: AuditId) -> StoreResult<Option<LoginAudit>> {
            Ok(None)
        }

        async fn close_session(&self, _session_id: &str, _at: DateTime<Utc>) -> StoreResult<CloseOutcome> {
            Ok(CloseOutcome::NotFound)
        }

        async fn rekey_session(&self, _from: &str, _to: &str) -> StoreResult<bool> {
            Ok(false)
        }

        async fn purge_before(&self, _cutoff: DateTime<Utc>) -> StoreResult<u64> {
            Ok(0)
        }
    }

    fn row() -> NewLoginAudit {
        NewLoginAudit::success(UserId::new(), None, LoginMethod::Api, Some("jti".into()))
    }

    #[tokio::test]
    async fn failures_are_swallowed() {
        let recorder = LoginAuditRecorder::new(Arc::new(BrokenStore), Duration::from_millis(100));
        assert!(recorder.record_login(row()).await.is_none());
        assert!(recorder.record_logout("jti", Utc::now()).await.is_none());
        assert!(!recorder.record_refresh("jti", "jti-2").await);
    }

    #[tokio::test]
    async fn try_variants_surface_failures() {
        let recorder = LoginAuditRecorder::new(Arc::new(BrokenStore), Duration::from_millis(100));
        let err = recorder.try_record_login(row()).await.unwrap_err();
        assert!(matches!(err, AuthError::Infrastructure(_)));
        assert!(recorder.purge_older_than(30, Utc::now()).await.is_err());
    }

    #[tokio::test]
    async fn slow_store_times_out() {
        let recorder = LoginAuditRecorder::new(Arc::new(SlowStore), Duration::from_millis(50));
        let err = recorder.try_record_login(row()).await.unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }
}
