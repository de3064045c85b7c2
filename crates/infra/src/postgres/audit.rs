use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::instrument;

use ssogate_core::{
    AuditId, CloseOutcome, LoginAudit, LoginAuditRepository, LoginMethod, NewLoginAudit, StoreResult,
    TenantId, UserId,
};
use ssogate_core::audit::session_duration;

use super::{decode_error, map_sqlx_error};

const COLUMNS: &str = "id, user_id, tenant_id, login_method, is_successful, failure_reason, session_id, \
                       ip_address, user_agent, login_at, logout_at, session_duration_secs";

#[derive(Debug, Clone)]
pub struct PgLoginAuditStore {
    pool: PgPool,
}

impl PgLoginAuditStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn audit_from_row(row: &PgRow) -> StoreResult<LoginAudit> {
    let method: String = row.try_get("login_method").map_err(|e| decode_error("login_method", e))?;
    let user_id: Option<uuid::Uuid> = row.try_get("user_id").map_err(|e| decode_error("user_id", e))?;
    let tenant_id: Option<uuid::Uuid> = row.try_get("tenant_id").map_err(|e| decode_error("tenant_id", e))?;
    Ok(LoginAudit {
        id: AuditId::from_uuid(row.try_get("id").map_err(|e| decode_error("id", e))?),
        user_id: user_id.map(UserId::from_uuid),
        tenant_id: tenant_id.map(TenantId::from_uuid),
        login_method: method.parse::<LoginMethod>().map_err(|e| decode_error("login_method", e))?,
        is_successful: row.try_get("is_successful").map_err(|e| decode_error("is_successful", e))?,
        failure_reason: row.try_get("failure_reason").map_err(|e| decode_error("failure_reason", e))?,
        session_id: row.try_get("session_id").map_err(|e| decode_error("session_id", e))?,
        ip_address: row.try_get("ip_address").map_err(|e| decode_error("ip_address", e))?,
        user_agent: row.try_get("user_agent").map_err(|e| decode_error("user_agent", e))?,
        login_at: row.try_get("login_at").map_err(|e| decode_error("login_at", e))?,
        logout_at: row.try_get("logout_at").map_err(|e| decode_error("logout_at", e))?,
        session_duration_secs: row
            .try_get("session_duration_secs")
            .map_err(|e| decode_error("session_duration_secs", e))?,
    })
}

#[async_trait]
impl LoginAuditRepository for PgLoginAuditStore {
    #[instrument(skip(self, input), fields(method = %input.login_method, success = input.is_successful))]
    async fn append(&self, input: NewLoginAudit) -> StoreResult<LoginAudit> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO login_audits
                (id, user_id, tenant_id, login_method, is_successful, failure_reason,
                 session_id, ip_address, user_agent, login_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING {COLUMNS}
            "#
        ))
        .bind(AuditId::new().as_uuid())
        .bind(input.user_id.map(uuid::Uuid::from))
        .bind(input.tenant_id.map(uuid::Uuid::from))
        .bind(input.login_method.as_str())
        .bind(input.is_successful)
        .bind(&input.failure_reason)
        .bind(&input.session_id)
        .bind(&input.ip_address)
        .bind(&input.user_agent)
        .bind(input.login_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("append_login_audit", e))?;
        audit_from_row(&row)
    }

    async fn get(&self, id: AuditId) -> StoreResult<Option<LoginAudit>> {
        sqlx::query(&format!("SELECT {COLUMNS} FROM login_audits WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_login_audit", e))?
            .as_ref()
            .map(audit_from_row)
            .transpose()
    }

    /// Single-row update guarded by `logout_at IS NULL`, so a racing second
    /// logout finds nothing to update and reports the first one's values.
    async fn close_session(&self, session_id: &str, logout_at: DateTime<Utc>) -> StoreResult<CloseOutcome> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let current = sqlx::query(&format!(
            r#"
            SELECT {COLUMNS} FROM login_audits
            WHERE session_id = $1 AND is_successful
            ORDER BY login_at DESC
            LIMIT 1
            FOR UPDATE
            "#
        ))
        .bind(session_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("find_session_audit", e))?;

        let Some(current) = current else {
            return Ok(CloseOutcome::NotFound);
        };
        let mut audit = audit_from_row(&current)?;
        if !audit.is_open() {
            return Ok(CloseOutcome::AlreadyClosed(audit));
        }

        let duration = session_duration(audit.login_at, logout_at);
        sqlx::query(
            "UPDATE login_audits SET logout_at = $2, session_duration_secs = $3 WHERE id = $1 AND logout_at IS NULL",
        )
        .bind(audit.id.as_uuid())
        .bind(logout_at)
        .bind(duration)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("close_session_audit", e))?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;

        audit.close(logout_at);
        Ok(CloseOutcome::Closed(audit))
    }

    async fn rekey_session(&self, from: &str, to: &str) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE login_audits SET session_id = $2
            WHERE id = (
                SELECT id FROM login_audits
                WHERE session_id = $1 AND is_successful AND logout_at IS NULL
                ORDER BY login_at DESC
                LIMIT 1
                FOR UPDATE
            )
            "#,
        )
        .bind(from)
        .bind(to)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("rekey_session_audit", e))?;
        Ok(result.rows_affected() > 0)
    }

    async fn purge_before(&self, cutoff: DateTime<Utc>) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM login_audits WHERE login_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("purge_login_audits", e))?;
        Ok(result.rows_affected())
    }
}
