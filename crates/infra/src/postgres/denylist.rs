use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};

use ssogate_core::{DenylistEntry, DenylistRepository, StoreResult};

use super::{decode_error, map_sqlx_error};

/// Denylist table keyed by `jti`. Rows past `expires_at` are ignored on read
/// and removed by `purge_expired`.
#[derive(Debug, Clone)]
pub struct PgDenylist {
    pool: PgPool,
}

impl PgDenylist {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DenylistRepository for PgDenylist {
    async fn add(&self, entry: DenylistEntry) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO token_denylist (jti, invalidated_at, expires_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (jti) DO UPDATE
                SET invalidated_at = LEAST(token_denylist.invalidated_at, EXCLUDED.invalidated_at)
            "#,
        )
        .bind(&entry.jti)
        .bind(entry.invalidated_at)
        .bind(entry.expires_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("denylist_add", e))?;
        Ok(())
    }

    async fn get(&self, jti: &str) -> StoreResult<Option<DenylistEntry>> {
        let row = sqlx::query(
            "SELECT jti, invalidated_at, expires_at FROM token_denylist WHERE jti = $1 AND expires_at > NOW()",
        )
        .bind(jti)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("denylist_get", e))?;

        row.map(|row| {
            Ok(DenylistEntry {
                jti: row.try_get("jti").map_err(|e| decode_error("jti", e))?,
                invalidated_at: row
                    .try_get("invalidated_at")
                    .map_err(|e| decode_error("invalidated_at", e))?,
                expires_at: row.try_get("expires_at").map_err(|e| decode_error("expires_at", e))?,
            })
        })
        .transpose()
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM token_denylist WHERE expires_at <= $1")
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("denylist_purge", e))?;
        Ok(result.rows_affected())
    }
}
