use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};

use ssogate_core::{BrowserSession, SessionId, SessionRepository, StoreResult, UserId};

use super::{decode_error, map_sqlx_error};

#[derive(Debug, Clone)]
pub struct PgSessionStore {
    pool: PgPool,
}

impl PgSessionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionRepository for PgSessionStore {
    async fn create(&self, user_id: UserId, expires_at: DateTime<Utc>) -> StoreResult<BrowserSession> {
        let session = BrowserSession {
            id: SessionId::generate(),
            user_id,
            created_at: Utc::now(),
            expires_at,
        };
        sqlx::query("INSERT INTO browser_sessions (id, user_id, created_at, expires_at) VALUES ($1, $2, $3, $4)")
            .bind(session.id.as_str())
            .bind(user_id.as_uuid())
            .bind(session.created_at)
            .bind(session.expires_at)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("create_session", e))?;
        Ok(session)
    }

    async fn get(&self, id: &SessionId) -> StoreResult<Option<BrowserSession>> {
        let row = sqlx::query(
            "SELECT id, user_id, created_at, expires_at FROM browser_sessions WHERE id = $1 AND expires_at > NOW()",
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_session", e))?;

        row.map(|row| {
            let id: String = row.try_get("id").map_err(|e| decode_error("id", e))?;
            Ok(BrowserSession {
                id: SessionId::from_string(id),
                user_id: UserId::from_uuid(row.try_get("user_id").map_err(|e| decode_error("user_id", e))?),
                created_at: row.try_get("created_at").map_err(|e| decode_error("created_at", e))?,
                expires_at: row.try_get("expires_at").map_err(|e| decode_error("expires_at", e))?,
            })
        })
        .transpose()
    }

    async fn destroy(&self, id: &SessionId) -> StoreResult<()> {
        sqlx::query("DELETE FROM browser_sessions WHERE id = $1")
            .bind(id.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("destroy_session", e))?;
        Ok(())
    }
}
