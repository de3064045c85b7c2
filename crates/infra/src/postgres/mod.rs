//! Postgres-backed stores.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError |
//! |------------|-----------------------|------------|
//! | Database (unique violation) | `23505` | `Conflict` |
//! | Database (foreign key violation) | `23503` | `Conflict` |
//! | Database (other) | Any other | `Backend` |
//! | PoolClosed / PoolTimedOut | N/A | `Backend` |
//! | Other | N/A | `Backend` |
//!
//! All stores share one `PgPool`, which is `Send + Sync` and cheap to clone.

use sqlx::PgPool;
use tracing::info;

use ssogate_core::StoreError;

mod audit;
mod denylist;
mod identity;
mod session;

pub use audit::PgLoginAuditStore;
pub use denylist::PgDenylist;
pub use identity::PgIdentityStore;
pub use session::PgSessionStore;

const SCHEMA: &str = include_str!("../../migrations/0001_identity.sql");

/// Connect and make sure the schema exists.
pub async fn connect(database_url: &str) -> Result<PgPool, StoreError> {
    let pool = PgPool::connect(database_url)
        .await
        .map_err(|e| map_sqlx_error("connect", e))?;
    run_migrations(&pool).await?;
    Ok(pool)
}

/// Apply the bundled schema. Every statement is idempotent.
pub async fn run_migrations(pool: &PgPool) -> Result<(), StoreError> {
    sqlx::raw_sql(SCHEMA)
        .execute(pool)
        .await
        .map_err(|e| map_sqlx_error("run_migrations", e))?;
    info!("database schema is up to date");
    Ok(())
}

/// Map SQLx errors to `StoreError`.
pub(crate) fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("23505") | Some("23503") => StoreError::Conflict(msg),
                _ => StoreError::Backend(msg),
            }
        }
        sqlx::Error::PoolClosed => StoreError::backend(format!("connection pool closed in {operation}")),
        sqlx::Error::PoolTimedOut => StoreError::backend(format!("connection pool timed out in {operation}")),
        _ => StoreError::backend(format!("sqlx error in {operation}: {err}")),
    }
}

/// A column that failed to decode into a domain value.
pub(crate) fn decode_error(column: &str, err: impl std::fmt::Display) -> StoreError {
    StoreError::backend(format!("failed to decode column '{column}': {err}"))
}
