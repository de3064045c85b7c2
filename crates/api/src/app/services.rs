//! Store selection and auth service wiring.
//!
//! `SSOGATE_DATABASE_URL` switches the identity, audit and session stores to
//! Postgres; `SSOGATE_REDIS_URL` (feature `redis`) moves the denylist to
//! Redis. Everything else runs in memory.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{info, warn};

use ssogate_auth::{AuthConfig, AuthStores};
use ssogate_core::{DenylistRepository, StoreError};
use ssogate_infra::{AppConfig, InMemoryStores, PgDenylist, PgIdentityStore, PgLoginAuditStore, PgSessionStore};

/// How often expired denylist entries are evicted.
const DENYLIST_PURGE_INTERVAL: Duration = Duration::from_secs(60);

pub fn auth_config(config: &AppConfig) -> AuthConfig {
    AuthConfig {
        jwt_secret: config.jwt_secret.clone(),
        access_ttl_minutes: config.access_ttl_minutes,
        refresh_ttl_minutes: config.refresh_ttl_minutes,
        blacklist_grace_minutes: config.blacklist_grace_minutes,
        leeway_secs: config.leeway_secs,
        required_claims: config.required_claims.clone(),
        store_timeout: config.store_timeout,
        session_ttl_minutes: config.session_ttl_minutes,
        ..AuthConfig::default()
    }
}

/// Stores backed by a fresh set of in-memory stores.
pub fn in_memory_auth_stores(stores: &InMemoryStores) -> AuthStores {
    AuthStores {
        users: stores.identity.clone(),
        tenants: stores.identity.clone(),
        memberships: stores.identity.clone(),
        denylist: stores.denylist.clone(),
        audits: stores.audits.clone(),
        sessions: stores.sessions.clone(),
    }
}

pub async fn build_stores(config: &AppConfig) -> Result<AuthStores, StoreError> {
    let mut stores = match &config.database_url {
        Some(database_url) => {
            let pool = ssogate_infra::postgres::connect(database_url).await?;
            info!("using Postgres stores");
            let identity = Arc::new(PgIdentityStore::new(pool.clone()));
            AuthStores {
                users: identity.clone(),
                tenants: identity.clone(),
                memberships: identity,
                denylist: Arc::new(PgDenylist::new(pool.clone())),
                audits: Arc::new(PgLoginAuditStore::new(pool.clone())),
                sessions: Arc::new(PgSessionStore::new(pool)),
            }
        }
        None => {
            warn!("SSOGATE_DATABASE_URL not set; using in-memory stores");
            in_memory_auth_stores(&InMemoryStores::new())
        }
    };

    if let Some(redis_url) = &config.redis_url {
        stores.denylist = redis_denylist(redis_url)?;
    }

    spawn_denylist_janitor(stores.denylist.clone(), DENYLIST_PURGE_INTERVAL);
    Ok(stores)
}

#[cfg(feature = "redis")]
fn redis_denylist(redis_url: &str) -> Result<Arc<dyn DenylistRepository>, StoreError> {
    info!("using Redis denylist");
    Ok(Arc::new(ssogate_infra::RedisDenylist::new(redis_url)?))
}

#[cfg(not(feature = "redis"))]
fn redis_denylist(_redis_url: &str) -> Result<Arc<dyn DenylistRepository>, StoreError> {
    Err(StoreError::backend(
        "SSOGATE_REDIS_URL is set but this build lacks the `redis` feature",
    ))
}

/// Periodically evict denylist entries whose token has expired.
fn spawn_denylist_janitor(denylist: Arc<dyn DenylistRepository>, every: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            match denylist.purge_expired(Utc::now()).await {
                Ok(0) => {}
                Ok(removed) => info!(removed, "purged expired denylist entries"),
                Err(e) => warn!(error = %e, "denylist purge failed"),
            }
        }
    });
}
