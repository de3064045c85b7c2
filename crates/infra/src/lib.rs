//! Infrastructure layer: store implementations and configuration.
//!
//! - `memory`: in-memory stores for tests and local development
//! - `postgres`: persistent stores over sqlx
//! - `redis_denylist`: Redis denylist (feature `redis`)
//! - `config`: environment configuration

pub mod config;
pub mod memory;
pub mod postgres;

#[cfg(feature = "redis")]
pub mod redis_denylist;

pub use config::{AppConfig, ConfigError};
pub use memory::{
    InMemoryDenylist, InMemoryIdentityStore, InMemoryLoginAuditStore, InMemorySessionStore, InMemoryStores,
};
pub use postgres::{PgDenylist, PgIdentityStore, PgLoginAuditStore, PgSessionStore};

#[cfg(feature = "redis")]
pub use redis_denylist::RedisDenylist;
