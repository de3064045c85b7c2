//! In-memory stores.
//!
//! Intended for tests and local development. State lives behind `RwLock`s
//! and is lost on restart.

use std::sync::Arc;

use ssogate_core::StoreError;

mod audit;
mod denylist;
mod identity;
mod session;

pub use audit::InMemoryLoginAuditStore;
pub use denylist::InMemoryDenylist;
pub use identity::InMemoryIdentityStore;
pub use session::InMemorySessionStore;

/// One instance of every in-memory store.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStores {
    pub identity: Arc<InMemoryIdentityStore>,
    pub denylist: Arc<InMemoryDenylist>,
    pub audits: Arc<InMemoryLoginAuditStore>,
    pub sessions: Arc<InMemorySessionStore>,
}

impl InMemoryStores {
    pub fn new() -> Self {
        Self::default()
    }
}

pub(crate) fn poisoned() -> StoreError {
    StoreError::backend("lock poisoned")
}
