//! Repository traits for the persistent stores the auth core depends on.
//!
//! Every call is a single request-scoped IO step; callers bound them with a
//! timeout. Implementations live in `ssogate-infra` (in-memory for dev/test,
//! Postgres and Redis for production).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    AuditId, BrowserSession, CloseOutcome, Email, LoginAudit, NewLoginAudit, NewTenant, NewUser,
    SessionId, StoreResult, Tenant, TenantId, TenantSlug, User, UserId,
};

/// Credential Store.
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Insert a user. Fails with `Conflict` if the email is already taken.
    async fn create(&self, input: NewUser) -> StoreResult<User>;

    /// Insert a user and attach it to `tenant_id` in one atomic write.
    ///
    /// Nothing is persisted when either step fails.
    async fn create_with_membership(&self, input: NewUser, tenant_id: TenantId) -> StoreResult<User>;

    async fn get_by_id(&self, id: UserId) -> StoreResult<Option<User>>;

    async fn get_by_email(&self, email: &Email) -> StoreResult<Option<User>>;
}

/// Tenant Registry.
#[async_trait]
pub trait TenantRepository: Send + Sync {
    /// Insert a tenant. Fails with `Conflict` if the slug is already taken.
    async fn create(&self, input: NewTenant) -> StoreResult<Tenant>;

    async fn get_by_id(&self, id: TenantId) -> StoreResult<Option<Tenant>>;

    async fn get_by_slug(&self, slug: &TenantSlug) -> StoreResult<Option<Tenant>>;

    async fn set_active(&self, id: TenantId, is_active: bool) -> StoreResult<()>;

    /// Delete a tenant. Fails with `Conflict` while it still has members.
    async fn delete(&self, id: TenantId) -> StoreResult<()>;
}

/// User × Tenant join table.
///
/// There is no lazy loading: callers always ask explicitly for the tenants of
/// a given user.
#[async_trait]
pub trait MembershipRepository: Send + Sync {
    /// Attach a user to a tenant. Attaching twice is a no-op.
    async fn attach(&self, user_id: UserId, tenant_id: TenantId) -> StoreResult<()>;

    async fn is_member(&self, user_id: UserId, tenant_id: TenantId) -> StoreResult<bool>;

    /// Tenants the user belongs to, ordered by slug.
    async fn tenants_for_user(&self, user_id: UserId) -> StoreResult<Vec<Tenant>>;

    async fn member_count(&self, tenant_id: TenantId) -> StoreResult<u64>;
}

/// A token invalidated by logout or refresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DenylistEntry {
    /// Token id (`jti` claim).
    pub jti: String,
    pub invalidated_at: DateTime<Utc>,
    /// The token's own expiry. The entry is useless afterwards and may be evicted.
    pub expires_at: DateTime<Utc>,
}

/// Keyed store of invalidated token ids with expiry-based eviction.
#[async_trait]
pub trait DenylistRepository: Send + Sync {
    /// Add an entry. If the token is already present the earliest
    /// `invalidated_at` is kept.
    async fn add(&self, entry: DenylistEntry) -> StoreResult<()>;

    /// Entries whose `expires_at` has passed may be reported as absent.
    async fn get(&self, jti: &str) -> StoreResult<Option<DenylistEntry>>;

    /// Remove entries whose token has expired; returns how many were removed.
    async fn purge_expired(&self, now: DateTime<Utc>) -> StoreResult<u64>;
}

/// Append-only login audit store.
#[async_trait]
pub trait LoginAuditRepository: Send + Sync {
    async fn append(&self, input: NewLoginAudit) -> StoreResult<LoginAudit>;

    async fn get(&self, id: AuditId) -> StoreResult<Option<LoginAudit>>;

    /// Close the most recent successful login recorded for `session_id`.
    ///
    /// Idempotent: an already closed row is reported as `AlreadyClosed` and
    /// left untouched.
    async fn close_session(
        &self,
        session_id: &str,
        logout_at: DateTime<Utc>,
    ) -> StoreResult<CloseOutcome>;

    /// Move the most recent open successful login of `from` to session `to`.
    ///
    /// Returns `false` when no open row matches.
    async fn rekey_session(&self, from: &str, to: &str) -> StoreResult<bool>;

    /// Delete rows whose `login_at` is before `cutoff`; returns how many were removed.
    async fn purge_before(&self, cutoff: DateTime<Utc>) -> StoreResult<u64>;
}

/// First-party browser sessions of the central server.
#[async_trait]
pub trait SessionRepository: Send + Sync {
    async fn create(&self, user_id: UserId, expires_at: DateTime<Utc>) -> StoreResult<BrowserSession>;

    /// Expired sessions are reported as absent.
    async fn get(&self, id: &SessionId) -> StoreResult<Option<BrowserSession>>;

    /// Destroying an unknown session is a no-op.
    async fn destroy(&self, id: &SessionId) -> StoreResult<()>;
}
