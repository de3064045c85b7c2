//! `ssogate-core`: identity and tenancy foundation.
//!
//! This crate contains the data model shared by the token layer, the stores
//! and the HTTP surface. It performs no IO itself: persistence is expressed as
//! async repository traits implemented in `ssogate-infra`.

pub mod audit;
pub mod error;
pub mod id;
pub mod repository;
pub mod session;
pub mod tenant;
pub mod user;
pub mod value_object;

pub use audit::{CloseOutcome, LoginAudit, LoginMethod, NewLoginAudit};
pub use error::{DomainError, DomainResult, StoreError, StoreResult};
pub use id::{AuditId, TenantId, UserId};
pub use repository::{
    DenylistEntry, DenylistRepository, LoginAuditRepository, MembershipRepository,
    SessionRepository, TenantRepository, UserRepository,
};
pub use session::{BrowserSession, SessionId};
pub use tenant::{NewTenant, Tenant};
pub use user::{NewUser, User};
pub use value_object::{Email, TenantSlug};
