use std::collections::{BTreeSet, HashMap};
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::Utc;

use ssogate_core::{
    Email, MembershipRepository, NewTenant, NewUser, StoreError, StoreResult, Tenant, TenantId,
    TenantRepository, TenantSlug, User, UserId, UserRepository,
};

use super::poisoned;

#[derive(Debug, Default)]
struct IdentityState {
    users: HashMap<UserId, User>,
    tenants: HashMap<TenantId, Tenant>,
    memberships: BTreeSet<(UserId, TenantId)>,
}

impl IdentityState {
    fn new_user(&self, input: NewUser) -> StoreResult<User> {
        if self.users.values().any(|u| u.email == input.email) {
            return Err(StoreError::conflict(format!("email '{}' already taken", input.email)));
        }
        Ok(User {
            id: UserId::new(),
            name: input.name,
            email: input.email,
            password_hash: input.password_hash,
            is_admin: input.is_admin,
            created_at: Utc::now(),
        })
    }
}

/// Credential Store, Tenant Registry and Membership join in one lock, so
/// uniqueness checks and member counts see a consistent view.
#[derive(Debug, Default)]
pub struct InMemoryIdentityStore {
    state: RwLock<IdentityState>,
}

impl InMemoryIdentityStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserRepository for InMemoryIdentityStore {
    async fn create(&self, input: NewUser) -> StoreResult<User> {
        let mut state = self.state.write().map_err(|_| poisoned())?;
        let user = state.new_user(input)?;
        state.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn create_with_membership(&self, input: NewUser, tenant_id: TenantId) -> StoreResult<User> {
        let mut state = self.state.write().map_err(|_| poisoned())?;
        if !state.tenants.contains_key(&tenant_id) {
            return Err(StoreError::not_found("tenant", tenant_id.to_string()));
        }
        let user = state.new_user(input)?;
        state.users.insert(user.id, user.clone());
        state.memberships.insert((user.id, tenant_id));
        Ok(user)
    }

    async fn get_by_id(&self, id: UserId) -> StoreResult<Option<User>> {
        let state = self.state.read().map_err(|_| poisoned())?;
        Ok(state.users.get(&id).cloned())
    }

    async fn get_by_email(&self, email: &Email) -> StoreResult<Option<User>> {
        let state = self.state.read().map_err(|_| poisoned())?;
        Ok(state.users.values().find(|u| &u.email == email).cloned())
    }
}

#[async_trait]
impl TenantRepository for InMemoryIdentityStore {
    async fn create(&self, input: NewTenant) -> StoreResult<Tenant> {
        let mut state = self.state.write().map_err(|_| poisoned())?;
        if state.tenants.values().any(|t| t.slug == input.slug) {
            return Err(StoreError::conflict(format!("tenant slug '{}' already taken", input.slug)));
        }
        let tenant = Tenant {
            id: TenantId::new(),
            slug: input.slug,
            name: input.name,
            domain: input.domain,
            is_active: input.is_active,
            max_users: input.max_users,
            created_at: Utc::now(),
        };
        state.tenants.insert(tenant.id, tenant.clone());
        Ok(tenant)
    }

    async fn get_by_id(&self, id: TenantId) -> StoreResult<Option<Tenant>> {
        let state = self.state.read().map_err(|_| poisoned())?;
        Ok(state.tenants.get(&id).cloned())
    }

    async fn get_by_slug(&self, slug: &TenantSlug) -> StoreResult<Option<Tenant>> {
        let state = self.state.read().map_err(|_| poisoned())?;
        Ok(state.tenants.values().find(|t| &t.slug == slug).cloned())
    }

    async fn set_active(&self, id: TenantId, is_active: bool) -> StoreResult<()> {
        let mut state = self.state.write().map_err(|_| poisoned())?;
        let tenant = state
            .tenants
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("tenant", id.to_string()))?;
        tenant.is_active = is_active;
        Ok(())
    }

    async fn delete(&self, id: TenantId) -> StoreResult<()> {
        let mut state = self.state.write().map_err(|_| poisoned())?;
        if !state.tenants.contains_key(&id) {
            return Err(StoreError::not_found("tenant", id.to_string()));
        }
        if state.memberships.iter().any(|(_, t)| *t == id) {
            return Err(StoreError::conflict("tenant still has members"));
        }
        state.tenants.remove(&id);
        Ok(())
    }
}

#[async_trait]
impl MembershipRepository for InMemoryIdentityStore {
    async fn attach(&self, user_id: UserId, tenant_id: TenantId) -> StoreResult<()> {
        let mut state = self.state.write().map_err(|_| poisoned())?;
        if !state.users.contains_key(&user_id) {
            return Err(StoreError::not_found("user", user_id.to_string()));
        }
        if !state.tenants.contains_key(&tenant_id) {
            return Err(StoreError::not_found("tenant", tenant_id.to_string()));
        }
        state.memberships.insert((user_id, tenant_id));
        Ok(())
    }

    async fn is_member(&self, user_id: UserId, tenant_id: TenantId) -> StoreResult<bool> {
        let state = self.state.read().map_err(|_| poisoned())?;
        Ok(state.memberships.contains(&(user_id, tenant_id)))
    }

    async fn tenants_for_user(&self, user_id: UserId) -> StoreResult<Vec<Tenant>> {
        let state = self.state.read().map_err(|_| poisoned())?;
        let mut tenants: Vec<Tenant> = state
            .memberships
            .iter()
            .filter(|(u, _)| *u == user_id)
            .filter_map(|(_, t)| state.tenants.get(t).cloned())
            .collect();
        tenants.sort_by(|a, b| a.slug.cmp(&b.slug));
        Ok(tenants)
    }

    async fn member_count(&self, tenant_id: TenantId) -> StoreResult<u64> {
        let state = self.state.read().map_err(|_| poisoned())?;
        Ok(state.memberships.iter().filter(|(_, t)| *t == tenant_id).count() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_user(email: &str) -> NewUser {
        NewUser {
            name: "Test".into(),
            email: Email::parse(email).unwrap(),
            password_hash: "x".into(),
            is_admin: false,
        }
    }

    fn slug(s: &str) -> TenantSlug {
        TenantSlug::parse(s).unwrap()
    }

    #[tokio::test]
    async fn email_is_globally_unique() {
        let store = InMemoryIdentityStore::new();
        UserRepository::create(&store, new_user("a@x.com")).await.unwrap();
        let err = UserRepository::create(&store, new_user("A@X.com")).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn memberships_are_sorted_by_slug() {
        let store = InMemoryIdentityStore::new();
        let user = UserRepository::create(&store, new_user("a@x.com")).await.unwrap();
        for s in ["t3", "t1", "t2"] {
            let tenant = TenantRepository::create(&store, NewTenant::active(slug(s), s)).await.unwrap();
            store.attach(user.id, tenant.id).await.unwrap();
            store.attach(user.id, tenant.id).await.unwrap();
        }
        let slugs: Vec<String> = store
            .tenants_for_user(user.id)
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.slug.to_string())
            .collect();
        assert_eq!(slugs, ["t1", "t2", "t3"]);
    }

    #[tokio::test]
    async fn tenant_with_members_cannot_be_deleted() {
        let store = InMemoryIdentityStore::new();
        let user = UserRepository::create(&store, new_user("a@x.com")).await.unwrap();
        let tenant = TenantRepository::create(&store, NewTenant::active(slug("t1"), "T1")).await.unwrap();
        store.attach(user.id, tenant.id).await.unwrap();

        assert_eq!(store.member_count(tenant.id).await.unwrap(), 1);
        assert!(matches!(store.delete(tenant.id).await, Err(StoreError::Conflict(_))));

        let empty = TenantRepository::create(&store, NewTenant::active(slug("t2"), "T2")).await.unwrap();
        store.delete(empty.id).await.unwrap();
        assert!(TenantRepository::get_by_id(&store, empty.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn atomic_create_persists_nothing_on_failure() {
        let store = InMemoryIdentityStore::new();
        let email = Email::parse("new@x.com").unwrap();

        let err = store
            .create_with_membership(new_user("new@x.com"), TenantId::new())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
        assert!(store.get_by_email(&email).await.unwrap().is_none());

        let tenant = TenantRepository::create(&store, NewTenant::active(slug("t1"), "T1")).await.unwrap();
        let user = store.create_with_membership(new_user("new@x.com"), tenant.id).await.unwrap();
        assert!(store.is_member(user.id, tenant.id).await.unwrap());

        let taken = store.create_with_membership(new_user("new@x.com"), tenant.id).await.unwrap_err();
        assert!(matches!(taken, StoreError::Conflict(_)));
        assert_eq!(store.member_count(tenant.id).await.unwrap(), 1);
    }
}
