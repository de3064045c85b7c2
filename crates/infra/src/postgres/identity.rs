use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::instrument;
use uuid::Uuid;

use ssogate_core::{
    Email, MembershipRepository, NewTenant, NewUser, StoreError, StoreResult, Tenant, TenantId,
    TenantRepository, TenantSlug, User, UserId, UserRepository,
};

use super::{decode_error, map_sqlx_error};

const TENANT_COLUMNS: &str = "t.id, t.slug, t.name, t.domain, t.is_active, t.max_users, t.created_at";

/// Credential Store, Tenant Registry and Membership join over Postgres.
#[derive(Debug, Clone)]
pub struct PgIdentityStore {
    pool: PgPool,
}

impl PgIdentityStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn user_from_row(row: &PgRow) -> StoreResult<User> {
    let email: String = row.try_get("email").map_err(|e| decode_error("email", e))?;
    Ok(User {
        id: UserId::from_uuid(row.try_get("id").map_err(|e| decode_error("id", e))?),
        name: row.try_get("name").map_err(|e| decode_error("name", e))?,
        email: Email::parse(&email).map_err(|e| decode_error("email", e))?,
        password_hash: row
            .try_get("password_hash")
            .map_err(|e| decode_error("password_hash", e))?,
        is_admin: row.try_get("is_admin").map_err(|e| decode_error("is_admin", e))?,
        created_at: row.try_get("created_at").map_err(|e| decode_error("created_at", e))?,
    })
}

fn tenant_from_row(row: &PgRow) -> StoreResult<Tenant> {
    let slug: String = row.try_get("slug").map_err(|e| decode_error("slug", e))?;
    let max_users: Option<i32> = row.try_get("max_users").map_err(|e| decode_error("max_users", e))?;
    Ok(Tenant {
        id: TenantId::from_uuid(row.try_get("id").map_err(|e| decode_error("id", e))?),
        slug: TenantSlug::parse(&slug).map_err(|e| decode_error("slug", e))?,
        name: row.try_get("name").map_err(|e| decode_error("name", e))?,
        domain: row.try_get("domain").map_err(|e| decode_error("domain", e))?,
        is_active: row.try_get("is_active").map_err(|e| decode_error("is_active", e))?,
        max_users: max_users.map(|m| m.max(0) as u32),
        created_at: row.try_get("created_at").map_err(|e| decode_error("created_at", e))?,
    })
}

#[async_trait]
impl UserRepository for PgIdentityStore {
    #[instrument(skip(self, input), fields(email = %input.email))]
    async fn create(&self, input: NewUser) -> StoreResult<User> {
        let row = sqlx::query(
            r#"
            INSERT INTO users (id, name, email, password_hash, is_admin, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, name, email, password_hash, is_admin, created_at
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(&input.name)
        .bind(input.email.as_str())
        .bind(&input.password_hash)
        .bind(input.is_admin)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("create_user", e))?;
        user_from_row(&row)
    }

    #[instrument(skip(self, input), fields(email = %input.email, tenant_id = %tenant_id))]
    async fn create_with_membership(&self, input: NewUser, tenant_id: TenantId) -> StoreResult<User> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let row = sqlx::query(
            r#"
            INSERT INTO users (id, name, email, password_hash, is_admin, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, name, email, password_hash, is_admin, created_at
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(&input.name)
        .bind(input.email.as_str())
        .bind(&input.password_hash)
        .bind(input.is_admin)
        .bind(Utc::now())
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("create_user", e))?;
        let user = user_from_row(&row)?;

        // A missing tenant fails the foreign key (23503) and rolls the user back.
        sqlx::query("INSERT INTO tenant_user (user_id, tenant_id) VALUES ($1, $2)")
            .bind(user.id.as_uuid())
            .bind(tenant_id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("attach_membership", e))?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(user)
    }

    async fn get_by_id(&self, id: UserId) -> StoreResult<Option<User>> {
        sqlx::query("SELECT id, name, email, password_hash, is_admin, created_at FROM users WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_user_by_id", e))?
            .as_ref()
            .map(user_from_row)
            .transpose()
    }

    async fn get_by_email(&self, email: &Email) -> StoreResult<Option<User>> {
        sqlx::query("SELECT id, name, email, password_hash, is_admin, created_at FROM users WHERE email = $1")
            .bind(email.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_user_by_email", e))?
            .as_ref()
            .map(user_from_row)
            .transpose()
    }
}

#[async_trait]
impl TenantRepository for PgIdentityStore {
    #[instrument(skip(self, input), fields(slug = %input.slug))]
    async fn create(&self, input: NewTenant) -> StoreResult<Tenant> {
        let max_users = input
            .max_users
            .map(i32::try_from)
            .transpose()
            .map_err(|e| StoreError::backend(format!("max_users out of range: {e}")))?;
        let row = sqlx::query(
            r#"
            INSERT INTO tenants AS t (id, slug, name, domain, is_active, max_users, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING t.id, t.slug, t.name, t.domain, t.is_active, t.max_users, t.created_at
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(input.slug.as_str())
        .bind(&input.name)
        .bind(&input.domain)
        .bind(input.is_active)
        .bind(max_users)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("create_tenant", e))?;
        tenant_from_row(&row)
    }

    async fn get_by_id(&self, id: TenantId) -> StoreResult<Option<Tenant>> {
        sqlx::query(&format!("SELECT {TENANT_COLUMNS} FROM tenants t WHERE t.id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_tenant_by_id", e))?
            .as_ref()
            .map(tenant_from_row)
            .transpose()
    }

    async fn get_by_slug(&self, slug: &TenantSlug) -> StoreResult<Option<Tenant>> {
        sqlx::query(&format!("SELECT {TENANT_COLUMNS} FROM tenants t WHERE t.slug = $1"))
            .bind(slug.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_tenant_by_slug", e))?
            .as_ref()
            .map(tenant_from_row)
            .transpose()
    }

    async fn set_active(&self, id: TenantId, is_active: bool) -> StoreResult<()> {
        let result = sqlx::query("UPDATE tenants SET is_active = $2 WHERE id = $1")
            .bind(id.as_uuid())
            .bind(is_active)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("set_tenant_active", e))?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("tenant", id.to_string()));
        }
        Ok(())
    }

    async fn delete(&self, id: TenantId) -> StoreResult<()> {
        // The RESTRICT foreign key on tenant_user rejects deleting a tenant
        // with members (23503 -> Conflict).
        let result = sqlx::query("DELETE FROM tenants WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("delete_tenant", e))?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("tenant", id.to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl MembershipRepository for PgIdentityStore {
    async fn attach(&self, user_id: UserId, tenant_id: TenantId) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO tenant_user (user_id, tenant_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(user_id.as_uuid())
        .bind(tenant_id.as_uuid())
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("attach_membership", e))?;
        Ok(())
    }

    async fn is_member(&self, user_id: UserId, tenant_id: TenantId) -> StoreResult<bool> {
        let row = sqlx::query(
            "SELECT EXISTS (SELECT 1 FROM tenant_user WHERE user_id = $1 AND tenant_id = $2) AS is_member",
        )
        .bind(user_id.as_uuid())
        .bind(tenant_id.as_uuid())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("is_member", e))?;
        row.try_get("is_member").map_err(|e| decode_error("is_member", e))
    }

    async fn tenants_for_user(&self, user_id: UserId) -> StoreResult<Vec<Tenant>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {TENANT_COLUMNS}
            FROM tenants t
            JOIN tenant_user tu ON tu.tenant_id = t.id
            WHERE tu.user_id = $1
            ORDER BY t.slug ASC
            "#
        ))
        .bind(user_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("tenants_for_user", e))?;
        rows.iter().map(tenant_from_row).collect()
    }

    async fn member_count(&self, tenant_id: TenantId) -> StoreResult<u64> {
        let row = sqlx::query("SELECT COUNT(*) AS members FROM tenant_user WHERE tenant_id = $1")
            .bind(tenant_id.as_uuid())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("member_count", e))?;
        let count: i64 = row.try_get("members").map_err(|e| decode_error("members", e))?;
        Ok(count.max(0) as u64)
    }
}
