//! SQLite-backed RBAC store.
//!
//! Listings come back in insertion order and are never `NotFound`; an empty
//! scope is just an empty list. A missing role is `NotFound`, a role with no
//! rules is `None`.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};

use super::{require_namespace, Context, RbacStore, StoreError, StoreResult};
use crate::db::row_parsers::{
    cluster_role_binding_from_row, cluster_role_from_row, role_binding_from_row, role_from_row,
};
use crate::models::{ClusterRole, ClusterRoleBinding, Fixture, Role, RoleBinding};

#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn upsert_cluster_role(&self, role: &ClusterRole) -> StoreResult<()> {
        let mut conn = self.pool.acquire().await?;
        upsert_cluster_role(&mut *conn, role).await
    }

    pub async fn upsert_role(&self, role: &Role) -> StoreResult<()> {
        let mut conn = self.pool.acquire().await?;
        upsert_role(&mut *conn, role).await
    }

    pub async fn upsert_cluster_role_binding(&self, binding: &ClusterRoleBinding) -> StoreResult<()> {
        let mut conn = self.pool.acquire().await?;
        upsert_cluster_role_binding(&mut *conn, binding).await
    }

    pub async fn upsert_role_binding(&self, binding: &RoleBinding) -> StoreResult<()> {
        let mut conn = self.pool.acquire().await?;
        upsert_role_binding(&mut *conn, binding).await
    }

    /// Writes every object of `fixture` in one transaction.
    pub async fn load(&self, fixture: &Fixture) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;

        for role in &fixture.cluster_roles {
            upsert_cluster_role(&mut *tx, role).await?;
        }
        for binding in &fixture.cluster_role_bindings {
            upsert_cluster_role_binding(&mut *tx, binding).await?;
        }
        for role in &fixture.roles {
            upsert_role(&mut *tx, role).await?;
        }
        for binding in &fixture.role_bindings {
            upsert_role_binding(&mut *tx, binding).await?;
        }

        tx.commit().await?;
        tracing::info!(
            cluster_roles = fixture.cluster_roles.len(),
            cluster_role_bindings = fixture.cluster_role_bindings.len(),
            roles = fixture.roles.len(),
            role_bindings = fixture.role_bindings.len(),
            "rbac fixture loaded"
        );
        Ok(())
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> StoreResult<String> {
    serde_json::to_string(value).map_err(|e| StoreError::decode(format!("failed to encode json: {}", e)))
}

async fn upsert_cluster_role(conn: &mut SqliteConnection, role: &ClusterRole) -> StoreResult<()> {
    let now = Utc::now();
    sqlx::query(
        "INSERT INTO cluster_roles (name, rules, created_at, updated_at) VALUES (?, ?, ?, ?)
         ON CONFLICT(name) DO UPDATE SET rules = excluded.rules, updated_at = excluded.updated_at",
    )
    .bind(&role.name)
    .bind(to_json(&role.rules)?)
    .bind(now)
    .bind(now)
    .execute(conn)
    .await?;
    Ok(())
}

async fn upsert_role(conn: &mut SqliteConnection, role: &Role) -> StoreResult<()> {
    let now = Utc::now();
    sqlx::query(
        "INSERT INTO roles (namespace, name, rules, created_at, updated_at) VALUES (?, ?, ?, ?, ?)
         ON CONFLICT(namespace, name) DO UPDATE SET rules = excluded.rules, updated_at = excluded.updated_at",
    )
    .bind(&role.namespace)
    .bind(&role.name)
    .bind(to_json(&role.rules)?)
    .bind(now)
    .bind(now)
    .execute(conn)
    .await?;
    Ok(())
}

async fn upsert_cluster_role_binding(
    conn: &mut SqliteConnection,
    binding: &ClusterRoleBinding,
) -> StoreResult<()> {
    let now = Utc::now();
    sqlx::query(
        "INSERT INTO cluster_role_bindings (name, role_kind, role_name, subjects, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?)
         ON CONFLICT(name) DO UPDATE SET role_kind = excluded.role_kind, role_name = excluded.role_name,
             subjects = excluded.subjects, updated_at = excluded.updated_at",
    )
    .bind(&binding.name)
    .bind(binding.role_ref.kind.as_str())
    .bind(&binding.role_ref.name)
    .bind(to_json(&binding.subjects)?)
    .bind(now)
    .bind(now)
    .execute(conn)
    .await?;
    Ok(())
}

async fn upsert_role_binding(conn: &mut SqliteConnection, binding: &RoleBinding) -> StoreResult<()> {
    let now = Utc::now();
    sqlx::query(
        "INSERT INTO role_bindings (namespace, name, role_kind, role_name, subjects, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(namespace, name) DO UPDATE SET role_kind = excluded.role_kind, role_name = excluded.role_name,
             subjects = excluded.subjects, updated_at = excluded.updated_at",
    )
    .bind(&binding.namespace)
    .bind(&binding.name)
    .bind(binding.role_ref.kind.as_str())
    .bind(&binding.role_ref.name)
    .bind(to_json(&binding.subjects)?)
    .bind(now)
    .bind(now)
    .execute(conn)
    .await?;
    Ok(())
}

impl SqliteStore {
    async fn fetch_cluster_role_bindings(&self) -> StoreResult<Vec<ClusterRoleBinding>> {
        let rows = sqlx::query(
            "SELECT name, role_kind, role_name, subjects FROM cluster_role_bindings ORDER BY rowid",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(cluster_role_binding_from_row).collect()
    }

    async fn fetch_cluster_role(&self, name: &str) -> StoreResult<Option<ClusterRole>> {
        let row = sqlx::query("SELECT name, rules FROM cluster_roles WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::not_found(format!("cluster role {}", name)))?;

        let role = cluster_role_from_row(&row)?;
        Ok((!role.rules.is_empty()).then_some(role))
    }

    async fn fetch_role_bindings(&self, namespace: &str) -> StoreResult<Vec<RoleBinding>> {
        let rows = sqlx::query(
            "SELECT namespace, name, role_kind, role_name, subjects FROM role_bindings
             WHERE namespace = ? ORDER BY rowid",
        )
        .bind(namespace)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(role_binding_from_row).collect()
    }

    async fn fetch_role(&self, namespace: &str, name: &str) -> StoreResult<Option<Role>> {
        let row = sqlx::query("SELECT namespace, name, rules FROM roles WHERE namespace = ? AND name = ?")
            .bind(namespace)
            .bind(name)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::not_found(format!("role {}/{}", namespace, name)))?;

        let role = role_from_row(&row)?;
        Ok((!role.rules.is_empty()).then_some(role))
    }
}

#[async_trait]
impl RbacStore for SqliteStore {
    async fn list_cluster_role_bindings(&self, ctx: &Context) -> StoreResult<Vec<ClusterRoleBinding>> {
        ctx.run(self.fetch_cluster_role_bindings()).await
    }

    async fn get_cluster_role(&self, ctx: &Context, name: &str) -> StoreResult<Option<ClusterRole>> {
        ctx.run(self.fetch_cluster_role(name)).await
    }

    async fn list_role_bindings(&self, ctx: &Context) -> StoreResult<Vec<RoleBinding>> {
        let namespace = require_namespace(ctx)?;
        ctx.run(self.fetch_role_bindings(namespace)).await
    }

    async fn get_role(&self, ctx: &Context, name: &str) -> StoreResult<Option<Role>> {
        let namespace = require_namespace(ctx)?;
        ctx.run(self.fetch_role(namespace, name)).await
    }

    fn backend_name(&self) -> &'static str {
        "sqlite"
    }
}
