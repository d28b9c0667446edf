//! In-memory RBAC store.
//!
//! Behaves like a key-value backend: listing a scope with no bindings and
//! fetching a role that was never written both report `NotFound`. A role
//! stored with no rules is returned as `None`.
//!
//! Not durable; meant for tests and for embedding a fixed policy.

use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{require_namespace, Context, RbacStore, StoreError, StoreResult};
use crate::models::{ClusterRole, ClusterRoleBinding, Fixture, Role, RoleBinding};

#[derive(Debug, Default)]
struct State {
    cluster_roles: BTreeMap<String, ClusterRole>,
    // insertion order is the listing order
    cluster_role_bindings: Vec<ClusterRoleBinding>,
    roles: BTreeMap<(String, String), Role>,
    role_bindings: Vec<RoleBinding>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn from_fixture(fixture: Fixture) -> Self {
        let store = Self::new();
        store.load(fixture).await;
        store
    }

    pub async fn load(&self, fixture: Fixture) {
        for role in fixture.cluster_roles {
            self.put_cluster_role(role).await;
        }
        for binding in fixture.cluster_role_bindings {
            self.put_cluster_role_binding(binding).await;
        }
        for role in fixture.roles {
            self.put_role(role).await;
        }
        for binding in fixture.role_bindings {
            self.put_role_binding(binding).await;
        }
    }

    pub async fn put_cluster_role(&self, role: ClusterRole) {
        let mut state = self.state.write().await;
        state.cluster_roles.insert(role.name.clone(), role);
    }

    pub async fn put_role(&self, role: Role) {
        let mut state = self.state.write().await;
        state
            .roles
            .insert((role.namespace.clone(), role.name.clone()), role);
    }

    /// Replaces a binding with the same name, otherwise appends.
    pub async fn put_cluster_role_binding(&self, binding: ClusterRoleBinding) {
        let mut state = self.state.write().await;
        match state
            .cluster_role_bindings
            .iter_mut()
            .find(|b| b.name == binding.name)
        {
            Some(existing) => *existing = binding,
            None => state.cluster_role_bindings.push(binding),
        }
    }

    pub async fn put_role_binding(&self, binding: RoleBinding) {
        let mut state = self.state.write().await;
        match state
            .role_bindings
            .iter_mut()
            .find(|b| b.namespace == binding.namespace && b.name == binding.name)
        {
            Some(existing) => *existing = binding,
            None => state.role_bindings.push(binding),
        }
    }
}

#[async_trait]
impl RbacStore for MemoryStore {
    async fn list_cluster_role_bindings(&self, ctx: &Context) -> StoreResult<Vec<ClusterRoleBinding>> {
        ctx.check()?;
        let state = self.state.read().await;
        if state.cluster_role_bindings.is_empty() {
            return Err(StoreError::not_found("cluster role bindings"));
        }
        Ok(state.cluster_role_bindings.clone())
    }

    async fn get_cluster_role(&self, ctx: &Context, name: &str) -> StoreResult<Option<ClusterRole>> {
        ctx.check()?;
        let state = self.state.read().await;
        let role = state
            .cluster_roles
            .get(name)
            .ok_or_else(|| StoreError::not_found(format!("cluster role {name}")))?;
        Ok((!role.rules.is_empty()).then(|| role.clone()))
    }

    async fn list_role_bindings(&self, ctx: &Context) -> StoreResult<Vec<RoleBinding>> {
        ctx.check()?;
        let namespace = require_namespace(ctx)?;
        let state = self.state.read().await;
        let bindings: Vec<RoleBinding> = state
            .role_bindings
            .iter()
            .filter(|b| b.namespace == namespace)
            .cloned()
            .collect();
        if bindings.is_empty() {
            return Err(StoreError::not_found(format!("role bindings in {namespace}")));
        }
        Ok(bindings)
    }

    async fn get_role(&self, ctx: &Context, name: &str) -> StoreResult<Option<Role>> {
        ctx.check()?;
        let namespace = require_namespace(ctx)?;
        let state = self.state.read().await;
        let role = state
            .roles
            .get(&(namespace.to_string(), name.to_string()))
            .ok_or_else(|| StoreError::not_found(format!("role {namespace}/{name}")))?;
        Ok((!role.rules.is_empty()).then(|| role.clone()))
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
