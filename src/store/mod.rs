//! Read side of the RBAC backing store.
//!
//! The authorizer only ever reads through [`RbacStore`]. Two implementations
//! ship with the crate: [`MemoryStore`] for tests and embedding, and
//! [`SqliteStore`] for the CLI.

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{ClusterRole, ClusterRoleBinding, Role, RoleBinding};

mod context;
pub mod memory;
pub mod sqlite;

pub use context::Context;
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("store call cancelled")]
    Cancelled,
    #[error("store call deadline exceeded")]
    DeadlineExceeded,
    #[error("database error")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

impl StoreError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode(message.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            StoreError::NotFound(_) => "not_found",
            StoreError::Cancelled => "cancelled",
            StoreError::DeadlineExceeded => "deadline_exceeded",
            StoreError::Database(_) => "database",
            StoreError::Decode(_) => "decode",
            StoreError::Unexpected(_) => "unexpected",
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Lookups the authorizer needs. Every call may return
/// [`StoreError::NotFound`], which callers treat as an empty result.
///
/// Namespaced lookups take their namespace from `ctx`.
#[async_trait]
pub trait RbacStore: Send + Sync {
    async fn list_cluster_role_bindings(&self, ctx: &Context) -> StoreResult<Vec<ClusterRoleBinding>>;

    /// `Ok(None)` means the role exists but grants nothing.
    async fn get_cluster_role(&self, ctx: &Context, name: &str) -> StoreResult<Option<ClusterRole>>;

    async fn list_role_bindings(&self, ctx: &Context) -> StoreResult<Vec<RoleBinding>>;

    async fn get_role(&self, ctx: &Context, name: &str) -> StoreResult<Option<Role>>;

    fn backend_name(&self) -> &'static str;
}

/// Namespace for a namespaced lookup, or an error when the context has none.
pub(crate) fn require_namespace(ctx: &Context) -> StoreResult<&str> {
    ctx.namespace()
        .ok_or_else(|| StoreError::Unexpected(anyhow::anyhow!("namespaced lookup without a namespace in context")))
}
