use serde::de::DeserializeOwned;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use crate::models::{ClusterRole, ClusterRoleBinding, Role, RoleBinding, RoleKind, RoleRef};
use crate::store::{StoreError, StoreResult};

fn text(row: &SqliteRow, col: &str) -> StoreResult<String> {
    row.try_get::<String, _>(col)
        .map_err(|e| StoreError::decode(format!("missing {}: {}", col, e)))
}

fn json_column<T: DeserializeOwned>(row: &SqliteRow, col: &str) -> StoreResult<Vec<T>> {
    let raw = text(row, col)?;
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(trimmed).map_err(|e| StoreError::decode(format!("invalid {} json: {}", col, e)))
}

fn role_ref_from_row(row: &SqliteRow) -> StoreResult<RoleRef> {
    let kind_s = text(row, "role_kind")?;
    let kind = RoleKind::parse(&kind_s)
        .ok_or_else(|| StoreError::decode(format!("invalid role_kind: {}", kind_s)))?;
    let name = text(row, "role_name")?;
    Ok(RoleRef { kind, name })
}

pub fn cluster_role_from_row(row: &SqliteRow) -> StoreResult<ClusterRole> {
    Ok(ClusterRole {
        name: text(row, "name")?,
        rules: json_column(row, "rules")?,
    })
}

pub fn role_from_row(row: &SqliteRow) -> StoreResult<Role> {
    Ok(Role {
        name: text(row, "name")?,
        namespace: text(row, "namespace")?,
        rules: json_column(row, "rules")?,
    })
}

pub fn cluster_role_binding_from_row(row: &SqliteRow) -> StoreResult<ClusterRoleBinding> {
    Ok(ClusterRoleBinding {
        name: text(row, "name")?,
        role_ref: role_ref_from_row(row)?,
        subjects: json_column(row, "subjects")?,
    })
}

pub fn role_binding_from_row(row: &SqliteRow) -> StoreResult<RoleBinding> {
    Ok(RoleBinding {
        name: text(row, "name")?,
        namespace: text(row, "namespace")?,
        role_ref: role_ref_from_row(row)?,
        subjects: json_column(row, "subjects")?,
    })
}
