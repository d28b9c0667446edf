use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::matcher::DenyReason;
use crate::models::RoleRef;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    Cluster,
    Namespace,
}

impl Scope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::Cluster => "cluster",
            Scope::Namespace => "namespace",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    /// Request has no namespace, so namespaced bindings were not read.
    Skipped,
    NoBindings,
    SubjectMismatch,
    RoleNotFound,
    RoleEmpty,
    RuleDenied { rule: usize, reason: DenyReason },
    Allowed { rule: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TraceEntry {
    pub scope: Scope,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub binding: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<RoleRef>,
    #[serde(flatten)]
    pub outcome: Outcome,
}

impl TraceEntry {
    pub(crate) fn scope(scope: Scope, outcome: Outcome) -> Self {
        Self { scope, binding: None, role: None, outcome }
    }

    pub(crate) fn binding(scope: Scope, binding: &str, role: &RoleRef, outcome: Outcome) -> Self {
        Self {
            scope,
            binding: Some(binding.to_string()),
            role: Some(role.clone()),
            outcome,
        }
    }
}

/// Result of one evaluation, with the path that led to it.
#[derive(Debug, Clone, Serialize)]
pub struct Decision {
    pub request_id: Uuid,
    pub evaluated_at: DateTime<Utc>,
    pub allowed: bool,
    pub trace: Vec<TraceEntry>,
}

impl Decision {
    pub(crate) fn new(request_id: Uuid) -> Self {
        Self {
            request_id,
            evaluated_at: Utc::now(),
            allowed: false,
            trace: Vec::new(),
        }
    }

    /// The entry that granted access, if any.
    pub fn granted_by(&self) -> Option<&TraceEntry> {
        self.trace
            .iter()
            .find(|entry| matches!(entry.outcome, Outcome::Allowed { .. }))
    }

    /// True when a binding of `scope` was examined.
    pub fn consulted(&self, scope: Scope) -> bool {
        self.trace
            .iter()
            .any(|entry| entry.scope == scope && entry.outcome != Outcome::Skipped)
    }
}
