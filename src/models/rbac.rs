use serde::{Deserialize, Serialize};

/// Matches any verb or resource when present in a rule.
pub const WILDCARD: &str = "*";

// =============================================================================
// RULE
// =============================================================================

/// Permission grant over verbs × resources × resource names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    pub verbs: Vec<String>,
    pub resources: Vec<String>,
    /// Empty grants every instance of the listed resources.
    #[serde(default)]
    pub resource_names: Vec<String>,
}

impl Rule {
    pub fn new<V, R>(verbs: V, resources: R) -> Self
    where
        V: IntoIterator,
        V::Item: Into<String>,
        R: IntoIterator,
        R::Item: Into<String>,
    {
        Self {
            verbs: verbs.into_iter().map(Into::into).collect(),
            resources: resources.into_iter().map(Into::into).collect(),
            resource_names: Vec::new(),
        }
    }

    pub fn with_resource_names<N>(mut self, names: N) -> Self
    where
        N: IntoIterator,
        N::Item: Into<String>,
    {
        self.resource_names = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn verb_matches(&self, verb: &str) -> bool {
        self.verbs.iter().any(|v| v == WILDCARD || v == verb)
    }

    pub fn resource_matches(&self, resource: &str) -> bool {
        self.resources.iter().any(|r| r == WILDCARD || r == resource)
    }

    pub fn resource_name_matches(&self, name: &str) -> bool {
        self.resource_names.is_empty() || self.resource_names.iter().any(|n| n == name)
    }
}

// =============================================================================
// ROLES
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterRole {
    pub name: String,
    #[serde(default)]
    pub rules: Vec<Rule>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub name: String,
    pub namespace: String,
    #[serde(default)]
    pub rules: Vec<Rule>,
}

// =============================================================================
// SUBJECTS AND ROLE REFERENCES
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SubjectKind {
    User,
    Group,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    pub kind: SubjectKind,
    pub name: String,
}

impl Subject {
    pub fn user(name: impl Into<String>) -> Self {
        Self { kind: SubjectKind::User, name: name.into() }
    }

    pub fn group(name: impl Into<String>) -> Self {
        Self { kind: SubjectKind::Group, name: name.into() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RoleKind {
    Role,
    ClusterRole,
}

impl RoleKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoleKind::Role => "Role",
            RoleKind::ClusterRole => "ClusterRole",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "Role" => Some(RoleKind::Role),
            "ClusterRole" => Some(RoleKind::ClusterRole),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleRef {
    pub kind: RoleKind,
    pub name: String,
}

impl RoleRef {
    pub fn role(name: impl Into<String>) -> Self {
        Self { kind: RoleKind::Role, name: name.into() }
    }

    pub fn cluster_role(name: impl Into<String>) -> Self {
        Self { kind: RoleKind::ClusterRole, name: name.into() }
    }
}

// =============================================================================
// BINDINGS
// =============================================================================

/// Grants a cluster role to its subjects in every namespace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterRoleBinding {
    pub name: String,
    pub role_ref: RoleRef,
    #[serde(default)]
    pub subjects: Vec<Subject>,
}

/// Grants a role, or a cluster role, to its subjects within one namespace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleBinding {
    pub name: String,
    pub namespace: String,
    pub role_ref: RoleRef,
    #[serde(default)]
    pub subjects: Vec<Subject>,
}

/// Read access shared by both binding kinds.
pub trait Binding: Send + Sync {
    fn name(&self) -> &str;
    fn role_ref(&self) -> &RoleRef;
    fn subjects(&self) -> &[Subject];
}

impl Binding for ClusterRoleBinding {
    fn name(&self) -> &str { &self.name }
    fn role_ref(&self) -> &RoleRef { &self.role_ref }
    fn subjects(&self) -> &[Subject] { &self.subjects }
}

impl Binding for RoleBinding {
    fn name(&self) -> &str { &self.name }
    fn role_ref(&self) -> &RoleRef { &self.role_ref }
    fn subjects(&self) -> &[Subject] { &self.subjects }
}

// =============================================================================
// FIXTURE (seed document)
// =============================================================================

/// A full set of RBAC objects, as loaded by `rbac-authz seed`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fixture {
    #[serde(default)]
    pub cluster_roles: Vec<ClusterRole>,
    #[serde(default)]
    pub cluster_role_bindings: Vec<ClusterRoleBinding>,
    #[serde(default)]
    pub roles: Vec<Role>,
    #[serde(default)]
    pub role_bindings: Vec<RoleBinding>,
}

impl Fixture {
    pub fn from_json(raw: &str) -> serde_json::Result<Self> {
        serde_json::from_str(raw)
    }
}
