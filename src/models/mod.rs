pub mod attributes;
pub mod rbac;
pub mod user;

pub use attributes::Attributes;
pub use rbac::{
    Binding, ClusterRole, ClusterRoleBinding, Fixture, Role, RoleBinding, RoleKind, RoleRef, Rule,
    Subject, SubjectKind, WILDCARD,
};
pub use user::User;
