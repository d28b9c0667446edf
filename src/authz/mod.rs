//! Authorization engine.
//!
//! Resolves RBAC bindings from an [`RbacStore`](crate::store::RbacStore) and
//! decides allow/deny for a request:
//! - cluster role bindings first, then role bindings of the request namespace
//! - rules match on verb, resource and resource name, with `*` wildcards
//! - the first matching rule allows; no match is a deny, not an error
//! - each evaluation records a trace of why bindings and rules did not apply

mod authorizer;
mod matcher;
mod trace;

pub use authorizer::{Authorizer, RbacAuthorizer};
pub use matcher::{matches_user, rule_allows, DenyReason};
pub use trace::{Decision, Outcome, Scope, TraceEntry};

