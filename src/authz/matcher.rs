use std::fmt;

use serde::Serialize;

use crate::models::{Attributes, Rule, Subject, SubjectKind, User};

/// Why a rule did not apply to a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DenyReason {
    #[serde(rename = "forbidden verb")]
    ForbiddenVerb,
    #[serde(rename = "forbidden resource")]
    ForbiddenResource,
    #[serde(rename = "forbidden resource name")]
    ForbiddenResourceName,
}

impl DenyReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DenyReason::ForbiddenVerb => "forbidden verb",
            DenyReason::ForbiddenResource => "forbidden resource",
            DenyReason::ForbiddenResourceName => "forbidden resource name",
        }
    }
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Checks `rule` against the request: verb, then resource, then resource name.
/// Stops at the first axis that fails.
pub fn rule_allows(attrs: &Attributes, rule: &Rule) -> Result<(), DenyReason> {
    if !rule.verb_matches(&attrs.verb) {
        return Err(DenyReason::ForbiddenVerb);
    }

    if !rule.resource_matches(&attrs.resource) {
        return Err(DenyReason::ForbiddenResource);
    }

    if !rule.resource_name_matches(&attrs.resource_name) {
        return Err(DenyReason::ForbiddenResourceName);
    }

    Ok(())
}

/// True when any subject names the user directly or one of its groups.
pub fn matches_user(user: &User, subjects: &[Subject]) -> bool {
    subjects.iter().any(|subject| match subject.kind {
        SubjectKind::User => subject.name == user.username,
        SubjectKind::Group => user.in_group(&subject.name),
    })
}
