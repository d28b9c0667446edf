use serde::{Deserialize, Serialize};

use super::user::User;
use crate::errors::{AuthzError, AuthzResult};

/// Everything the authorizer knows about one request.
///
/// Built once by the caller from an authenticated, parsed request and only
/// read afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attributes {
    #[serde(default)]
    pub api_group: String,
    #[serde(default)]
    pub api_version: String,
    /// Empty for cluster-wide resources.
    #[serde(default)]
    pub namespace: String,
    pub resource: String,
    /// Empty means any instance of `resource`.
    #[serde(default)]
    pub resource_name: String,
    pub verb: String,
    #[serde(default)]
    pub user: Option<User>,
}

impl Attributes {
    pub fn new(verb: impl Into<String>, resource: impl Into<String>) -> Self {
        Self {
            verb: verb.into(),
            resource: resource.into(),
            ..Self::default()
        }
    }

    pub fn with_user(mut self, user: User) -> Self {
        self.user = Some(user);
        self
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn with_resource_name(mut self, name: impl Into<String>) -> Self {
        self.resource_name = name.into();
        self
    }

    pub fn with_api(mut self, group: impl Into<String>, version: impl Into<String>) -> Self {
        self.api_group = group.into();
        self.api_version = version.into();
        self
    }

    pub fn has_namespace(&self) -> bool {
        !self.namespace.is_empty()
    }

    /// Checks the request is well formed and returns the acting user.
    pub fn validate(&self) -> AuthzResult<&User> {
        if self.verb.is_empty() {
            return Err(AuthzError::invalid_argument("request verb is empty"));
        }
        if self.resource.is_empty() {
            return Err(AuthzError::invalid_argument("request resource is empty"));
        }

        let user = self
            .user
            .as_ref()
            .ok_or_else(|| AuthzError::invalid_argument("request has no user"))?;
        if user.username.is_empty() {
            return Err(AuthzError::invalid_argument("request user has an empty username"));
        }

        Ok(user)
    }
}
