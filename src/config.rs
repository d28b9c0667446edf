use std::time::Duration;

use crate::errors::{AuthzError, AuthzResult};

const DEFAULT_STORE_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_MAX_CONNECTIONS: u32 = 10;

#[derive(Debug, Clone)]
pub struct AuthzConfig {
    pub database_url: Option<String>,
    /// Deadline applied to each authorization call's store reads.
    pub store_timeout: Duration,
    pub max_connections: u32,
}

impl Default for AuthzConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            store_timeout: Duration::from_millis(DEFAULT_STORE_TIMEOUT_MS),
            max_connections: DEFAULT_MAX_CONNECTIONS,
        }
    }
}

impl AuthzConfig {
    pub fn from_env() -> AuthzResult<Self> {
        let database_url = std::env::var("DATABASE_URL").ok().filter(|v| !v.is_empty());

        let timeout_ms = std::env::var("AUTHZ_STORE_TIMEOUT_MS")
            .map(|val| val.parse::<u64>())
            .unwrap_or(Ok(DEFAULT_STORE_TIMEOUT_MS))
            .map_err(|_| AuthzError::configuration("AUTHZ_STORE_TIMEOUT_MS must be a valid integer"))?;

        let max_connections = std::env::var("AUTHZ_DB_MAX_CONNECTIONS")
            .map(|val| val.parse::<u32>())
            .unwrap_or(Ok(DEFAULT_MAX_CONNECTIONS))
            .map_err(|_| AuthzError::configuration("AUTHZ_DB_MAX_CONNECTIONS must be a valid integer"))?;
        if max_connections == 0 {
            return Err(AuthzError::configuration("AUTHZ_DB_MAX_CONNECTIONS must be at least 1"));
        }

        Ok(Self {
            database_url,
            store_timeout: Duration::from_millis(timeout_ms),
            max_connections,
        })
    }

    pub fn with_database_url(mut self, url: impl Into<String>) -> Self {
        self.database_url = Some(url.into());
        self
    }

    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }
}
