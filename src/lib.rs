pub mod authz;
pub mod config;
pub mod db;
pub mod errors;
pub mod models;
pub mod store;

// Re-export commonly used items for tests
pub use authz::{Authorizer, Decision, RbacAuthorizer};
pub use errors::{AuthzError, AuthzResult};
pub use store::{Context, RbacStore, StoreError};
