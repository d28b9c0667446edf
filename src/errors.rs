use crate::store::StoreError;

pub type AuthzResult<T> = Result<T, AuthzError>;

#[derive(thiserror::Error, Debug)]
pub enum AuthzError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl AuthzError {
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Underlying store failure, if this error came from the store.
    pub fn as_store_error(&self) -> Option<&StoreError> {
        match self {
            AuthzError::Store(err) => Some(err),
            _ => None,
        }
    }

    /// Short machine-readable label, used as a log field and by the CLI.
    pub fn kind(&self) -> &'static str {
        match self {
            AuthzError::InvalidArgument(_) => "invalid_argument",
            AuthzError::Configuration(_) => "configuration",
            AuthzError::Store(err) => err.kind(),
        }
    }
}
