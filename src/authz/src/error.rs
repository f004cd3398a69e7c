//! Error types for the authorization engine

use apigov_core::CoreError;
use serde::Serialize;
use thiserror::Error;

/// Authorization engine errors
#[derive(Debug, Error)]
pub enum AuthzError {
    /// User, role, department or API does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Entity exists but the scope/ownership check failed
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Duplicate code or name
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Bearer token carries a version older than the user's current one
    #[error("Token is stale: claimed version {claimed}, current version {current}")]
    TokenStale { claimed: u64, current: u64 },

    /// Token could not be minted or verified
    #[error("Token error: {0}")]
    Token(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Invalid policy definition
    #[error("Invalid policy: {0}")]
    InvalidPolicy(String),

    /// Database error
    #[error("Database error: {0}")]
    DatabaseError(String),

    /// Catalog collaborator failure
    #[error("Catalog error: {0}")]
    Catalog(CoreError),

    /// Internal error (reload failure, refused reload, ...)
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Coarse error classes surfaced to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    Forbidden,
    Conflict,
    Stale,
    Internal,
}

impl AuthzError {
    /// Classify the error into the caller-facing taxonomy
    pub fn kind(&self) -> ErrorKind {
        match self {
            AuthzError::NotFound(_) => ErrorKind::NotFound,
            AuthzError::Forbidden(_) => ErrorKind::Forbidden,
            AuthzError::Conflict(_) => ErrorKind::Conflict,
            AuthzError::TokenStale { .. } => ErrorKind::Stale,
            AuthzError::Catalog(CoreError::NotFound(_)) => ErrorKind::NotFound,
            AuthzError::Catalog(CoreError::Conflict(_)) => ErrorKind::Conflict,
            AuthzError::Token(_)
            | AuthzError::InvalidInput(_)
            | AuthzError::InvalidPolicy(_)
            | AuthzError::DatabaseError(_)
            | AuthzError::Catalog(_)
            | AuthzError::Internal(_) => ErrorKind::Internal,
        }
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        AuthzError::NotFound(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        AuthzError::Forbidden(msg.into())
    }
}

impl From<CoreError> for AuthzError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::NotFound(msg) => AuthzError::NotFound(msg),
            CoreError::Conflict(msg) => AuthzError::Conflict(msg),
            other => AuthzError::Catalog(other),
        }
    }
}

/// Result type for authorization operations
pub type Result<T> = std::result::Result<T, AuthzError>;
