//! Unified error type for catalog collaborators
//!
//! Every catalog implementation (in-memory, SQL, remote) reports failures
//! through [`CoreError`] so the authorization engine can classify them
//! without knowing the backend.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, CoreError>;

/// Core error type for the APIGov platform
#[derive(Debug, Error)]
pub enum CoreError {
    /// Entity not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Unique constraint violated (duplicate code, username, ...)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Backend storage failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization/Deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid input/state
    #[error("Invalid: {0}")]
    Invalid(String),

    /// I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CoreError {
    /// Create a not-found error
    pub fn not_found<S: Into<String>>(msg: S) -> Self {
        CoreError::NotFound(msg.into())
    }

    /// Create a conflict error
    pub fn conflict<S: Into<String>>(msg: S) -> Self {
        CoreError::Conflict(msg.into())
    }

    /// Create a storage error
    pub fn storage<S: Into<String>>(msg: S) -> Self {
        CoreError::Storage(msg.into())
    }

    /// Create an invalid-input error
    pub fn invalid<S: Into<String>>(msg: S) -> Self {
        CoreError::Invalid(msg.into())
    }

    /// Whether this error only says the entity does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(self, CoreError::NotFound(_))
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::Serialization(err.to_string())
    }
}
