//! Storage error types
//!
//! Every backend translates its native errors into this taxonomy, so nothing
//! backend-specific leaks to callers.

use thiserror::Error;

/// Storage error type
#[derive(Error, Debug)]
pub enum StorageError {
    /// Backend unreachable; wraps all transport-level failures
    #[error("Connection to storage backend failed: {0}")]
    ConnectionFailure(String),

    #[error("Container {container} error: {reason}")]
    ContainerError { container: String, reason: String },

    #[error("Failed to write object {container}/{name}: {reason}")]
    ObjectWriteFailure {
        container: String,
        name: String,
        reason: String,
    },

    #[error("Failed to read object {container}/{name}: {reason}")]
    ObjectReadFailure {
        container: String,
        name: String,
        reason: String,
    },

    #[error("Object not found: {container}/{name}")]
    ObjectNotFound { container: String, name: String },

    #[error("Failed to delete object {container}/{name}: {reason}")]
    ObjectDeleteFailure {
        container: String,
        name: String,
        reason: String,
    },

    #[error("Core error: {0}")]
    Core(#[from] vbk_core::Error),
}

impl StorageError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::ObjectNotFound { .. })
    }
}

/// Result type alias
pub type StorageResult<T> = Result<T, StorageError>;
