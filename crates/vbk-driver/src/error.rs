//! Error types for vbk-driver

use thiserror::Error;
use vbk_storage::StorageError;

/// Driver error type
#[derive(Error, Debug)]
pub enum DriverError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Manifest error: {0}")]
    Manifest(String),

    #[error("Backup driver error: {0}")]
    Driver(String),

    #[error("Backup record not found: {0}")]
    RecordNotFound(String),

    #[error("Volume I/O error: {0}")]
    Volume(std::io::Error),

    #[error("Core error: {0}")]
    Core(#[from] vbk_core::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Persistence(#[from] anyhow::Error),

    #[error("Cleanup of backup {backup_id} failed: {cleanup} (original error: {original})")]
    CleanupFailed {
        backup_id: String,
        cleanup: Box<DriverError>,
        original: Box<DriverError>,
    },
}

impl DriverError {
    /// The cleanup failure carried by `CleanupFailed`
    pub fn cleanup_error(&self) -> Option<&DriverError> {
        match self {
            DriverError::CleanupFailed { cleanup, .. } => Some(cleanup),
            _ => None,
        }
    }
}

/// Result type alias
pub type DriverResult<T> = std::result::Result<T, DriverError>;

/// Outcome of a failed backup run and its cleanup
#[derive(Debug)]
pub struct BackupFailure {
    pub backup_id: String,
    /// Error that aborted the run
    pub primary_error: DriverError,
    /// Error raised while deleting the run's objects, if any
    pub cleanup_error: Option<DriverError>,
}

impl BackupFailure {
    /// The error reported to the caller: a cleanup failure supersedes the
    /// primary error, which is kept inside it
    pub fn into_surfaced(self) -> DriverError {
        match self.cleanup_error {
            Some(cleanup) => DriverError::CleanupFailed {
                backup_id: self.backup_id,
                cleanup: Box::new(cleanup),
                original: Box::new(self.primary_error),
            },
            None => self.primary_error,
        }
    }
}
