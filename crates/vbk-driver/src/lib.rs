//! Backup, restore and delete of block volumes on object storage
//!
//! `BackupDriver` splits a volume into fixed-size chunks, uploads the chunks
//! that no ancestor backup already holds and writes a manifest listing where
//! every chunk lives. Restores read that manifest alone.

mod backup;
pub mod config;
mod delete;
pub mod driver;
pub mod error;
pub mod progress;
pub mod record;
mod restore;

#[cfg(test)]
mod testing;

pub use config::{DriverConfig, StorageConfig};
pub use driver::BackupDriver;
pub use error::{BackupFailure, DriverError, DriverResult};
pub use progress::{NoopNotifier, ProgressNotifier, ProgressTracker, TracingNotifier};
pub use record::{BackupRecord, BackupStatus, BackupStore, JsonBackupStore, MemoryBackupStore};
