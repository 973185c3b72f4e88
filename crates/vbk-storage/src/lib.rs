//! Object storage backends for chunked volume backups
//!
//! This crate provides the pluggable backend contract, S3-compatible,
//! local filesystem and in-memory implementations, the per-operation
//! datastore session and mark-and-sweep garbage collection.

pub mod backend;
pub mod datastore;
pub mod error;
pub mod gc;
pub mod local;
pub mod memory;
pub mod s3;

pub use backend::ObjectStore;
pub use datastore::Datastore;
pub use error::{StorageError, StorageResult};
pub use gc::{GarbageCollector, GcOptions, GcResult};
pub use local::LocalBackend;
pub use memory::MemoryBackend;
pub use s3::{S3Backend, S3Config};
