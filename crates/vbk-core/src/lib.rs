//! Core data structures for chunked volume backups
//!
//! This crate implements the pieces of a backup that do not touch a storage
//! backend: fixed-size chunking, content digests, per-chunk compression,
//! deterministic object naming, the backup manifest and incremental diff
//! planning against an ancestor chain.

pub mod blockmap;
pub mod chunk;
pub mod compress;
pub mod diff;
pub mod error;
pub mod manifest;
pub mod naming;

pub use blockmap::BlockDigestMap;
pub use chunk::{
    chunk_count, Chunk, ChunkDigest, FixedChunker, BLOCK_SIZE_DEFAULT, OBJECT_SIZE_DEFAULT,
};
pub use compress::CompressionAlgorithm;
pub use diff::{ChunkPlan, DiffPlanner};
pub use error::{Error, Result};
pub use manifest::{BackupManifest, ManifestEntry, ObjectInfo, MANIFEST_VERSION};
pub use naming::{ObjectKind, ObjectNamer};
