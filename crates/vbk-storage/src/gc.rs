//! Garbage collection for orphaned chunk objects
//!
//! Deleting a backup only removes its manifest, because its chunk objects
//! may still be referenced by descendants or siblings. This mark-and-sweep
//! pass removes chunk objects that no manifest in the container references.
//!
//! A backup still in flight has uploaded chunks that no manifest references
//! yet. Callers pass the object prefixes of such backups in
//! `GcOptions::protected_prefixes` and their chunks are left alone.

use std::collections::HashSet;

use tracing::{info, instrument, warn};
use vbk_core::ObjectKind;

use crate::datastore::Datastore;
use crate::error::StorageResult;

/// Garbage collection options
#[derive(Debug, Clone, Default)]
pub struct GcOptions {
    /// Only report what would be deleted, don't actually delete
    pub dry_run: bool,
    /// Maximum number of chunks to delete in one run
    pub max_delete: Option<usize>,
    /// Object prefixes of backups in flight; their chunks are never swept
    pub protected_prefixes: Vec<String>,
}

/// Garbage collection result
#[derive(Debug, Clone, Default)]
pub struct GcResult {
    /// Number of manifests read during marking
    pub manifests_scanned: u64,
    /// Number of chunk objects in the container
    pub chunks_scanned: u64,
    /// Number of referenced chunks
    pub chunks_referenced: u64,
    /// Number of unreferenced chunks skipped because their backup is in flight
    pub chunks_protected: u64,
    /// Number of orphaned chunks found
    pub chunks_orphaned: u64,
    /// Number of chunks deleted
    pub chunks_deleted: u64,
    /// Names of orphaned chunks (deleted unless dry run)
    pub orphaned: Vec<String>,
    /// Errors encountered
    pub errors: Vec<String>,
}

/// Whether `name` is a chunk object of the backup with object prefix `prefix`
fn is_chunk_of(name: &str, prefix: &str) -> bool {
    name.strip_prefix(prefix)
        .map_or(false, |rest| rest.starts_with('-'))
}

/// Garbage collector
pub struct GarbageCollector<'a> {
    datastore: &'a Datastore,
}

impl<'a> GarbageCollector<'a> {
    /// Create a new garbage collector
    pub fn new(datastore: &'a Datastore) -> Self {
        Self { datastore }
    }

    /// Run garbage collection
    ///
    /// Any manifest that cannot be read aborts the run before anything is
    /// deleted: an unreadable manifest could reference any chunk.
    #[instrument(skip(self), fields(container = %self.datastore.container()))]
    pub async fn run(&self, options: GcOptions) -> StorageResult<GcResult> {
        let mut result = GcResult::default();

        info!("Starting garbage collection (dry_run={})", options.dry_run);

        let objects = self.datastore.list_objects("").await?;

        // Phase 1: Collect all referenced chunks from all manifests
        let mut referenced: HashSet<String> = HashSet::new();
        for name in objects
            .iter()
            .filter(|name| ObjectKind::classify(name) == ObjectKind::Manifest)
        {
            let manifest = self.datastore.read_manifest(name).await?;
            referenced.extend(manifest.object_names().map(str::to_string));
            result.manifests_scanned += 1;
        }
        info!(
            "Found {} referenced chunks in {} manifests",
            referenced.len(),
            result.manifests_scanned
        );

        // Phase 2: Find orphaned chunks
        let chunks: Vec<&String> = objects
            .iter()
            .filter(|name| ObjectKind::classify(name) == ObjectKind::Chunk)
            .collect();
        result.chunks_scanned = chunks.len() as u64;

        let mut orphaned: Vec<String> = Vec::new();
        for name in chunks {
            if referenced.contains(name.as_str()) {
                result.chunks_referenced += 1;
            } else if options
                .protected_prefixes
                .iter()
                .any(|prefix| is_chunk_of(name, prefix))
            {
                result.chunks_protected += 1;
            } else {
                orphaned.push(name.clone());
            }
        }
        result.chunks_orphaned = orphaned.len() as u64;
        info!(
            "Found {} orphaned chunks ({} kept for backups in flight)",
            orphaned.len(),
            result.chunks_protected
        );

        // Apply max_delete limit
        if let Some(max) = options.max_delete {
            if orphaned.len() > max {
                warn!("Limiting deletion to {} chunks (found {})", max, orphaned.len());
                orphaned.truncate(max);
            }
        }

        // Phase 3: Delete orphaned chunks
        if options.dry_run {
            info!("Dry run: would delete {} chunks", orphaned.len());
        } else {
            for name in &orphaned {
                match self.datastore.delete_object(name).await {
                    Ok(()) => result.chunks_deleted += 1,
                    Err(e) => {
                        result.errors.push(format!("Failed to delete {}: {}", name, e));
                    }
                }
            }
            info!("Deleted {} chunks", result.chunks_deleted);
        }

        result.orphaned = orphaned;
        Ok(result)
    }
}
