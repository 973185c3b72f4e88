//! Datastore - per-operation view of one container
//!
//! A datastore pairs a backend with the container a backup lives in. Every
//! backup, restore or delete builds its own; nothing is shared between
//! operations besides the backend handle itself.

use std::sync::Arc;

use bytes::Bytes;
use vbk_core::{BackupManifest, BlockDigestMap, CompressionAlgorithm};
use tracing::{debug, info, instrument};

use crate::backend::ObjectStore;
use crate::error::{StorageError, StorageResult};

/// A container on a storage backend
pub struct Datastore {
    /// Container name
    container: String,
    /// Storage backend
    backend: Arc<dyn ObjectStore>,
}

impl Datastore {
    /// Create a new datastore
    pub fn new(backend: Arc<dyn ObjectStore>, container: &str) -> Self {
        Self {
            container: container.to_string(),
            backend,
        }
    }

    /// Get container name
    pub fn container(&self) -> &str {
        &self.container
    }

    /// Make sure the container exists, creating it if needed
    ///
    /// A failed create is forgiven when a second listing shows the
    /// container, which happens when a concurrent writer created it first.
    #[instrument(skip(self), fields(container = %self.container))]
    pub async fn ensure_container(&self) -> StorageResult<()> {
        let containers = self.backend.list_containers().await?;
        if containers.iter().any(|c| c == &self.container) {
            debug!("Container exists");
            return Ok(());
        }

        match self.backend.create_container(&self.container).await {
            Ok(()) => {
                info!("Created container {}", self.container);
                Ok(())
            }
            Err(StorageError::ContainerError { container, reason }) => {
                let containers = self.backend.list_containers().await?;
                if containers.iter().any(|c| c == &self.container) {
                    debug!("Container created concurrently");
                    Ok(())
                } else {
                    Err(StorageError::ContainerError { container, reason })
                }
            }
            Err(e) => Err(e),
        }
    }

    /// Compress and store a chunk, returning the stored size
    #[instrument(skip(self, data), fields(container = %self.container, size = data.len()))]
    pub async fn store_chunk(
        &self,
        name: &str,
        data: &[u8],
        compression: CompressionAlgorithm,
    ) -> StorageResult<u64> {
        let encoded = compression.compress(data)?;
        let stored = encoded.len() as u64;
        self.backend
            .put_object(&self.container, name, Bytes::from(encoded))
            .await?;
        Ok(stored)
    }

    /// Read and decompress a chunk
    #[instrument(skip(self), fields(container = %self.container))]
    pub async fn read_chunk(
        &self,
        name: &str,
        compression: CompressionAlgorithm,
    ) -> StorageResult<Vec<u8>> {
        let data = self.backend.get_object(&self.container, name).await?;
        Ok(compression.decompress(&data)?)
    }

    /// Store a backup manifest
    #[instrument(skip(self, manifest), fields(container = %self.container, backup = %manifest.backup_id))]
    pub async fn store_manifest(&self, name: &str, manifest: &BackupManifest) -> StorageResult<()> {
        let json = manifest.to_json()?;
        self.backend
            .put_object(&self.container, name, Bytes::from(json))
            .await
    }

    /// Read a backup manifest
    #[instrument(skip(self), fields(container = %self.container))]
    pub async fn read_manifest(&self, name: &str) -> StorageResult<BackupManifest> {
        let data = self.backend.get_object(&self.container, name).await?;
        Ok(BackupManifest::from_slice(&data)?)
    }

    /// Store a block digest map
    #[instrument(skip(self, map), fields(container = %self.container, blocks = map.block_count()))]
    pub async fn store_block_digests(&self, name: &str, map: &BlockDigestMap) -> StorageResult<()> {
        let json = map.to_json()?;
        self.backend
            .put_object(&self.container, name, Bytes::from(json))
            .await
    }

    /// Read a block digest map
    #[instrument(skip(self), fields(container = %self.container))]
    pub async fn read_block_digests(&self, name: &str) -> StorageResult<BlockDigestMap> {
        let data = self.backend.get_object(&self.container, name).await?;
        Ok(BlockDigestMap::from_slice(&data)?)
    }

    /// Delete an object; missing objects are not an error
    #[instrument(skip(self), fields(container = %self.container))]
    pub async fn delete_object(&self, name: &str) -> StorageResult<()> {
        self.backend.delete_object(&self.container, name).await
    }

    /// List object names under a prefix
    pub async fn list_objects(&self, prefix: &str) -> StorageResult<Vec<String>> {
        self.backend.list_objects(&self.container, prefix).await
    }
}
