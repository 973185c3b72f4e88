//! Block digest map
//!
//! Alongside the manifest every backup stores the SHA-256 of each
//! `block_size` slice of the volume. Blocks are much finer than chunk
//! objects, so two backups can be compared block by block without
//! downloading any chunk data.

use serde::{Deserialize, Serialize};

use crate::chunk::ChunkDigest;
use crate::error::Result;
use crate::manifest::{lenient_id, BackupManifest};

/// Per-block digests of one backup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockDigestMap {
    #[serde(deserialize_with = "lenient_id::deserialize")]
    pub backup_id: String,
    #[serde(deserialize_with = "lenient_id::deserialize")]
    pub volume_id: String,
    #[serde(default)]
    pub backup_name: Option<String>,
    #[serde(default)]
    pub backup_description: Option<String>,
    pub created_at: String,
    /// Block size the digests were computed at
    pub chunk_size: u64,
    /// One digest per block, in volume order
    pub sha256s: Vec<ChunkDigest>,
}

impl BlockDigestMap {
    /// Create an empty map sharing the manifest's identity
    pub fn for_manifest(manifest: &BackupManifest, block_size: u64) -> Self {
        Self {
            backup_id: manifest.backup_id.clone(),
            volume_id: manifest.volume_id.clone(),
            backup_name: manifest.backup_name.clone(),
            backup_description: manifest.backup_description.clone(),
            created_at: manifest.created_at.clone(),
            chunk_size: block_size,
            sha256s: Vec::new(),
        }
    }

    /// Append the block digests of the next chunk of the volume
    pub fn extend_from_chunk(&mut self, data: &[u8]) {
        let block_size = usize::try_from(self.chunk_size).unwrap_or(usize::MAX);
        self.sha256s.extend(ChunkDigest::blocks(data, block_size));
    }

    pub fn block_count(&self) -> usize {
        self.sha256s.len()
    }

    /// Block indices whose digest differs from `other`, including blocks
    /// present in only one of the two maps
    pub fn changed_blocks(&self, other: &BlockDigestMap) -> Vec<usize> {
        let len = self.sha256s.len().max(other.sha256s.len());
        (0..len)
            .filter(|&i| self.sha256s.get(i) != other.sha256s.get(i))
            .collect()
    }

    /// Serialize to JSON
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse from raw object bytes
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
