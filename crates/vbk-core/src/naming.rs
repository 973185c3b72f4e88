//! Deterministic object naming
//!
//! Every object a backup writes lives under a prefix derived from the
//! availability zone, backup id and volume id:
//!
//! - `volume_{volume}/az_{zone}_backup_{backup}-{index:05}` - chunk objects
//! - `volume_{volume}/az_{zone}_backup_{backup}_metadata` - the manifest
//! - `volume_{volume}/az_{zone}_backup_{backup}_sha256file` - block digests
//!
//! Restore rebuilds these names from the backup record alone.

const MANIFEST_SUFFIX: &str = "_metadata";
const BLOCK_DIGESTS_SUFFIX: &str = "_sha256file";

/// Names the objects belonging to one backup
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectNamer {
    prefix: String,
}

impl ObjectNamer {
    pub fn new(zone: &str, backup_id: &str, volume_id: &str) -> Self {
        Self {
            prefix: format!("volume_{}/az_{}_backup_{}", volume_id, zone, backup_id),
        }
    }

    /// Common prefix of every object of this backup
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Name of the chunk object at `index`
    pub fn chunk_object(&self, index: u64) -> String {
        format!("{}-{:05}", self.prefix, index)
    }

    /// Name of the manifest object
    pub fn manifest_object(&self) -> String {
        format!("{}{}", self.prefix, MANIFEST_SUFFIX)
    }

    /// Name of the block digest map object
    pub fn block_digests_object(&self) -> String {
        format!("{}{}", self.prefix, BLOCK_DIGESTS_SUFFIX)
    }
}

/// What an object in a container holds, judged by its name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    Chunk,
    Manifest,
    BlockDigests,
}

impl ObjectKind {
    pub fn classify(name: &str) -> Self {
        if name.ends_with(MANIFEST_SUFFIX) {
            ObjectKind::Manifest
        } else if name.ends_with(BLOCK_DIGESTS_SUFFIX) {
            ObjectKind::BlockDigests
        } else {
            ObjectKind::Chunk
        }
    }
}
