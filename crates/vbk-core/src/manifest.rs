//! Backup manifest
//!
//! The manifest is the top-level description of one backup. It lists every
//! chunk object needed to rebuild the volume, including chunks referenced
//! from ancestor backups, so restore never has to walk the parent chain.
//!
//! Wire format (JSON):
//!
//! ```json
//! {
//!   "version": "1.0.0",
//!   "backup_id": "...",
//!   "volume_id": "...",
//!   "backup_name": "...",
//!   "backup_description": "...",
//!   "created_at": "2024-01-09 11:20:54.805000",
//!   "objects": [
//!     {"volume_x/az_y_backup_z-00000": {"compression": "zlib", "length": 10, "offset": 0, "sha256": "..."}}
//!   ]
//! }
//! ```

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::chunk::ChunkDigest;
use crate::compress::CompressionAlgorithm;
use crate::error::{Error, Result};

/// Current manifest format version
pub const MANIFEST_VERSION: &str = "1.0.0";

/// Versions this reader understands
const SUPPORTED_VERSIONS: &[&str] = &[MANIFEST_VERSION];

/// Timestamp format used for `created_at`
pub(crate) const CREATED_AT_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// Storage details of one chunk object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectInfo {
    /// Compression the object was written with
    pub compression: CompressionAlgorithm,
    /// Uncompressed length
    pub length: u64,
    /// Offset in the volume
    pub offset: u64,
    /// Digest of the uncompressed bytes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<ChunkDigest>,
}

/// A chunk entry in the manifest
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    /// Object holding the chunk, possibly written by an ancestor backup
    pub object_name: String,
    pub info: ObjectInfo,
}

impl ManifestEntry {
    /// End offset (exclusive) of the chunk in the volume
    pub fn end(&self) -> u64 {
        self.info.offset + self.info.length
    }
}

/// Serialization of the object list as `[{name: info}, ...]`
mod object_list {
    use std::collections::BTreeMap;

    use serde::ser::SerializeSeq;
    use serde::{Deserialize, Deserializer, Serializer};

    use super::{ManifestEntry, ObjectInfo};

    pub fn serialize<S>(entries: &[ManifestEntry], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut seq = serializer.serialize_seq(Some(entries.len()))?;
        for entry in entries {
            let mut map = BTreeMap::new();
            map.insert(entry.object_name.as_str(), &entry.info);
            seq.serialize_element(&map)?;
        }
        seq.end()
    }

    /// Older writers packed several objects into a single map, so every
    /// map is flattened and the result is ordered by offset.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<ManifestEntry>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let maps: Vec<BTreeMap<String, ObjectInfo>> = Vec::deserialize(deserializer)?;
        let mut entries: Vec<ManifestEntry> = maps
            .into_iter()
            .flat_map(|map| map.into_iter())
            .map(|(object_name, info)| ManifestEntry { object_name, info })
            .collect();
        entries.sort_by_key(|entry| entry.info.offset);
        Ok(entries)
    }
}

/// Identifiers may have been written as JSON numbers
pub(crate) mod lenient_id {
    use serde::{Deserialize, Deserializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Text(String),
        Number(i64),
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<String, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match Id::deserialize(deserializer)? {
            Id::Text(s) => s,
            Id::Number(n) => n.to_string(),
        })
    }
}

/// Backup manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupManifest {
    /// Format version
    pub version: String,
    #[serde(deserialize_with = "lenient_id::deserialize")]
    pub backup_id: String,
    #[serde(deserialize_with = "lenient_id::deserialize")]
    pub volume_id: String,
    #[serde(default)]
    pub backup_name: Option<String>,
    #[serde(default)]
    pub backup_description: Option<String>,
    /// Creation timestamp
    pub created_at: String,
    /// Chunk list, ordered by offset
    #[serde(with = "object_list")]
    pub objects: Vec<ManifestEntry>,
}

impl BackupManifest {
    /// Create a new, empty manifest stamped with the current time
    pub fn new(backup_id: &str, volume_id: &str) -> Self {
        Self {
            version: MANIFEST_VERSION.to_string(),
            backup_id: backup_id.to_string(),
            volume_id: volume_id.to_string(),
            backup_name: None,
            backup_description: None,
            created_at: Utc::now().format(CREATED_AT_FORMAT).to_string(),
            objects: Vec::new(),
        }
    }

    /// Set display name and description
    pub fn with_description(mut self, name: Option<&str>, description: Option<&str>) -> Self {
        self.backup_name = name.map(str::to_string);
        self.backup_description = description.map(str::to_string);
        self
    }

    /// Append a chunk entry. Entries must be pushed in offset order.
    pub fn push(&mut self, object_name: &str, info: ObjectInfo) {
        self.objects.push(ManifestEntry {
            object_name: object_name.to_string(),
            info,
        });
    }

    /// Entry at chunk index `index`
    pub fn entry(&self, index: u64) -> Option<&ManifestEntry> {
        usize::try_from(index).ok().and_then(|i| self.objects.get(i))
    }

    pub fn chunk_count(&self) -> usize {
        self.objects.len()
    }

    /// Size of the volume covered by the chunk list
    pub fn logical_size(&self) -> u64 {
        self.objects.last().map(ManifestEntry::end).unwrap_or(0)
    }

    /// Names of all chunk objects this manifest references
    pub fn object_names(&self) -> impl Iterator<Item = &str> {
        self.objects.iter().map(|entry| entry.object_name.as_str())
    }

    /// Fail unless this reader understands the manifest version
    pub fn check_version(&self) -> Result<()> {
        if SUPPORTED_VERSIONS.contains(&self.version.as_str()) {
            Ok(())
        } else {
            Err(Error::Manifest(format!(
                "Unsupported manifest version {}",
                self.version
            )))
        }
    }

    /// Check that chunk ranges do not overlap
    pub fn validate(&self) -> Result<()> {
        for pair in self.objects.windows(2) {
            if pair[0].end() > pair[1].info.offset {
                return Err(Error::Manifest(format!(
                    "Objects {} and {} overlap",
                    pair[0].object_name, pair[1].object_name
                )));
            }
        }
        Ok(())
    }

    /// Serialize to JSON
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse from JSON and validate the chunk list
    pub fn from_json(json: &str) -> Result<Self> {
        let manifest: Self = serde_json::from_str(json)?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Parse from raw object bytes
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let manifest: Self = serde_json::from_slice(bytes)?;
        manifest.validate()?;
        Ok(manifest)
    }
}
