//! Incremental backup planning
//!
//! For every chunk of the volume being backed up, the planner looks for an
//! ancestor manifest holding identical content at the same position. The
//! whole chain is searched, newest ancestor first, so content that stayed
//! unchanged over many generations is still uploaded only once.

use tracing::trace;

use crate::chunk::{Chunk, ChunkDigest};
use crate::manifest::{BackupManifest, ManifestEntry};

/// Decision for a single chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkPlan<'a> {
    /// Reference an object already stored by `ancestor`
    Reuse {
        ancestor: &'a BackupManifest,
        entry: &'a ManifestEntry,
    },
    /// Content is new and must be uploaded
    Changed,
}

impl ChunkPlan<'_> {
    pub fn is_changed(&self) -> bool {
        matches!(self, ChunkPlan::Changed)
    }
}

/// Compares chunks against a read-only ancestor chain
#[derive(Debug, Clone, Copy)]
pub struct DiffPlanner<'a> {
    /// Ancestor manifests, oldest first
    chain: &'a [BackupManifest],
}

impl<'a> DiffPlanner<'a> {
    /// Planner over `chain`, ordered oldest to newest
    pub fn new(chain: &'a [BackupManifest]) -> Self {
        Self { chain }
    }

    /// Planner for a full backup: every chunk is changed
    pub fn full() -> Self {
        Self { chain: &[] }
    }

    pub fn chain_len(&self) -> usize {
        self.chain.len()
    }

    /// Plan the chunk at `index` covering `offset..offset + length`
    ///
    /// An ancestor entry only matches when it covers the same byte range and
    /// carries the same digest. Entries without a recorded digest never
    /// match.
    pub fn plan(&self, index: u64, offset: u64, length: u64, digest: &ChunkDigest) -> ChunkPlan<'a> {
        for ancestor in self.chain.iter().rev() {
            let Some(entry) = ancestor.entry(index) else {
                continue;
            };
            if entry.info.offset == offset
                && entry.info.length == length
                && entry.info.sha256.as_ref() == Some(digest)
            {
                trace!(
                    index,
                    ancestor = %ancestor.backup_id,
                    object = %entry.object_name,
                    "chunk unchanged"
                );
                return ChunkPlan::Reuse { ancestor, entry };
            }
        }
        ChunkPlan::Changed
    }

    /// Plan a chunk produced by the chunker
    pub fn plan_chunk(&self, chunk: &Chunk) -> ChunkPlan<'a> {
        self.plan(chunk.index(), chunk.offset(), chunk.len(), chunk.digest())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compress::CompressionAlgorithm;
    use crate::manifest::ObjectInfo;

    const SIZE: u64 = 16;

    fn chunk(index: u64, fill: u8) -> Chunk {
        Chunk::new(index, index * SIZE, vec![fill; SIZE as usize])
    }

    /// Manifest for backup `id` whose chunk `i` holds `fills[i]`
    fn manifest(id: &str, fills: &[u8]) -> BackupManifest {
        let mut manifest = BackupManifest::new(id, "vol");
        for (i, &fill) in fills.iter().enumerate() {
            let c = chunk(i as u64, fill);
            manifest.push(
                &format!("{}-{:05}", id, i),
                ObjectInfo {
                    compression: CompressionAlgorithm::Zlib,
                    length: c.len(),
                    offset: c.offset(),
                    sha256: Some(*c.digest()),
                },
            );
        }
        manifest
    }

    fn reused_object<'a>(plan: ChunkPlan<'a>) -> Option<&'a str> {
        match plan {
            ChunkPlan::Reuse { entry, .. } => Some(entry.object_name.as_str()),
            ChunkPlan::Changed => None,
        }
    }

    #[test]
    fn test_full_backup_changes_everything() {
        let planner = DiffPlanner::full();
        assert!(planner.plan_chunk(&chunk(0, 1)).is_changed());
        assert_eq!(planner.chain_len(), 0);
    }

    #[test]
    fn test_unchanged_chunks_reuse_parent() {
        let chain = vec![manifest("p", &[1, 2, 3])];
        let planner = DiffPlanner::new(&chain);

        assert_eq!(reused_object(planner.plan_chunk(&chunk(0, 1))), Some("p-00000"));
        assert!(planner.plan_chunk(&chunk(1, 9)).is_changed());
        assert_eq!(reused_object(planner.plan_chunk(&chunk(2, 3))), Some("p-00002"));
    }

    #[test]
    fn test_search_spans_whole_chain() {
        // Chunk 0 reverted to the grandparent's content
        let chain = vec![manifest("g", &[1, 2]), manifest("p", &[5, 2])];
        let planner = DiffPlanner::new(&chain);

        assert_eq!(reused_object(planner.plan_chunk(&chunk(0, 1))), Some("g-00000"));
        // Nearest ancestor wins when several match
        assert_eq!(reused_object(planner.plan_chunk(&chunk(1, 2))), Some("p-00001"));
    }

    #[test]
    fn test_grown_volume_beyond_ancestor_range() {
        let chain = vec![manifest("p", &[1, 1])];
        let planner = DiffPlanner::new(&chain);

        assert!(planner.plan_chunk(&chunk(2, 1)).is_changed());
        assert!(planner.plan_chunk(&chunk(5, 1)).is_changed());
    }

    #[test]
    fn test_range_must_match() {
        let chain = vec![manifest("p", &[1])];
        let planner = DiffPlanner::new(&chain);
        let digest = ChunkDigest::from_data(&[1u8; SIZE as usize]);

        assert!(planner.plan(0, 0, SIZE, &digest) != ChunkPlan::Changed);
        assert!(planner.plan(0, 4, SIZE, &digest).is_changed());
        assert!(planner.plan(0, 0, SIZE - 1, &digest).is_changed());
    }

    #[test]
    fn test_entries_without_digest_never_match() {
        let mut parent = manifest("p", &[1]);
        parent.objects[0].info.sha256 = None;
        let chain = vec![parent];

        assert!(DiffPlanner::new(&chain).plan_chunk(&chunk(0, 1)).is_changed());
    }
}
