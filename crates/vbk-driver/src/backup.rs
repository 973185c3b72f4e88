//! Backup orchestration
//!
//! A backup runs through these phases:
//!
//! 1. INIT - load the record, mark it `creating`, pick the container and
//!    load the ancestor chain
//! 2. ENSURE_CONTAINER - create the container if it does not exist
//! 3. STREAM_CHUNKS - chunk the volume; upload chunks that no ancestor
//!    already holds, reference the others
//! 4. WRITE_MANIFEST - store the block digest map, then the manifest
//!
//! A failure in phase 3 or 4 deletes whatever this run wrote before the
//! error is returned. The manifest is always the last object written, so a
//! backup without one never becomes visible.

use tokio::io::AsyncRead;
use tracing::{debug, error, info, instrument, warn};
use vbk_core::{
    BackupManifest, BlockDigestMap, ChunkPlan, DiffPlanner, FixedChunker, ObjectInfo, ObjectNamer,
};
use vbk_storage::Datastore;

use crate::driver::BackupDriver;
use crate::error::{BackupFailure, DriverError, DriverResult};
use crate::progress::ProgressTracker;
use crate::record::{BackupRecord, BackupStatus};

/// Counters for one backup run
#[derive(Debug, Clone, Default)]
struct BackupStats {
    /// Chunks uploaded by this run
    uploaded: u64,
    /// Chunks referenced from ancestors
    reused: u64,
    /// Volume bytes read
    logical_bytes: u64,
    /// Bytes written after compression
    stored_bytes: u64,
}

/// Map chunker errors: reads from the volume are volume errors
fn volume_error(err: vbk_core::Error) -> DriverError {
    match err {
        vbk_core::Error::Io(e) => DriverError::Volume(e),
        other => DriverError::Core(other),
    }
}

impl BackupDriver {
    /// Back up `volume` into the backup described by record `backup_id`
    ///
    /// The record's `parent_id` makes the backup incremental: chunks whose
    /// content matches an ancestor are referenced instead of uploaded. On
    /// success the record is `available` and names its container; on
    /// failure it is `error`. Only `creating` and `error` records are
    /// accepted, so a failed backup can be retried.
    #[instrument(skip(self, volume))]
    pub async fn backup<R>(&self, backup_id: &str, volume: &mut R) -> DriverResult<()>
    where
        R: AsyncRead + Unpin + Send,
    {
        let record = self.load_record(backup_id).await?;
        if !matches!(record.status, BackupStatus::Creating | BackupStatus::Error) {
            return Err(DriverError::Driver(format!(
                "Backup {} is {:?}, only creating or failed backups can run",
                backup_id, record.status
            )));
        }
        self.store
            .update_status(backup_id, BackupStatus::Creating)
            .await?;

        match self.run_backup(&record, volume).await {
            Ok((container, stats)) => {
                self.store.update_container(backup_id, &container).await?;
                self.store
                    .update_status(backup_id, BackupStatus::Available)
                    .await?;
                info!(
                    "Backup {} complete: {} chunks uploaded, {} reused, {} bytes read, {} bytes stored",
                    backup_id, stats.uploaded, stats.reused, stats.logical_bytes, stats.stored_bytes
                );
                Ok(())
            }
            Err(e) => {
                error!("Backup {} failed: {}", backup_id, e);
                if let Err(status_err) = self
                    .store
                    .update_status(backup_id, BackupStatus::Error)
                    .await
                {
                    warn!("Failed to mark backup {} as failed: {}", backup_id, status_err);
                }
                Err(e)
            }
        }
    }

    async fn run_backup<R>(
        &self,
        record: &BackupRecord,
        volume: &mut R,
    ) -> DriverResult<(String, BackupStats)>
    where
        R: AsyncRead + Unpin + Send,
    {
        let container = self.container_for(record);
        let datastore = self.datastore(&container);
        let namer = self.namer(record);
        let _in_flight = self.begin_backup(&container, &namer);

        let chain = self.load_chain(record, &datastore).await?;
        info!(
            "Backing up volume {} to {} ({} ancestors)",
            record.volume_id,
            container,
            chain.len()
        );

        datastore.ensure_container().await?;

        let mut written = Vec::new();
        match self
            .write_backup(record, &datastore, &namer, &chain, volume, &mut written)
            .await
        {
            Ok(stats) => Ok((container, stats)),
            Err(primary) => {
                let failure = self
                    .cleanup(record, &datastore, &namer, written, primary)
                    .await;
                Err(failure.into_surfaced())
            }
        }
    }

    /// STREAM_CHUNKS and WRITE_MANIFEST. Every object name is pushed to
    /// `written` before its put is attempted.
    async fn write_backup<R>(
        &self,
        record: &BackupRecord,
        datastore: &Datastore,
        namer: &ObjectNamer,
        chain: &[BackupManifest],
        volume: &mut R,
        written: &mut Vec<String>,
    ) -> DriverResult<BackupStats>
    where
        R: AsyncRead + Unpin + Send,
    {
        let object_size = usize::try_from(self.config.object_size)
            .map_err(|_| DriverError::Config("object_size too large".into()))?;
        let compression = self.config.compression;
        let planner = DiffPlanner::new(chain);
        let mut chunker = FixedChunker::new(volume, object_size)?;

        let mut manifest = BackupManifest::new(&record.id, &record.volume_id).with_description(
            record.display_name.as_deref(),
            record.display_description.as_deref(),
        );
        let mut block_map = BlockDigestMap::for_manifest(&manifest, self.config.block_size);

        let timer = self
            .config
            .enable_progress_timer
            .then(|| self.config.progress_timer_interval());
        let mut progress = ProgressTracker::start(
            self.notifier.clone(),
            record.clone(),
            self.config.object_number_per_notification,
            timer,
        );
        let mut stats = BackupStats::default();

        while let Some(chunk) = chunker.next_chunk().await.map_err(volume_error)? {
            block_map.extend_from_chunk(chunk.data());
            progress.add_bytes(chunk.len());

            match planner.plan_chunk(&chunk) {
                ChunkPlan::Reuse { ancestor, entry } => {
                    debug!(
                        index = chunk.index(),
                        ancestor = %ancestor.backup_id,
                        object = %entry.object_name,
                        "Reusing chunk"
                    );
                    manifest.push(&entry.object_name, entry.info.clone());
                    stats.reused += 1;
                }
                ChunkPlan::Changed => {
                    let name = namer.chunk_object(chunk.index());
                    written.push(name.clone());
                    let stored = datastore
                        .store_chunk(&name, chunk.data(), compression)
                        .await?;
                    debug!(index = chunk.index(), object = %name, stored, "Uploaded chunk");

                    manifest.push(
                        &name,
                        ObjectInfo {
                            compression,
                            length: chunk.len(),
                            offset: chunk.offset(),
                            sha256: Some(*chunk.digest()),
                        },
                    );
                    stats.uploaded += 1;
                    stats.stored_bytes += stored;
                    progress.object_uploaded();
                }
            }
        }
        stats.logical_bytes = chunker.bytes_read();

        let digests_name = namer.block_digests_object();
        written.push(digests_name.clone());
        datastore
            .store_block_digests(&digests_name, &block_map)
            .await
            .map_err(|e| {
                DriverError::Driver(format!("Failed to write block digests {}: {}", digests_name, e))
            })?;

        let manifest_name = namer.manifest_object();
        written.push(manifest_name.clone());
        datastore
            .store_manifest(&manifest_name, &manifest)
            .await
            .map_err(|e| {
                DriverError::Driver(format!("Failed to write manifest {}: {}", manifest_name, e))
            })?;

        progress.finish();
        Ok(stats)
    }

    /// Delete the objects a failed run wrote
    ///
    /// Ancestor objects are never in `written`, so they are never touched.
    /// The manifest and block digest names are always included since their
    /// puts may have landed before reporting failure. Every object is
    /// attempted; the first delete error is kept.
    #[instrument(skip(self, record, datastore, namer, written, primary), fields(backup = %record.id))]
    async fn cleanup(
        &self,
        record: &BackupRecord,
        datastore: &Datastore,
        namer: &ObjectNamer,
        mut written: Vec<String>,
        primary: DriverError,
    ) -> BackupFailure {
        for name in [namer.block_digests_object(), namer.manifest_object()] {
            if !written.contains(&name) {
                written.push(name);
            }
        }
        warn!(
            "Cleaning up {} objects of failed backup {}",
            written.len(),
            record.id
        );

        let mut cleanup_error = None;
        for name in &written {
            if let Err(e) = datastore.delete_object(name).await {
                warn!("Failed to delete {}: {}", name, e);
                if cleanup_error.is_none() {
                    cleanup_error = Some(DriverError::Storage(e));
                }
            }
        }

        BackupFailure {
            backup_id: record.id.clone(),
            primary_error: primary,
            cleanup_error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::BackupStore;
    use crate::testing::{random_volume, Harness, ProgressEvent};
    use std::io::Cursor;
    use vbk_core::{chunk_count, CompressionAlgorithm};
    use vbk_storage::{ObjectStore, StorageError};

    const KIB: usize = 1024;

    #[tokio::test]
    async fn test_full_backup_writes_chunks_then_manifest() {
        let h = Harness::new(8 * KIB as u64, KIB as u64).await;
        let data = random_volume(20 * KIB);
        h.add_record("b1", None).await;

        h.driver.backup("b1", &mut Cursor::new(data.clone())).await.unwrap();

        let puts = h.puts();
        let namer = ObjectNamer::new("nova", "b1", "vol");
        assert_eq!(
            puts,
            vec![
                namer.chunk_object(0),
                namer.chunk_object(1),
                namer.chunk_object(2),
                namer.block_digests_object(),
                namer.manifest_object(),
            ]
        );

        let record = h.record("b1").await;
        assert_eq!(record.status, BackupStatus::Available);
        assert_eq!(record.container.as_deref(), Some("volumebackups"));

        let manifest = h.manifest("b1").await;
        assert_eq!(manifest.chunk_count() as u64, chunk_count(data.len() as u64, 8 * KIB as u64));
        assert_eq!(manifest.logical_size(), data.len() as u64);
        let digests = h.block_digests("b1").await;
        assert_eq!(digests.block_count(), 20);
    }

    #[tokio::test]
    async fn test_unchanged_incremental_uploads_no_chunks() {
        let h = Harness::new(8 * KIB as u64, KIB as u64).await;
        let data = random_volume(64 * KIB);
        h.add_record("full", None).await;
        h.driver.backup("full", &mut Cursor::new(data.clone())).await.unwrap();

        h.add_record("incr", Some("full")).await;
        h.backend.clear_put_log();
        h.driver.backup("incr", &mut Cursor::new(data.clone())).await.unwrap();

        // Only the block digests and the manifest
        assert_eq!(h.puts().len(), 2);
        let full = h.manifest("full").await;
        let incr = h.manifest("incr").await;
        assert_eq!(full.objects, incr.objects);
    }

    #[tokio::test]
    async fn test_changed_blocks_reupload_their_objects() {
        // 64 KiB volume, 8 KiB objects, 1 KiB blocks; blocks 16 and 32 change
        let h = Harness::new(8 * KIB as u64, KIB as u64).await;
        let mut data = random_volume(64 * KIB);
        h.add_record("full", None).await;
        h.driver.backup("full", &mut Cursor::new(data.clone())).await.unwrap();

        for block in [16, 32] {
            let start = block * KIB;
            for byte in &mut data[start..start + KIB] {
                *byte = byte.wrapping_add(1);
            }
        }

        h.add_record("incr", Some("full")).await;
        h.backend.clear_put_log();
        h.driver.backup("incr", &mut Cursor::new(data.clone())).await.unwrap();

        let incr_namer = ObjectNamer::new("nova", "incr", "vol");
        let chunk_puts: Vec<String> = h
            .puts()
            .into_iter()
            .filter(|name| name != &incr_namer.manifest_object())
            .filter(|name| name != &incr_namer.block_digests_object())
            .collect();
        assert_eq!(
            chunk_puts,
            vec![incr_namer.chunk_object(2), incr_namer.chunk_object(4)]
        );

        let manifest = h.manifest("incr").await;
        let full_namer = ObjectNamer::new("nova", "full", "vol");
        let reused = manifest
            .object_names()
            .filter(|name| name.starts_with(full_namer.prefix()))
            .count();
        assert_eq!(reused, 6);

        assert_eq!(
            h.driver.changed_blocks("full", "incr").await.unwrap(),
            vec![16, 32]
        );
    }

    #[tokio::test]
    async fn test_multi_generation_chain_dedup() {
        let h = Harness::new(4 * KIB as u64, KIB as u64).await;
        let mut data = random_volume(16 * KIB);
        h.add_record("g0", None).await;
        h.driver.backup("g0", &mut Cursor::new(data.clone())).await.unwrap();

        // Generation 1 changes chunk 1
        data[4 * KIB] ^= 0xff;
        h.add_record("g1", Some("g0")).await;
        h.driver.backup("g1", &mut Cursor::new(data.clone())).await.unwrap();

        // Generation 2 changes chunk 3; chunk 0 still comes from g0
        data[12 * KIB] ^= 0xff;
        h.add_record("g2", Some("g1")).await;
        h.backend.clear_put_log();
        h.driver.backup("g2", &mut Cursor::new(data.clone())).await.unwrap();

        let g2 = h.manifest("g2").await;
        let names: Vec<&str> = g2.object_names().collect();
        assert_eq!(
            names,
            vec![
                ObjectNamer::new("nova", "g0", "vol").chunk_object(0),
                ObjectNamer::new("nova", "g1", "vol").chunk_object(1),
                ObjectNamer::new("nova", "g0", "vol").chunk_object(2),
                ObjectNamer::new("nova", "g2", "vol").chunk_object(3),
            ]
        );
        assert_eq!(h.puts().len(), 3);
    }

    #[tokio::test]
    async fn test_shrunk_then_regrown_volume() {
        let h = Harness::new(4 * KIB as u64, KIB as u64).await;
        let data = random_volume(16 * KIB);
        h.add_record("g0", None).await;
        h.driver.backup("g0", &mut Cursor::new(data.clone())).await.unwrap();
        let g0 = ObjectNamer::new("nova", "g0", "vol");

        // Shrink to 10 KiB: the short tail chunk is new, indices 3+ vanish
        let shrunk = data[..10 * KIB].to_vec();
        h.add_record("g1", Some("g0")).await;
        h.backend.clear_put_log();
        h.driver.backup("g1", &mut Cursor::new(shrunk.clone())).await.unwrap();

        let g1 = ObjectNamer::new("nova", "g1", "vol");
        assert_eq!(
            h.puts(),
            vec![
                g1.chunk_object(2),
                g1.block_digests_object(),
                g1.manifest_object(),
            ]
        );
        let manifest = h.manifest("g1").await;
        let names: Vec<&str> = manifest.object_names().collect();
        assert_eq!(
            names,
            vec![
                g0.chunk_object(0),
                g0.chunk_object(1),
                g1.chunk_object(2),
            ]
        );
        assert_eq!(manifest.objects[2].info.length, 2 * KIB as u64);
        assert_eq!(manifest.logical_size(), 10 * KIB as u64);

        let mut dest = Cursor::new(Vec::new());
        h.driver.restore("g1", &mut dest).await.unwrap();
        assert_eq!(dest.into_inner(), shrunk);

        // Growing back finds the full-length chunks further up the chain
        h.add_record("g2", Some("g1")).await;
        h.backend.clear_put_log();
        h.driver.backup("g2", &mut Cursor::new(data.clone())).await.unwrap();

        let g2 = ObjectNamer::new("nova", "g2", "vol");
        assert_eq!(
            h.puts(),
            vec![g2.block_digests_object(), g2.manifest_object()]
        );
        let full = h.manifest("g0").await;
        assert_eq!(h.manifest("g2").await.objects, full.objects);

        let mut dest = Cursor::new(Vec::new());
        h.driver.restore("g2", &mut dest).await.unwrap();
        assert_eq!(dest.into_inner(), data);
    }

    #[tokio::test]
    async fn test_chunker_is_deterministic() {
        let h = Harness::new(8 * KIB as u64, KIB as u64).await;
        let data = random_volume(30 * KIB);
        for id in ["a", "b"] {
            h.add_record(id, None).await;
            h.driver.backup(id, &mut Cursor::new(data.clone())).await.unwrap();
        }

        let a = h.manifest("a").await;
        let b = h.manifest("b").await;
        assert_eq!(a.chunk_count(), 4);
        for (x, y) in a.objects.iter().zip(&b.objects) {
            assert_eq!(x.info, y.info);
        }
    }

    #[tokio::test]
    async fn test_custom_container_is_recorded() {
        let h = Harness::new(8 * KIB as u64, KIB as u64).await;
        h.store
            .create(
                BackupRecord::new("vol", 0)
                    .with_id("b1")
                    .with_container("custom"),
            )
            .await
            .unwrap();

        h.driver
            .backup("b1", &mut Cursor::new(random_volume(KIB)))
            .await
            .unwrap();

        assert_eq!(h.record("b1").await.container.as_deref(), Some("custom"));
        assert!(h.backend.contains(
            "custom",
            &ObjectNamer::new("nova", "b1", "vol").manifest_object()
        ));
    }

    #[tokio::test]
    async fn test_chain_stops_at_other_container() {
        let h = Harness::new(8 * KIB as u64, KIB as u64).await;
        let data = random_volume(16 * KIB);
        h.store
            .create(
                BackupRecord::new("vol", 0)
                    .with_id("elsewhere")
                    .with_container("other"),
            )
            .await
            .unwrap();
        h.driver.backup("elsewhere", &mut Cursor::new(data.clone())).await.unwrap();

        h.add_record("incr", Some("elsewhere")).await;
        h.backend.clear_put_log();
        h.driver.backup("incr", &mut Cursor::new(data)).await.unwrap();

        // Nothing can be shared across containers: full upload
        assert_eq!(h.puts().len(), 4);
    }

    #[tokio::test]
    async fn test_missing_parent_manifest_fails() {
        let h = Harness::new(8 * KIB as u64, KIB as u64).await;
        h.add_record("full", None).await;
        h.driver
            .backup("full", &mut Cursor::new(random_volume(8 * KIB)))
            .await
            .unwrap();
        h.backend
            .delete_object(
                "volumebackups",
                &ObjectNamer::new("nova", "full", "vol").manifest_object(),
            )
            .await
            .unwrap();

        h.add_record("incr", Some("full")).await;
        let err = h
            .driver
            .backup("incr", &mut Cursor::new(random_volume(8 * KIB)))
            .await
            .unwrap_err();
        assert!(matches!(err, DriverError::Manifest(_)));
        assert_eq!(h.record("incr").await.status, BackupStatus::Error);
    }

    #[tokio::test]
    async fn test_chunk_upload_failure_cleans_up() {
        let h = Harness::new(8 * KIB as u64, KIB as u64).await;
        h.add_record("b1", None).await;
        h.backend.fail_puts_containing("-00002");

        let err = h
            .driver
            .backup("b1", &mut Cursor::new(random_volume(32 * KIB)))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DriverError::Storage(StorageError::ObjectWriteFailure { .. })
        ));
        assert_eq!(h.backend.object_count("volumebackups"), 0);
        assert_eq!(h.record("b1").await.status, BackupStatus::Error);
    }

    #[tokio::test]
    async fn test_manifest_failure_is_driver_error_and_spares_ancestors() {
        let h = Harness::new(8 * KIB as u64, KIB as u64).await;
        let data = random_volume(16 * KIB);
        h.add_record("full", None).await;
        h.driver.backup("full", &mut Cursor::new(data.clone())).await.unwrap();
        let before = h.backend.object_count("volumebackups");

        let mut changed = data.clone();
        changed[0] ^= 1;
        h.add_record("incr", Some("full")).await;
        h.backend.fail_puts_containing("incr_metadata");

        let err = h
            .driver
            .backup("incr", &mut Cursor::new(changed))
            .await
            .unwrap_err();
        assert!(matches!(err, DriverError::Driver(_)));
        assert!(err.cleanup_error().is_none());
        assert_eq!(h.backend.object_count("volumebackups"), before);
    }

    #[tokio::test]
    async fn test_cleanup_failure_supersedes_manifest_failure() {
        let h = Harness::new(8 * KIB as u64, KIB as u64).await;
        h.add_record("b1", None).await;
        h.backend.fail_puts_containing("_metadata");
        h.backend.fail_deletes(true);

        let err = h
            .driver
            .backup("b1", &mut Cursor::new(random_volume(16 * KIB)))
            .await
            .unwrap_err();
        match err {
            DriverError::CleanupFailed {
                cleanup, original, ..
            } => {
                assert!(matches!(
                    *cleanup,
                    DriverError::Storage(StorageError::ObjectDeleteFailure { .. })
                ));
                assert!(matches!(*original, DriverError::Driver(_)));
            }
            other => panic!("expected cleanup failure, got {other}"),
        }
        assert_eq!(h.record("b1").await.status, BackupStatus::Error);
    }

    #[tokio::test]
    async fn test_connection_failure() {
        let h = Harness::new(8 * KIB as u64, KIB as u64).await;
        h.add_record("b1", None).await;
        h.backend.set_offline(true);

        let err = h
            .driver
            .backup("b1", &mut Cursor::new(random_volume(KIB)))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DriverError::Storage(StorageError::ConnectionFailure(_))
        ));
    }

    #[tokio::test]
    async fn test_container_creation_race_is_tolerated() {
        let h = Harness::new(8 * KIB as u64, KIB as u64).await;
        h.add_record("b1", None).await;
        h.backend.fail_container_creation(true);

        let err = h
            .driver
            .backup("b1", &mut Cursor::new(random_volume(KIB)))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DriverError::Storage(StorageError::ContainerError { .. })
        ));

        h.backend.insert_container("volumebackups");
        h.add_record("b2", None).await;
        h.driver
            .backup("b2", &mut Cursor::new(random_volume(KIB)))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_completed_backup_is_not_rewritten() {
        let h = Harness::new(8 * KIB as u64, KIB as u64).await;
        h.add_record("b1", None).await;
        h.driver
            .backup("b1", &mut Cursor::new(random_volume(16 * KIB)))
            .await
            .unwrap();
        let before = h.manifest("b1").await;
        h.backend.clear_put_log();

        let err = h
            .driver
            .backup("b1", &mut Cursor::new(random_volume(16 * KIB)))
            .await
            .unwrap_err();
        assert!(matches!(err, DriverError::Driver(_)));
        assert!(h.puts().is_empty());
        assert_eq!(h.manifest("b1").await, before);
        assert_eq!(h.record("b1").await.status, BackupStatus::Available);
    }

    #[tokio::test]
    async fn test_failed_backup_can_be_retried() {
        let h = Harness::new(8 * KIB as u64, KIB as u64).await;
        let data = random_volume(16 * KIB);
        h.add_record("b1", None).await;
        h.backend.fail_puts_containing("-00001");
        h.driver
            .backup("b1", &mut Cursor::new(data.clone()))
            .await
            .unwrap_err();
        assert_eq!(h.record("b1").await.status, BackupStatus::Error);

        h.backend.clear_faults();
        h.driver.backup("b1", &mut Cursor::new(data.clone())).await.unwrap();
        assert_eq!(h.record("b1").await.status, BackupStatus::Available);

        let mut dest = Cursor::new(Vec::new());
        h.driver.restore("b1", &mut dest).await.unwrap();
        assert_eq!(dest.into_inner(), data);
    }

    #[tokio::test]
    async fn test_unknown_record() {
        let h = Harness::new(8 * KIB as u64, KIB as u64).await;
        let err = h
            .driver
            .backup("nope", &mut Cursor::new(Vec::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, DriverError::RecordNotFound(_)));
    }

    #[tokio::test]
    async fn test_progress_every_object() {
        let h = Harness::with_config(
            Harness::config(8 * KIB as u64, KIB as u64).with_progress(1, None),
        )
        .await;
        h.add_record("b1", None).await;
        h.driver
            .backup("b1", &mut Cursor::new(random_volume(24 * KIB)))
            .await
            .unwrap();

        let events = h.notifier.events();
        assert_eq!(
            events,
            vec![
                ProgressEvent::Progress(8 * KIB as u64),
                ProgressEvent::Progress(16 * KIB as u64),
                ProgressEvent::Progress(24 * KIB as u64),
                ProgressEvent::End(24 * KIB as u64),
            ]
        );
    }

    #[tokio::test]
    async fn test_progress_only_at_completion() {
        let h = Harness::with_config(
            Harness::config(8 * KIB as u64, KIB as u64).with_progress(10, None),
        )
        .await;
        h.add_record("b1", None).await;
        h.driver
            .backup("b1", &mut Cursor::new(random_volume(24 * KIB)))
            .await
            .unwrap();

        assert_eq!(
            h.notifier.events(),
            vec![ProgressEvent::End(24 * KIB as u64)]
        );
    }

    #[tokio::test]
    async fn test_progress_timer_fires_when_armed() {
        let h = Harness::with_config(
            Harness::config(8 * KIB as u64, KIB as u64)
                .with_progress(10, Some(std::time::Duration::from_secs(3600))),
        )
        .await;
        h.add_record("b1", None).await;
        h.driver
            .backup("b1", &mut Cursor::new(random_volume(24 * KIB)))
            .await
            .unwrap();

        assert_eq!(
            h.notifier.events(),
            vec![
                ProgressEvent::Progress(0),
                ProgressEvent::End(24 * KIB as u64),
            ]
        );
    }

    #[tokio::test]
    async fn test_reused_chunks_keep_recorded_compression() {
        let h = Harness::with_config(
            Harness::config(8 * KIB as u64, KIB as u64).with_compression(CompressionAlgorithm::Bz2),
        )
        .await;
        let data = random_volume(16 * KIB);
        h.add_record("full", None).await;
        h.driver.backup("full", &mut Cursor::new(data.clone())).await.unwrap();

        let config = Harness::config(8 * KIB as u64, KIB as u64)
            .with_compression(CompressionAlgorithm::None);
        let driver = h.driver_with(config);
        let mut changed = data.clone();
        changed[9 * KIB] ^= 1;
        h.add_record("incr", Some("full")).await;
        driver.backup("incr", &mut Cursor::new(changed)).await.unwrap();

        let manifest = h.manifest("incr").await;
        assert_eq!(manifest.objects[0].info.compression, CompressionAlgorithm::Bz2);
        assert_eq!(manifest.objects[1].info.compression, CompressionAlgorithm::None);
    }
}
