//! Backup driver
//!
//! Ties together the record store, the object store and the progress
//! notifier. Backup, restore and delete live in their own modules; this one
//! holds the pieces they share: record lookup, container resolution and
//! loading of the ancestor chain.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, instrument, warn};
use vbk_core::{BackupManifest, ObjectNamer};
use vbk_storage::{Datastore, GarbageCollector, GcOptions, GcResult, ObjectStore};

use crate::config::DriverConfig;
use crate::error::{DriverError, DriverResult};
use crate::progress::ProgressNotifier;
use crate::record::{BackupRecord, BackupStatus, BackupStore};

/// Chunked, deduplicating volume backup driver
pub struct BackupDriver {
    pub(crate) config: DriverConfig,
    pub(crate) backend: Arc<dyn ObjectStore>,
    pub(crate) store: Arc<dyn BackupStore>,
    pub(crate) notifier: Arc<dyn ProgressNotifier>,
    /// (container, object prefix) of every backup currently running
    in_flight: Mutex<HashSet<(String, String)>>,
}

/// Marks a backup as running until dropped
pub(crate) struct InFlight<'a> {
    driver: &'a BackupDriver,
    key: (String, String),
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.driver.in_flight.lock().remove(&self.key);
    }
}

impl BackupDriver {
    /// Create a driver over an existing backend
    pub fn new(
        config: DriverConfig,
        backend: Arc<dyn ObjectStore>,
        store: Arc<dyn BackupStore>,
        notifier: Arc<dyn ProgressNotifier>,
    ) -> DriverResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            backend,
            store,
            notifier,
            in_flight: Mutex::new(HashSet::new()),
        })
    }

    /// Create a driver, building the backend named by the configuration
    pub async fn from_config(
        config: DriverConfig,
        store: Arc<dyn BackupStore>,
        notifier: Arc<dyn ProgressNotifier>,
    ) -> DriverResult<Self> {
        config.validate()?;
        let backend = config.storage.build().await?;
        info!(
            "Backup driver using {} storage, default container {}",
            backend.name(),
            config.default_container
        );
        Self::new(config, backend, store, notifier)
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    pub fn backend(&self) -> Arc<dyn ObjectStore> {
        self.backend.clone()
    }

    /// Fetch a backup record or fail with `RecordNotFound`
    pub(crate) async fn load_record(&self, backup_id: &str) -> DriverResult<BackupRecord> {
        self.store
            .get_by_id(backup_id)
            .await?
            .ok_or_else(|| DriverError::RecordNotFound(backup_id.to_string()))
    }

    /// Container holding a backup: the record's own, else the default
    pub(crate) fn container_for(&self, record: &BackupRecord) -> String {
        match record.container.as_deref() {
            Some(container) if !container.is_empty() => container.to_string(),
            _ => self.config.default_container.clone(),
        }
    }

    pub(crate) fn namer(&self, record: &BackupRecord) -> ObjectNamer {
        ObjectNamer::new(&self.config.availability_zone, &record.id, &record.volume_id)
    }

    pub(crate) fn datastore(&self, container: &str) -> Datastore {
        Datastore::new(self.backend.clone(), container)
    }

    /// Keep garbage collection away from a running backup's chunks
    pub(crate) fn begin_backup(&self, container: &str, namer: &ObjectNamer) -> InFlight<'_> {
        let key = (container.to_string(), namer.prefix().to_string());
        self.in_flight.lock().insert(key.clone());
        InFlight { driver: self, key }
    }

    /// Read and version-check the manifest of `record`
    ///
    /// A manifest that does not exist is reported as a manifest error.
    pub(crate) async fn load_manifest(
        &self,
        datastore: &Datastore,
        record: &BackupRecord,
    ) -> DriverResult<BackupManifest> {
        let name = self.namer(record).manifest_object();
        let manifest = match datastore.read_manifest(&name).await {
            Ok(manifest) => manifest,
            Err(e) if e.is_not_found() => {
                return Err(DriverError::Manifest(format!(
                    "Manifest {} of backup {} not found",
                    name, record.id
                )))
            }
            Err(vbk_storage::StorageError::Core(e)) => {
                return Err(DriverError::Manifest(format!("{}: {}", name, e)))
            }
            Err(e) => return Err(e.into()),
        };
        manifest
            .check_version()
            .map_err(|e| DriverError::Manifest(e.to_string()))?;
        Ok(manifest)
    }

    /// Load the manifests of `record`'s ancestors, oldest first
    ///
    /// The walk follows `parent_id` links and stops early at an ancestor
    /// that is not available, lives in another container or belongs to a
    /// different volume, and at a cycle.
    #[instrument(skip(self, record, datastore), fields(backup = %record.id))]
    pub(crate) async fn load_chain(
        &self,
        record: &BackupRecord,
        datastore: &Datastore,
    ) -> DriverResult<Vec<BackupManifest>> {
        let mut chain = Vec::new();
        let mut seen = HashSet::from([record.id.clone()]);
        let mut next = record.parent_id.clone();

        while let Some(parent_id) = next.take() {
            if !seen.insert(parent_id.clone()) {
                warn!("Backup chain loops back to {}, truncating", parent_id);
                break;
            }
            let parent = self.load_record(&parent_id).await?;
            if parent.status != BackupStatus::Available {
                warn!(
                    "Ancestor {} is {:?}, truncating chain",
                    parent.id, parent.status
                );
                break;
            }
            if self.container_for(&parent) != datastore.container() {
                warn!(
                    "Ancestor {} is stored in another container, truncating chain",
                    parent.id
                );
                break;
            }
            if parent.volume_id != record.volume_id {
                warn!(
                    "Ancestor {} belongs to volume {}, truncating chain",
                    parent.id, parent.volume_id
                );
                break;
            }

            let manifest = self.load_manifest(datastore, &parent).await?;
            debug!(
                "Loaded ancestor {} with {} chunks",
                parent.id,
                manifest.chunk_count()
            );
            chain.push(manifest);
            next = parent.parent_id;
        }

        chain.reverse();
        Ok(chain)
    }

    /// Remove chunk objects no manifest in `container` references
    ///
    /// Chunks of backups this driver is still running are kept. Backups
    /// run by other processes are not visible here; callers sharing a
    /// container across processes name them in `protected_prefixes`.
    #[instrument(skip(self))]
    pub async fn collect_garbage(
        &self,
        container: Option<&str>,
        mut options: GcOptions,
    ) -> DriverResult<GcResult> {
        let container = container.unwrap_or(&self.config.default_container);
        options.protected_prefixes.extend(
            self.in_flight
                .lock()
                .iter()
                .filter(|(c, _)| c == container)
                .map(|(_, prefix)| prefix.clone()),
        );
        let datastore = self.datastore(container);
        let result = GarbageCollector::new(&datastore).run(options).await?;
        info!(
            "GC of {} complete: manifests={}, scanned={}, orphaned={}, deleted={}",
            container,
            result.manifests_scanned,
            result.chunks_scanned,
            result.chunks_orphaned,
            result.chunks_deleted
        );
        Ok(result)
    }

    /// Indices of the blocks that differ between two backups
    ///
    /// Compares the stored block digest maps; no chunk data is read.
    #[instrument(skip(self))]
    pub async fn changed_blocks(&self, backup_id: &str, other_id: &str) -> DriverResult<Vec<usize>> {
        let mut maps = Vec::with_capacity(2);
        for id in [backup_id, other_id] {
            let record = self.load_record(id).await?;
            let datastore = self.datastore(&self.container_for(&record));
            let name = self.namer(&record).block_digests_object();
            let map = datastore.read_block_digests(&name).await.map_err(|e| {
                if e.is_not_found() {
                    DriverError::Manifest(format!("Block digests of backup {} not found", id))
                } else {
                    e.into()
                }
            })?;
            maps.push(map);
        }

        if maps[0].chunk_size != maps[1].chunk_size {
            return Err(DriverError::Driver(format!(
                "Backups {} and {} use different block sizes ({} and {})",
                backup_id, other_id, maps[0].chunk_size, maps[1].chunk_size
            )));
        }
        Ok(maps[0].changed_blocks(&maps[1]))
    }
}
