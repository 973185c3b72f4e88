//! Shared fixtures for driver tests

use std::sync::Arc;

use parking_lot::Mutex;
use rand::RngCore;
use vbk_core::{BackupManifest, BlockDigestMap};
use vbk_storage::MemoryBackend;

use crate::config::DriverConfig;
use crate::driver::BackupDriver;
use crate::progress::ProgressNotifier;
use crate::record::{BackupRecord, BackupStore, MemoryBackupStore};

pub(crate) fn random_volume(len: usize) -> Vec<u8> {
    let mut data = vec![0u8; len];
    rand::thread_rng().fill_bytes(&mut data);
    data
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ProgressEvent {
    Progress(u64),
    End(u64),
}

/// Notifier that remembers every call
#[derive(Default)]
pub(crate) struct RecordingNotifier {
    events: Mutex<Vec<ProgressEvent>>,
}

impl RecordingNotifier {
    pub(crate) fn events(&self) -> Vec<ProgressEvent> {
        self.events.lock().clone()
    }
}

impl ProgressNotifier for RecordingNotifier {
    fn notify(&self, _backup: &BackupRecord, bytes_so_far: u64) {
        self.events.lock().push(ProgressEvent::Progress(bytes_so_far));
    }

    fn notify_end(&self, _backup: &BackupRecord, total_bytes: u64) {
        self.events.lock().push(ProgressEvent::End(total_bytes));
    }
}

/// A driver over an in-memory backend and record store
pub(crate) struct Harness {
    pub backend: Arc<MemoryBackend>,
    pub store: Arc<MemoryBackupStore>,
    pub notifier: Arc<RecordingNotifier>,
    pub driver: BackupDriver,
}

impl Harness {
    /// Memory-backed config with the progress timer off
    pub(crate) fn config(object_size: u64, block_size: u64) -> DriverConfig {
        DriverConfig::memory()
            .with_sizes(object_size, block_size)
            .without_progress_timer()
    }

    pub(crate) async fn new(object_size: u64, block_size: u64) -> Self {
        Self::with_config(Self::config(object_size, block_size)).await
    }

    pub(crate) async fn with_config(config: DriverConfig) -> Self {
        let backend = Arc::new(MemoryBackend::new());
        let store = Arc::new(MemoryBackupStore::new());
        let notifier = Arc::new(RecordingNotifier::default());
        let driver =
            BackupDriver::new(config, backend.clone(), store.clone(), notifier.clone()).unwrap();
        Self {
            backend,
            store,
            notifier,
            driver,
        }
    }

    /// Another driver sharing this harness's backend and records
    pub(crate) fn driver_with(&self, config: DriverConfig) -> BackupDriver {
        BackupDriver::new(
            config,
            self.backend.clone(),
            self.store.clone(),
            self.notifier.clone(),
        )
        .unwrap()
    }

    /// Register a backup of volume `vol`
    pub(crate) async fn add_record(&self, id: &str, parent: Option<&str>) {
        let mut record = BackupRecord::new("vol", 0).with_id(id);
        if let Some(parent) = parent {
            record = record.with_parent(parent);
        }
        self.store.create(record).await.unwrap();
    }

    pub(crate) async fn record(&self, id: &str) -> BackupRecord {
        self.store.get_by_id(id).await.unwrap().unwrap()
    }

    /// Names of objects put into the default container
    pub(crate) fn puts(&self) -> Vec<String> {
        self.backend
            .put_log()
            .into_iter()
            .filter(|(container, _)| container == &self.driver.config().default_container)
            .map(|(_, name)| name)
            .collect()
    }

    pub(crate) async fn manifest(&self, id: &str) -> BackupManifest {
        let record = self.record(id).await;
        let datastore = self.driver.datastore(&self.driver.container_for(&record));
        self.driver.load_manifest(&datastore, &record).await.unwrap()
    }

    pub(crate) async fn block_digests(&self, id: &str) -> BlockDigestMap {
        let record = self.record(id).await;
        let datastore = self.driver.datastore(&self.driver.container_for(&record));
        let name = self.driver.namer(&record).block_digests_object();
        datastore.read_block_digests(&name).await.unwrap()
    }
}
