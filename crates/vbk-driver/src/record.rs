//! Backup records and their persistence
//!
//! Records are owned by an external store. The driver reads them and only
//! ever writes back the container and the status.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::sync::{Mutex, RwLock};
use tracing::info;

/// Lifecycle state of a backup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackupStatus {
    Creating,
    Available,
    Error,
    Deleting,
    Deleted,
}

/// A backup as tracked by the record store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupRecord {
    pub id: String,
    pub volume_id: String,
    /// Container the backup is stored in; the driver fills it in
    pub container: Option<String>,
    /// Backup this one is incremental to
    pub parent_id: Option<String>,
    /// Volume size in bytes
    pub size: u64,
    pub status: BackupStatus,
    pub service_metadata: Option<String>,
    pub display_name: Option<String>,
    pub display_description: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl BackupRecord {
    /// New full backup record with a generated id
    pub fn new(volume_id: &str, size: u64) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            volume_id: volume_id.to_string(),
            container: None,
            parent_id: None,
            size,
            status: BackupStatus::Creating,
            service_metadata: None,
            display_name: None,
            display_description: None,
            created_at: Utc::now(),
        }
    }

    /// Use a fixed id instead of a generated one
    pub fn with_id(mut self, id: &str) -> Self {
        self.id = id.to_string();
        self
    }

    /// Make this backup incremental to `parent_id`
    pub fn with_parent(mut self, parent_id: &str) -> Self {
        self.parent_id = Some(parent_id.to_string());
        self
    }

    /// Store the backup in `container` instead of the default
    pub fn with_container(mut self, container: &str) -> Self {
        self.container = Some(container.to_string());
        self
    }

    pub fn with_description(mut self, name: &str, description: &str) -> Self {
        self.display_name = Some(name.to_string());
        self.display_description = Some(description.to_string());
        self
    }
}

/// External store of backup records
#[async_trait]
pub trait BackupStore: Send + Sync {
    /// Look up a record, `None` if it does not exist
    async fn get_by_id(&self, id: &str) -> anyhow::Result<Option<BackupRecord>>;

    /// Insert or replace a record
    async fn create(&self, record: BackupRecord) -> anyhow::Result<()>;

    async fn update_container(&self, id: &str, container: &str) -> anyhow::Result<()>;

    async fn update_status(&self, id: &str, status: BackupStatus) -> anyhow::Result<()>;
}

/// In-memory record store
#[derive(Default)]
pub struct MemoryBackupStore {
    records: RwLock<HashMap<String, BackupRecord>>,
}

impl MemoryBackupStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BackupStore for MemoryBackupStore {
    async fn get_by_id(&self, id: &str) -> anyhow::Result<Option<BackupRecord>> {
        Ok(self.records.read().await.get(id).cloned())
    }

    async fn create(&self, record: BackupRecord) -> anyhow::Result<()> {
        self.records.write().await.insert(record.id.clone(), record);
        Ok(())
    }

    async fn update_container(&self, id: &str, container: &str) -> anyhow::Result<()> {
        let mut records = self.records.write().await;
        let record = records
            .get_mut(id)
            .ok_or_else(|| anyhow::anyhow!("backup {} not found", id))?;
        record.container = Some(container.to_string());
        Ok(())
    }

    async fn update_status(&self, id: &str, status: BackupStatus) -> anyhow::Result<()> {
        let mut records = self.records.write().await;
        let record = records
            .get_mut(id)
            .ok_or_else(|| anyhow::anyhow!("backup {} not found", id))?;
        record.status = status;
        Ok(())
    }
}

/// Data format for the records file
#[derive(Debug, Serialize, Deserialize)]
struct RecordsData {
    version: u32,
    backups: Vec<BackupRecord>,
}

impl Default for RecordsData {
    fn default() -> Self {
        Self {
            version: 1,
            backups: Vec::new(),
        }
    }
}

/// Record store kept in a single JSON file
///
/// Every update rewrites the whole file through a temp file and a rename.
pub struct JsonBackupStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonBackupStore {
    /// Open a store at `data_dir/backups.json`, creating the directory
    pub async fn open(data_dir: impl AsRef<Path>) -> anyhow::Result<Self> {
        let data_dir = data_dir.as_ref();
        fs::create_dir_all(data_dir).await?;

        info!("Backup records stored at {:?}", data_dir);
        Ok(Self {
            path: data_dir.join("backups.json"),
            lock: Mutex::new(()),
        })
    }

    async fn load(&self) -> anyhow::Result<RecordsData> {
        if !self.path.exists() {
            return Ok(RecordsData::default());
        }
        let content = fs::read_to_string(&self.path).await?;
        Ok(serde_json::from_str(&content)?)
    }

    async fn save(&self, data: &RecordsData) -> anyhow::Result<()> {
        let content = serde_json::to_string_pretty(data)?;

        // Write to temp file first, then rename (atomic)
        let temp_path = self.path.with_extension("json.tmp");
        fs::write(&temp_path, &content).await?;
        fs::rename(&temp_path, &self.path).await?;
        Ok(())
    }

    /// Apply `update` to the record `id` and persist the result
    async fn modify<F>(&self, id: &str, update: F) -> anyhow::Result<()>
    where
        F: FnOnce(&mut BackupRecord) + Send,
    {
        let _guard = self.lock.lock().await;
        let mut data = self.load().await?;
        let record = data
            .backups
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| anyhow::anyhow!("backup {} not found", id))?;
        update(record);
        self.save(&data).await
    }
}

#[async_trait]
impl BackupStore for JsonBackupStore {
    async fn get_by_id(&self, id: &str) -> anyhow::Result<Option<BackupRecord>> {
        let _guard = self.lock.lock().await;
        let data = self.load().await?;
        Ok(data.backups.into_iter().find(|r| r.id == id))
    }

    async fn create(&self, record: BackupRecord) -> anyhow::Result<()> {
        let _guard = self.lock.lock().await;
        let mut data = self.load().await?;
        data.backups.retain(|r| r.id != record.id);
        data.backups.push(record);
        self.save(&data).await
    }

    async fn update_container(&self, id: &str, container: &str) -> anyhow::Result<()> {
        let container = container.to_string();
        self.modify(id, move |record| record.container = Some(container))
            .await
    }

    async fn update_status(&self, id: &str, status: BackupStatus) -> anyhow::Result<()> {
        self.modify(id, move |record| record.status = status).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_memory_store_updates() {
        let store = MemoryBackupStore::new();
        store
            .create(BackupRecord::new("vol", 1024).with_id("b1"))
            .await
            .unwrap();

        store.update_container("b1", "bucket").await.unwrap();
        store
            .update_status("b1", BackupStatus::Available)
            .await
            .unwrap();

        let record = store.get_by_id("b1").await.unwrap().unwrap();
        assert_eq!(record.container.as_deref(), Some("bucket"));
        assert_eq!(record.status, BackupStatus::Available);
        assert!(store.get_by_id("missing").await.unwrap().is_none());
        assert!(store
            .update_status("missing", BackupStatus::Error)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_json_store_persists_across_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let store = JsonBackupStore::open(dir.path()).await.unwrap();
            store
                .create(
                    BackupRecord::new("vol", 4096)
                        .with_id("b2")
                        .with_parent("b1")
                        .with_description("nightly", "incremental"),
                )
                .await
                .unwrap();
            store.update_container("b2", "bucket").await.unwrap();
        }

        let store = JsonBackupStore::open(dir.path()).await.unwrap();
        let record = store.get_by_id("b2").await.unwrap().unwrap();
        assert_eq!(record.parent_id.as_deref(), Some("b1"));
        assert_eq!(record.container.as_deref(), Some("bucket"));
        assert_eq!(record.display_name.as_deref(), Some("nightly"));
        assert_eq!(record.status, BackupStatus::Creating);
        assert!(!dir.path().join("backups.json.tmp").exists());
    }

    #[test]
    fn test_status_serialization() {
        assert_eq!(
            serde_json::to_string(&BackupStatus::Available).unwrap(),
            "\"available\""
        );
    }
}
