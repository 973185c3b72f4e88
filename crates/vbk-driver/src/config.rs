//! Driver configuration

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use vbk_core::{CompressionAlgorithm, BLOCK_SIZE_DEFAULT, OBJECT_SIZE_DEFAULT};
use vbk_storage::{LocalBackend, MemoryBackend, ObjectStore, S3Backend, S3Config};

use crate::error::{DriverError, DriverResult};

/// Backup driver configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// Container used when a backup record names none
    pub default_container: String,
    /// Availability zone embedded in object names
    pub availability_zone: String,
    /// Size of each chunk object in bytes
    pub object_size: u64,
    /// Granularity of the block digest map in bytes
    pub block_size: u64,
    /// Compression applied to newly uploaded chunks
    pub compression: CompressionAlgorithm,
    /// Notify progress after this many uploaded objects
    pub object_number_per_notification: u64,
    /// Arm a periodic progress timer during backups
    pub enable_progress_timer: bool,
    /// Seconds between timer notifications
    pub progress_timer_interval_secs: u64,
    /// Storage backend configuration
    pub storage: StorageConfig,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            default_container: "volumebackups".to_string(),
            availability_zone: "nova".to_string(),
            object_size: OBJECT_SIZE_DEFAULT as u64,
            block_size: BLOCK_SIZE_DEFAULT as u64,
            compression: CompressionAlgorithm::Zlib,
            object_number_per_notification: 10,
            enable_progress_timer: true,
            progress_timer_interval_secs: 120,
            storage: StorageConfig::default(),
        }
    }
}

impl DriverConfig {
    /// Create config with local storage
    pub fn local(path: &str) -> Self {
        Self {
            storage: StorageConfig::Local {
                path: path.to_string(),
            },
            ..Default::default()
        }
    }

    /// Create config with S3 storage
    pub fn s3(region: &str) -> Self {
        Self {
            storage: StorageConfig::S3 {
                region: Some(region.to_string()),
                endpoint: None,
                prefix: None,
            },
            ..Default::default()
        }
    }

    /// Create config with in-memory storage
    pub fn memory() -> Self {
        Self {
            storage: StorageConfig::Memory,
            ..Default::default()
        }
    }

    /// Set the default container
    pub fn with_container(mut self, container: &str) -> Self {
        self.default_container = container.to_string();
        self
    }

    /// Set the availability zone
    pub fn with_zone(mut self, zone: &str) -> Self {
        self.availability_zone = zone.to_string();
        self
    }

    /// Set object and block sizes
    pub fn with_sizes(mut self, object_size: u64, block_size: u64) -> Self {
        self.object_size = object_size;
        self.block_size = block_size;
        self
    }

    /// Set compression algorithm
    pub fn with_compression(mut self, compression: CompressionAlgorithm) -> Self {
        self.compression = compression;
        self
    }

    /// Set the progress policy
    pub fn with_progress(mut self, per_objects: u64, timer: Option<Duration>) -> Self {
        self.object_number_per_notification = per_objects;
        self.enable_progress_timer = timer.is_some();
        if let Some(interval) = timer {
            self.progress_timer_interval_secs = interval.as_secs();
        }
        self
    }

    /// Disable the periodic progress timer
    pub fn without_progress_timer(mut self) -> Self {
        self.enable_progress_timer = false;
        self
    }

    pub fn progress_timer_interval(&self) -> Duration {
        Duration::from_secs(self.progress_timer_interval_secs)
    }

    /// Check size constraints
    pub fn validate(&self) -> DriverResult<()> {
        if self.object_size == 0 || self.block_size == 0 {
            return Err(DriverError::Config(
                "object_size and block_size must be non-zero".into(),
            ));
        }
        if self.object_size % self.block_size != 0 {
            return Err(DriverError::Config(format!(
                "object_size {} is not a multiple of block_size {}",
                self.object_size, self.block_size
            )));
        }
        if usize::try_from(self.object_size).is_err() {
            return Err(DriverError::Config(format!(
                "object_size {} does not fit in memory",
                self.object_size
            )));
        }
        if self.enable_progress_timer && self.progress_timer_interval_secs == 0 {
            return Err(DriverError::Config(
                "progress_timer_interval_secs must be non-zero".into(),
            ));
        }
        if self.default_container.is_empty() {
            return Err(DriverError::Config("default_container is empty".into()));
        }
        Ok(())
    }
}

/// Storage backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum StorageConfig {
    /// Local filesystem
    #[serde(rename = "local")]
    Local { path: String },
    /// S3-compatible storage; containers are buckets
    #[serde(rename = "s3")]
    S3 {
        region: Option<String>,
        endpoint: Option<String>,
        prefix: Option<String>,
    },
    /// Process memory, lost on exit
    #[serde(rename = "memory")]
    Memory,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::Local {
            path: "/var/lib/vbk".to_string(),
        }
    }
}

impl StorageConfig {
    /// Construct the configured backend
    pub async fn build(&self) -> DriverResult<Arc<dyn ObjectStore>> {
        let backend: Arc<dyn ObjectStore> = match self {
            StorageConfig::Local { path } => Arc::new(LocalBackend::new(path).await?),
            StorageConfig::S3 {
                region,
                endpoint,
                prefix,
            } => {
                let mut config = match (endpoint, region) {
                    (Some(endpoint), _) => S3Config::compatible(endpoint),
                    (None, Some(region)) => S3Config::aws(region),
                    (None, None) => {
                        return Err(DriverError::Config(
                            "s3 storage needs a region or an endpoint".into(),
                        ))
                    }
                };
                if endpoint.is_some() {
                    config.region = region.clone();
                }
                if let Some(prefix) = prefix {
                    config = config.with_prefix(prefix);
                }
                Arc::new(S3Backend::new(config).await?)
            }
            StorageConfig::Memory => Arc::new(MemoryBackend::new()),
        };
        Ok(backend)
    }
}
