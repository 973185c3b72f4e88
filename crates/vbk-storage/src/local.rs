//! Local filesystem storage backend
//!
//! Stores objects on the local filesystem:
//! - <root>/{container}/ - one directory per container
//! - <root>/{container}/{name} - object data; `/` in names become subdirectories

use async_trait::async_trait;
use bytes::Bytes;
use std::ffi::OsString;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, instrument};

use crate::backend::ObjectStore;
use crate::error::{StorageError, StorageResult};

const TEMP_SUFFIX: &str = ".tmp";

/// Local filesystem storage backend
pub struct LocalBackend {
    /// Root directory
    root: PathBuf,
}

impl LocalBackend {
    /// Create a new local backend, creating the root directory if needed
    pub async fn new(root: impl AsRef<Path>) -> StorageResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)
            .await
            .map_err(|e| StorageError::ConnectionFailure(format!("{}: {}", root.display(), e)))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Get container path
    fn container_path(&self, container: &str) -> StorageResult<PathBuf> {
        if !is_plain_relative(Path::new(container)) || container.contains('/') {
            return Err(StorageError::ContainerError {
                container: container.to_string(),
                reason: "invalid container name".into(),
            });
        }
        Ok(self.root.join(container))
    }

    /// Get object path, rejecting names that would escape the container
    fn object_path(&self, container: &str, name: &str) -> StorageResult<PathBuf> {
        let base = self.container_path(container)?;
        if name.is_empty() || !is_plain_relative(Path::new(name)) {
            return Err(StorageError::ObjectWriteFailure {
                container: container.to_string(),
                name: name.to_string(),
                reason: "invalid object name".into(),
            });
        }
        Ok(base.join(name))
    }

    async fn ensure_container_exists(&self, container: &str) -> StorageResult<PathBuf> {
        let path = self.container_path(container)?;
        match fs::metadata(&path).await {
            Ok(meta) if meta.is_dir() => Ok(path),
            Ok(_) => Err(StorageError::ContainerError {
                container: container.to_string(),
                reason: "not a directory".into(),
            }),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(StorageError::ContainerError {
                container: container.to_string(),
                reason: "container does not exist".into(),
            }),
            Err(e) => Err(StorageError::ContainerError {
                container: container.to_string(),
                reason: e.to_string(),
            }),
        }
    }
}

fn is_plain_relative(path: &Path) -> bool {
    path.components().all(|c| matches!(c, Component::Normal(_)))
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(TEMP_SUFFIX);
    PathBuf::from(name)
}

#[async_trait]
impl ObjectStore for LocalBackend {
    fn name(&self) -> &str {
        "local"
    }

    async fn list_containers(&self) -> StorageResult<Vec<String>> {
        let mut containers = Vec::new();
        let mut entries = fs::read_dir(&self.root)
            .await
            .map_err(|e| StorageError::ConnectionFailure(e.to_string()))?;

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StorageError::ConnectionFailure(e.to_string()))?
        {
            let is_dir = entry
                .file_type()
                .await
                .map(|t| t.is_dir())
                .unwrap_or(false);
            if let (true, Some(name)) = (is_dir, entry.file_name().to_str()) {
                containers.push(name.to_string());
            }
        }

        containers.sort();
        Ok(containers)
    }

    #[instrument(skip(self))]
    async fn create_container(&self, container: &str) -> StorageResult<()> {
        let path = self.container_path(container)?;
        fs::create_dir_all(&path)
            .await
            .map_err(|e| StorageError::ContainerError {
                container: container.to_string(),
                reason: e.to_string(),
            })
    }

    #[instrument(skip(self, data), fields(size = data.len()))]
    async fn put_object(&self, container: &str, name: &str, data: Bytes) -> StorageResult<()> {
        self.ensure_container_exists(container).await?;
        let path = self.object_path(container, name)?;
        let write_err = |e: std::io::Error| StorageError::ObjectWriteFailure {
            container: container.to_string(),
            name: name.to_string(),
            reason: e.to_string(),
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.map_err(write_err)?;
        }

        // Write atomically using temp file + rename
        let temp = temp_path(&path);
        let mut file = fs::File::create(&temp).await.map_err(write_err)?;
        file.write_all(&data).await.map_err(write_err)?;
        file.sync_all().await.map_err(write_err)?;
        drop(file);

        fs::rename(&temp, &path).await.map_err(write_err)?;
        debug!("Stored object");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_object(&self, container: &str, name: &str) -> StorageResult<Bytes> {
        let path = self.object_path(container, name)?;

        match fs::read(&path).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(StorageError::ObjectNotFound {
                container: container.to_string(),
                name: name.to_string(),
            }),
            Err(e) => Err(StorageError::ObjectReadFailure {
                container: container.to_string(),
                name: name.to_string(),
                reason: e.to_string(),
            }),
        }
    }

    #[instrument(skip(self))]
    async fn delete_object(&self, container: &str, name: &str) -> StorageResult<()> {
        let path = self.object_path(container, name)?;

        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()), // Already deleted
            Err(e) => Err(StorageError::ObjectDeleteFailure {
                container: container.to_string(),
                name: name.to_string(),
                reason: e.to_string(),
            }),
        }
    }

    async fn list_objects(&self, container: &str, prefix: &str) -> StorageResult<Vec<String>> {
        let base = self.container_path(container)?;
        if !base.exists() {
            return Ok(Vec::new());
        }

        let mut names = list_files_recursive(&base, &base).await.map_err(|e| {
            StorageError::ContainerError {
                container: container.to_string(),
                reason: e.to_string(),
            }
        })?;
        names.retain(|name| name.starts_with(prefix) && !name.ends_with(TEMP_SUFFIX));
        names.sort();
        Ok(names)
    }
}

/// Recursively list files, returning `/`-separated paths relative to base
async fn list_files_recursive(dir: &Path, base: &Path) -> std::io::Result<Vec<String>> {
    let mut files = Vec::new();
    let mut entries = fs::read_dir(dir).await?;

    while let Some(entry) = entries.next_entry().await? {
        let file_type = entry.file_type().await?;
        let path = entry.path();

        if file_type.is_file() {
            if let Ok(relative) = path.strip_prefix(base) {
                let parts: Vec<_> = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy().into_owned())
                    .collect();
                files.push(parts.join("/"));
            }
        } else if file_type.is_dir() {
            let mut sub_files = Box::pin(list_files_recursive(&path, base)).await?;
            files.append(&mut sub_files);
        }
    }

    Ok(files)
}
