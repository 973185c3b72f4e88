//! In-memory storage backend
//!
//! Keeps containers in a map and records every write. Used for tests and
//! embedding; failures can be injected to exercise error paths.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;

use crate::backend::ObjectStore;
use crate::error::{StorageError, StorageResult};

/// Failures to inject into subsequent calls
#[derive(Debug, Clone, Default)]
struct Faults {
    /// Every call fails with `ConnectionFailure`
    offline: bool,
    /// Puts of objects whose name contains one of these fragments fail
    failing_puts: Vec<String>,
    /// Every delete fails
    failing_deletes: bool,
    /// Container creation fails
    failing_creates: bool,
}

/// In-memory object store
#[derive(Default)]
pub struct MemoryBackend {
    containers: RwLock<HashMap<String, BTreeMap<String, Bytes>>>,
    faults: RwLock<Faults>,
    /// (container, name) of every successful put, in order
    put_log: RwLock<Vec<(String, String)>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every call as if the backend were unreachable
    pub fn set_offline(&self, offline: bool) {
        self.faults.write().offline = offline;
    }

    /// Fail puts of objects whose name contains `fragment`
    pub fn fail_puts_containing(&self, fragment: &str) {
        self.faults.write().failing_puts.push(fragment.to_string());
    }

    pub fn fail_deletes(&self, fail: bool) {
        self.faults.write().failing_deletes = fail;
    }

    pub fn fail_container_creation(&self, fail: bool) {
        self.faults.write().failing_creates = fail;
    }

    /// Remove all injected faults
    pub fn clear_faults(&self) {
        *self.faults.write() = Faults::default();
    }

    /// Names written by successful puts, in order
    pub fn put_log(&self) -> Vec<(String, String)> {
        self.put_log.read().clone()
    }

    pub fn clear_put_log(&self) {
        self.put_log.write().clear();
    }

    /// Insert a container directly, bypassing fault injection
    pub fn insert_container(&self, container: &str) {
        self.containers
            .write()
            .entry(container.to_string())
            .or_default();
    }

    /// Overwrite an object directly, bypassing fault injection and the put log
    pub fn insert_object(&self, container: &str, name: &str, data: Bytes) {
        self.containers
            .write()
            .entry(container.to_string())
            .or_default()
            .insert(name.to_string(), data);
    }

    pub fn contains(&self, container: &str, name: &str) -> bool {
        self.containers
            .read()
            .get(container)
            .map(|objects| objects.contains_key(name))
            .unwrap_or(false)
    }

    /// Number of objects in a container
    pub fn object_count(&self, container: &str) -> usize {
        self.containers
            .read()
            .get(container)
            .map(BTreeMap::len)
            .unwrap_or(0)
    }

    fn check_online(&self) -> StorageResult<()> {
        if self.faults.read().offline {
            Err(StorageError::ConnectionFailure(
                "memory backend is offline".into(),
            ))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl ObjectStore for MemoryBackend {
    fn name(&self) -> &str {
        "memory"
    }

    async fn list_containers(&self) -> StorageResult<Vec<String>> {
        self.check_online()?;
        let mut names: Vec<String> = self.containers.read().keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    async fn create_container(&self, container: &str) -> StorageResult<()> {
        self.check_online()?;
        if self.faults.read().failing_creates {
            return Err(StorageError::ContainerError {
                container: container.to_string(),
                reason: "injected create failure".into(),
            });
        }
        self.insert_container(container);
        Ok(())
    }

    async fn put_object(&self, container: &str, name: &str, data: Bytes) -> StorageResult<()> {
        self.check_online()?;
        let failing = self
            .faults
            .read()
            .failing_puts
            .iter()
            .any(|fragment| name.contains(fragment.as_str()));
        if failing {
            return Err(StorageError::ObjectWriteFailure {
                container: container.to_string(),
                name: name.to_string(),
                reason: "injected put failure".into(),
            });
        }

        let mut containers = self.containers.write();
        let objects = containers
            .get_mut(container)
            .ok_or_else(|| StorageError::ContainerError {
                container: container.to_string(),
                reason: "container does not exist".into(),
            })?;
        objects.insert(name.to_string(), data);
        drop(containers);

        self.put_log
            .write()
            .push((container.to_string(), name.to_string()));
        Ok(())
    }

    async fn get_object(&self, container: &str, name: &str) -> StorageResult<Bytes> {
        self.check_online()?;
        self.containers
            .read()
            .get(container)
            .and_then(|objects| objects.get(name))
            .cloned()
            .ok_or_else(|| StorageError::ObjectNotFound {
                container: container.to_string(),
                name: name.to_string(),
            })
    }

    async fn delete_object(&self, container: &str, name: &str) -> StorageResult<()> {
        self.check_online()?;
        if self.faults.read().failing_deletes {
            return Err(StorageError::ObjectDeleteFailure {
                container: container.to_string(),
                name: name.to_string(),
                reason: "injected delete failure".into(),
            });
        }
        if let Some(objects) = self.containers.write().get_mut(container) {
            objects.remove(name);
        }
        Ok(())
    }

    async fn list_objects(&self, container: &str, prefix: &str) -> StorageResult<Vec<String>> {
        self.check_online()?;
        Ok(self
            .containers
            .read()
            .get(container)
            .map(|objects| {
                objects
                    .keys()
                    .filter(|name| name.starts_with(prefix))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}
