//! Storage backend trait definitions
//!
//! Any object store a backup is written to must satisfy this contract.

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::StorageResult;

/// Object storage capability used by backup, restore and GC
///
/// Implementations translate every native error into
/// [`StorageError`](crate::StorageError) and never retry internally.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Get backend name/type
    fn name(&self) -> &str;

    /// List container names
    async fn list_containers(&self) -> StorageResult<Vec<String>>;

    /// Create a container. Creating an existing container succeeds.
    async fn create_container(&self, container: &str) -> StorageResult<()>;

    /// Store an object, replacing any previous content
    async fn put_object(&self, container: &str, name: &str, data: Bytes) -> StorageResult<()>;

    /// Read an object; `ObjectNotFound` if absent
    async fn get_object(&self, container: &str, name: &str) -> StorageResult<Bytes>;

    /// Delete an object. Deleting a missing object succeeds.
    async fn delete_object(&self, container: &str, name: &str) -> StorageResult<()>;

    /// List object names under a prefix
    async fn list_objects(&self, container: &str, prefix: &str) -> StorageResult<Vec<String>>;
}
