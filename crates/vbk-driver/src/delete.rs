//! Backup deletion
//!
//! Chunk objects can be shared by any later backup in the chain, so
//! deleting a backup only removes its manifest and block digest map. The
//! chunks it wrote stay until a garbage collection run finds no manifest
//! referencing them.

use tracing::{info, instrument};

use crate::driver::BackupDriver;
use crate::error::{DriverError, DriverResult};
use crate::record::BackupStatus;

impl BackupDriver {
    /// Delete backup `backup_id`
    ///
    /// Missing objects are not an error, so deleting a backup whose upload
    /// failed succeeds. A backup that is still `creating` is refused.
    #[instrument(skip(self))]
    pub async fn delete(&self, backup_id: &str) -> DriverResult<()> {
        let record = self.load_record(backup_id).await?;
        if record.status == BackupStatus::Creating {
            return Err(DriverError::Driver(format!(
                "Backup {} is still being created",
                backup_id
            )));
        }
        self.store
            .update_status(backup_id, BackupStatus::Deleting)
            .await?;

        let datastore = self.datastore(&self.container_for(&record));
        let namer = self.namer(&record);

        datastore.delete_object(&namer.manifest_object()).await?;
        datastore.delete_object(&namer.block_digests_object()).await?;

        self.store
            .update_status(backup_id, BackupStatus::Deleted)
            .await?;
        info!("Deleted backup {} from {}", backup_id, datastore.container());
        Ok(())
    }
}
