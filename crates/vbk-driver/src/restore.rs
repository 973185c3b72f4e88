//! Volume restore
//!
//! Manifests are fully resolved when written: every entry names the object
//! holding its bytes, whichever backup in the chain uploaded it. Restore
//! therefore reads one manifest and never walks the chain.

use std::io::SeekFrom;

use tokio::io::{AsyncSeek, AsyncSeekExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, instrument};
use vbk_core::ChunkDigest;
use vbk_storage::StorageError;

use crate::driver::BackupDriver;
use crate::error::{DriverError, DriverResult};

impl BackupDriver {
    /// Write the volume captured by backup `backup_id` into `dest`
    ///
    /// Each chunk is written at its recorded offset; ranges no chunk covers
    /// are left untouched. The first error aborts the restore and leaves
    /// `dest` partially written.
    #[instrument(skip(self, dest))]
    pub async fn restore<W>(&self, backup_id: &str, dest: &mut W) -> DriverResult<()>
    where
        W: AsyncWrite + AsyncSeek + Unpin + Send,
    {
        let record = self.load_record(backup_id).await?;
        let container = self.container_for(&record);
        let datastore = self.datastore(&container);
        let manifest = self.load_manifest(&datastore, &record).await?;

        info!(
            "Restoring backup {} of volume {} from {} ({} chunks)",
            backup_id,
            manifest.volume_id,
            container,
            manifest.chunk_count()
        );

        let mut restored = 0u64;
        for entry in &manifest.objects {
            let name = &entry.object_name;
            let data = datastore
                .read_chunk(name, entry.info.compression)
                .await
                .map_err(|e| match e {
                    StorageError::ObjectNotFound { container, name } => {
                        StorageError::ObjectReadFailure {
                            container,
                            name,
                            reason: "object not found".into(),
                        }
                    }
                    other => other,
                })?;

            if data.len() as u64 != entry.info.length {
                return Err(DriverError::Manifest(format!(
                    "Object {} holds {} bytes, manifest records {}",
                    name,
                    data.len(),
                    entry.info.length
                )));
            }
            if let Some(expected) = &entry.info.sha256 {
                let actual = ChunkDigest::from_data(&data);
                if &actual != expected {
                    return Err(DriverError::Manifest(format!(
                        "Object {} digest mismatch: expected {}, got {}",
                        name, expected, actual
                    )));
                }
            }

            dest.seek(SeekFrom::Start(entry.info.offset))
                .await
                .map_err(DriverError::Volume)?;
            dest.write_all(&data).await.map_err(DriverError::Volume)?;
            debug!(object = %name, offset = entry.info.offset, "Restored chunk");
            restored += data.len() as u64;
        }

        dest.flush().await.map_err(DriverError::Volume)?;
        info!("Restored {} bytes from backup {}", restored, backup_id);
        Ok(())
    }
}
