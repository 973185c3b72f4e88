//! Backup progress notifications
//!
//! Progress is reported through an external notifier. Two triggers exist and
//! may be active together: a count of uploaded objects, and a periodic timer
//! that fires once when armed and then every interval. A final notification
//! is always sent when the backup completes.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::record::BackupRecord;

/// Receives progress of a running backup
pub trait ProgressNotifier: Send + Sync {
    /// `bytes_so_far` volume bytes have been processed
    fn notify(&self, backup: &BackupRecord, bytes_so_far: u64);

    /// The backup finished after processing `total_bytes`
    fn notify_end(&self, backup: &BackupRecord, total_bytes: u64) {
        self.notify(backup, total_bytes);
    }
}

/// Discards all notifications
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNotifier;

impl ProgressNotifier for NoopNotifier {
    fn notify(&self, _backup: &BackupRecord, _bytes_so_far: u64) {}
}

/// Logs notifications
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl ProgressNotifier for TracingNotifier {
    fn notify(&self, backup: &BackupRecord, bytes_so_far: u64) {
        info!(backup = %backup.id, bytes_so_far, "Backup progress");
    }

    fn notify_end(&self, backup: &BackupRecord, total_bytes: u64) {
        info!(backup = %backup.id, total_bytes, "Backup finished");
    }
}

/// Applies the notification policy for one backup run
pub struct ProgressTracker {
    notifier: Arc<dyn ProgressNotifier>,
    backup: Arc<BackupRecord>,
    /// Notify every this many uploads; 0 disables the count trigger
    per_objects: u64,
    uploaded: u64,
    bytes: Arc<AtomicU64>,
    timer: Option<JoinHandle<()>>,
}

impl ProgressTracker {
    /// Start tracking. Arming the timer notifies immediately.
    pub fn start(
        notifier: Arc<dyn ProgressNotifier>,
        backup: BackupRecord,
        per_objects: u64,
        timer: Option<Duration>,
    ) -> Self {
        let backup = Arc::new(backup);
        let bytes = Arc::new(AtomicU64::new(0));

        let timer = timer.map(|period| {
            notifier.notify(&backup, 0);
            debug!(backup = %backup.id, ?period, "Progress timer armed");

            let notifier = notifier.clone();
            let backup = backup.clone();
            let bytes = bytes.clone();
            tokio::spawn(async move {
                let mut interval = interval_at(Instant::now() + period, period);
                interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
                loop {
                    interval.tick().await;
                    notifier.notify(&backup, bytes.load(Ordering::Relaxed));
                }
            })
        });

        Self {
            notifier,
            backup,
            per_objects,
            uploaded: 0,
            bytes,
            timer,
        }
    }

    /// Account for volume bytes that have been processed
    pub fn add_bytes(&self, len: u64) {
        self.bytes.fetch_add(len, Ordering::Relaxed);
    }

    pub fn bytes_so_far(&self) -> u64 {
        self.bytes.load(Ordering::Relaxed)
    }

    /// Account for one uploaded object
    pub fn object_uploaded(&mut self) {
        self.uploaded += 1;
        if self.per_objects > 0 && self.uploaded % self.per_objects == 0 {
            self.notifier.notify(&self.backup, self.bytes_so_far());
        }
    }

    /// Stop the timer and send the final notification
    pub fn finish(mut self) {
        self.stop_timer();
        self.notifier.notify_end(&self.backup, self.bytes_so_far());
    }

    fn stop_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

impl Drop for ProgressTracker {
    fn drop(&mut self) {
        self.stop_timer();
    }
}
