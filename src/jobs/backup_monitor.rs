use std::collections::BTreeSet;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};

use crate::error::TrackingError;
use crate::models::OperationFilter;
use crate::services::notifier::{NotifyError, WebhookNotifier};
use crate::store::Store;

/// How far below the newest handled id a scan looks again.
///
/// Ids are allocated before commit, so a slow transaction can publish an id
/// lower than one already seen; it trails by at most the number of commits
/// in flight.
const RESCAN_WINDOW: i64 = 1000;

#[derive(Debug, Default, PartialEq, Eq)]
pub struct ScanStats {
    pub found: usize,
    pub notified: usize,
    pub skipped_cancelled: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    #[error(transparent)]
    Store(#[from] TrackingError),

    #[error("Notification for operation {operation_id} failed: {source}")]
    Notify {
        operation_id: i64,
        source: NotifyError,
    },
}

/// Watches the operation log for cards entering the watched offload status
pub struct BackupMonitor {
    store: Store,
    notifier: WebhookNotifier,
    watched_status: String,
    // Highest operation id already handled
    last_seen: AtomicI64,
    // Ids handled within the rescan window; the lock also keeps
    // overlapping ticks from notifying twice
    handled: Mutex<BTreeSet<i64>>,
}

impl BackupMonitor {
    pub fn new(store: Store, notifier: WebhookNotifier, watched_status: impl Into<String>) -> Self {
        Self {
            store,
            notifier,
            watched_status: watched_status.into(),
            last_seen: AtomicI64::new(0),
            handled: Mutex::new(BTreeSet::new()),
        }
    }

    pub fn last_seen(&self) -> i64 {
        self.last_seen.load(Ordering::SeqCst)
    }

    fn window_start(&self) -> i64 {
        (self.last_seen() - RESCAN_WINDOW).max(0)
    }

    /// Starts after the newest existing operation so old ones are not re-announced
    pub async fn init(&self) -> Result<i64, TrackingError> {
        let mut handled = self.handled.lock().await;

        let filter = OperationFilter {
            offload_status: Some(self.watched_status.clone()),
            ..Default::default()
        };
        let last_id = self
            .store
            .list_operations(&filter, 1)
            .await?
            .first()
            .map(|op| op.id)
            .unwrap_or(0);

        self.last_seen.store(last_id, Ordering::SeqCst);

        // Existing operations inside the window count as announced
        handled.clear();
        handled.extend(
            self.store
                .operations_since(self.window_start(), &self.watched_status)
                .await?
                .into_iter()
                .map(|op| op.id)
                .filter(|id| *id <= last_id),
        );

        tracing::info!(
            status = %self.watched_status,
            last_id,
            "Backup monitor initialised"
        );
        Ok(last_id)
    }

    /// Notifies every operation not handled yet, oldest first.
    ///
    /// Stops at the first failed delivery; that operation is retried on the
    /// next scan.
    pub async fn scan_once(&self) -> Result<ScanStats, MonitorError> {
        let mut handled = self.handled.lock().await;

        let operations: Vec<_> = self
            .store
            .operations_since(self.window_start(), &self.watched_status)
            .await?
            .into_iter()
            .filter(|op| !handled.contains(&op.id))
            .collect();

        let mut stats = ScanStats {
            found: operations.len(),
            ..Default::default()
        };

        for operation in operations {
            if !operation.is_active() {
                stats.skipped_cancelled += 1;
            } else {
                self.notifier
                    .notify_backup(&operation)
                    .await
                    .map_err(|source| MonitorError::Notify {
                        operation_id: operation.id,
                        source,
                    })?;
                stats.notified += 1;

                tracing::info!(
                    operation_id = operation.id,
                    card = %operation.card_name,
                    actor = %operation.username,
                    "Backup notification sent"
                );
            }
            handled.insert(operation.id);
            self.last_seen.fetch_max(operation.id, Ordering::SeqCst);
        }

        let floor = self.window_start();
        handled.retain(|id| *id > floor);

        Ok(stats)
    }
}

/// Schedules `scan_once` every `interval`
pub async fn start(
    monitor: Arc<BackupMonitor>,
    interval: Duration,
) -> Result<JobScheduler, JobSchedulerError> {
    let scheduler = JobScheduler::new().await?;

    let job = Job::new_repeated_async(interval, move |_uuid, _scheduler| {
        let monitor = monitor.clone();
        Box::pin(async move {
            match monitor.scan_once().await {
                Ok(stats) if stats.found > 0 => {
                    tracing::debug!(?stats, "Backup monitor scan completed");
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::error!(error = %e, "Backup monitor scan failed");
                }
            }
        })
    })?;

    scheduler.add(job).await?;
    scheduler.start().await?;

    Ok(scheduler)
}
