//! Background sync for queued offline requests.
//!
//! The [`SyncTrigger`] listens for the reachability monitor's offline→online
//! transition and schedules one drain of the [`OfflineQueue`]. It also drains
//! every 30 seconds while online and requests are pending, and can be invoked
//! manually from a "Sync now" button.

pub mod queue;
pub mod request;
pub mod status;
pub mod store;

pub use queue::{DrainReport, DrainStrategy, OfflineQueue, Queued, RemoteSync, SkipReason};
pub use request::{HttpMethod, PendingRequest};
pub use status::SyncStatus;
pub use store::PendingStore;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::error::QueueError;
use crate::network::{Subscription, Transition, MIN_INTERVAL};

/// Default interval for the periodic pending-request check (30 seconds).
pub const SYNC_INTERVAL: Duration = Duration::from_secs(30);

/// Binds reachability transitions to queue drains.
///
/// Runs in a tokio task. Dropping the trigger unsubscribes from the monitor
/// and cancels the task.
pub struct SyncTrigger<R: RemoteSync + 'static> {
    queue: Arc<OfflineQueue<R>>,
    /// Channel sender for scheduled drains (transition listener, `request_sync`).
    sync_now_tx: mpsc::Sender<()>,
    status: Arc<watch::Sender<SyncStatus>>,
    /// Keeps the transition listener registered.
    _subscription: Subscription,
    task: Option<JoinHandle<()>>,
}

impl<R: RemoteSync + 'static> SyncTrigger<R> {
    /// Subscribe to the queue's monitor and spawn the trigger task.
    ///
    /// `poll_interval` is raised to [`MIN_INTERVAL`] if shorter.
    pub fn spawn(queue: Arc<OfflineQueue<R>>, poll_interval: Duration) -> Self {
        let poll_interval = poll_interval.max(MIN_INTERVAL);
        // Capacity 1: a transition that finds a drain already scheduled is
        // folded into it.
        let (sync_now_tx, sync_now_rx) = mpsc::channel(1);
        let status = Arc::new(watch::channel(SyncStatus::Idle).0);

        let on_transition_tx = sync_now_tx.clone();
        let on_transition_status = Arc::clone(&status);
        let store = Arc::clone(queue.store());
        let subscription = queue.monitor().on_transition(move |transition| match transition {
            Transition::WentOnline => {
                log::info!("Back online, scheduling sync of pending requests");
                let _ = on_transition_tx.try_send(());
            }
            Transition::WentOffline => {
                let pending = store.count().unwrap_or(0);
                on_transition_status.send_replace(SyncStatus::Offline { pending });
            }
        });

        let task = tokio::spawn(run(
            Arc::clone(&queue),
            sync_now_rx,
            queue.subscribe_enqueued(),
            Arc::clone(&status),
            poll_interval,
        ));

        Self {
            queue,
            sync_now_tx,
            status,
            _subscription: subscription,
            task: Some(task),
        }
    }

    /// Drain immediately and wait for the result. Safe to call at any time.
    pub async fn sync_now(&self) -> Result<DrainReport, QueueError> {
        log::info!("Manual sync triggered");
        sync_cycle(&self.queue, &self.status).await
    }

    /// Schedule a drain on the trigger task without waiting.
    ///
    /// Returns `false` if a drain is already scheduled.
    pub fn request_sync(&self) -> bool {
        self.sync_now_tx.try_send(()).is_ok()
    }

    /// Receiver for the latest [`SyncStatus`].
    pub fn status(&self) -> watch::Receiver<SyncStatus> {
        self.status.subscribe()
    }

    pub fn queue(&self) -> &Arc<OfflineQueue<R>> {
        &self.queue
    }

    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            log::debug!("Sync trigger stopped");
        }
    }
}

impl<R: RemoteSync + 'static> Drop for SyncTrigger<R> {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Trigger task main loop.
///
/// Uses `tokio::select!` to wait on the periodic tick, a scheduled drain or a
/// newly queued request.
async fn run<R: RemoteSync + 'static>(
    queue: Arc<OfflineQueue<R>>,
    mut sync_now_rx: mpsc::Receiver<()>,
    mut enqueued_rx: watch::Receiver<u64>,
    status: Arc<watch::Sender<SyncStatus>>,
    poll_interval: Duration,
) {
    let mut ticker = tokio::time::interval(poll_interval);
    // The first tick fires immediately; skip it so startup is driven by the
    // monitor's first probe instead.
    ticker.tick().await;

    log::info!("Sync trigger started (interval: {:?})", poll_interval);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if !queue.monitor().is_online() {
                    continue;
                }
                match queue.pending_count() {
                    Ok(0) => {}
                    Ok(_) => {
                        let _ = sync_cycle(&queue, &status).await;
                    }
                    Err(e) => {
                        log::warn!("Could not read pending requests: {}", e);
                    }
                }
            }
            request = sync_now_rx.recv() => {
                if request.is_none() {
                    break;
                }
                let _ = sync_cycle(&queue, &status).await;
            }
            changed = enqueued_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                // Keep the indicator's count current while requests pile up.
                if !queue.monitor().is_online() {
                    match queue.pending_count() {
                        Ok(pending) => {
                            status.send_replace(SyncStatus::Offline { pending });
                        }
                        Err(e) => log::warn!("Could not read pending requests: {}", e),
                    }
                }
            }
        }
    }
}

/// Run one drain and publish the resulting status.
async fn sync_cycle<R: RemoteSync>(
    queue: &OfflineQueue<R>,
    status: &watch::Sender<SyncStatus>,
) -> Result<DrainReport, QueueError> {
    if queue.monitor().is_online() {
        status.send_replace(SyncStatus::Syncing);
    }

    let result = queue.drain_all().await;
    match &result {
        Ok(report) => match report.strategy {
            DrainStrategy::Skipped(SkipReason::Offline) => {
                status.send_replace(SyncStatus::Offline {
                    pending: report.remaining,
                });
            }
            // The running drain publishes its own outcome.
            DrainStrategy::Skipped(SkipReason::InProgress) => {}
            DrainStrategy::Empty | DrainStrategy::Bulk | DrainStrategy::PerItem => {
                if report.snapshot > 0 {
                    log::info!(
                        "Sync complete: {} synced, {} failed, {} remaining",
                        report.synced,
                        report.failed,
                        report.remaining
                    );
                }
                status.send_replace(SyncStatus::Synced {
                    remaining: report.remaining,
                });
            }
        },
        Err(e) => {
            log::error!("Sync failed: {}", e);
            status.send_replace(SyncStatus::Error(e.to_string()));
        }
    }
    result
}
