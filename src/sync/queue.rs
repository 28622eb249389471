//! Offline queue manager.
//!
//! Mutating requests made while offline are persisted in the [`PendingStore`]
//! and drained once the API is reachable again. A drain first asks the server
//! to reconcile everything in one round trip; if that fails, each queued
//! request is replayed on its own, in insertion order.
//!
//! Delivery is at-least-once. Overlapping drains are prevented by an
//! in-progress guard, and each per-item replay re-checks that its entry is
//! still queued.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::watch;

use super::request::{HttpMethod, PendingRequest};
use super::store::PendingStore;
use crate::error::QueueError;
use crate::network::ReachabilityMonitor;

/// Remote side of a drain.
///
/// In production `HttpRemote` implements this against the REST API.
/// In tests, a mock implementation controls success/failure behavior.
pub trait RemoteSync: Send + Sync {
    /// Ask the server to reconcile all pending actions in one round trip.
    fn sync_all(
        &self,
        snapshot: &[PendingRequest],
    ) -> impl Future<Output = Result<(), String>> + Send;

    /// Record a single queued request with the per-item action endpoint.
    fn record_action(
        &self,
        request: &PendingRequest,
    ) -> impl Future<Output = Result<(), String>> + Send;

    /// Send the queued request to its original url with its original method.
    fn replay_direct(
        &self,
        request: &PendingRequest,
    ) -> impl Future<Output = Result<(), String>> + Send;
}

impl<T: RemoteSync> RemoteSync for Arc<T> {
    fn sync_all(
        &self,
        snapshot: &[PendingRequest],
    ) -> impl Future<Output = Result<(), String>> + Send {
        (**self).sync_all(snapshot)
    }

    fn record_action(
        &self,
        request: &PendingRequest,
    ) -> impl Future<Output = Result<(), String>> + Send {
        (**self).record_action(request)
    }

    fn replay_direct(
        &self,
        request: &PendingRequest,
    ) -> impl Future<Output = Result<(), String>> + Send {
        (**self).replay_direct(request)
    }
}

/// Result of queuing a request instead of sending it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Queued {
    pub offline: bool,
    pub id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Offline,
    InProgress,
}

/// How a drain went about its snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainStrategy {
    Skipped(SkipReason),
    Empty,
    Bulk,
    PerItem,
}

/// Outcome of one drain. Failures are counted, never raised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrainReport {
    pub strategy: DrainStrategy,
    /// Entries in the snapshot taken at the start of the drain.
    pub snapshot: usize,
    /// Entries this drain removed from the store.
    pub synced: usize,
    /// Entries whose replay failed on this pass.
    pub failed: usize,
    /// Entries still queued when the drain finished.
    pub remaining: usize,
}

impl DrainReport {
    fn skipped(reason: SkipReason, remaining: usize) -> Self {
        Self {
            strategy: DrainStrategy::Skipped(reason),
            snapshot: 0,
            synced: 0,
            failed: 0,
            remaining,
        }
    }
}

/// Resets the in-progress flag when a drain finishes.
struct DrainGuard<'a>(&'a AtomicBool);

impl<'a> DrainGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct OfflineQueue<R> {
    store: Arc<PendingStore>,
    remote: R,
    monitor: Arc<ReachabilityMonitor>,
    draining: AtomicBool,
    /// Bumped after every successful enqueue.
    enqueued: watch::Sender<u64>,
}

impl<R: RemoteSync> OfflineQueue<R> {
    pub fn new(store: Arc<PendingStore>, remote: R, monitor: Arc<ReachabilityMonitor>) -> Self {
        Self {
            store,
            remote,
            monitor,
            draining: AtomicBool::new(false),
            enqueued: watch::channel(0).0,
        }
    }

    pub fn store(&self) -> &Arc<PendingStore> {
        &self.store
    }

    pub fn monitor(&self) -> &Arc<ReachabilityMonitor> {
        &self.monitor
    }

    pub fn is_draining(&self) -> bool {
        self.draining.load(Ordering::SeqCst)
    }

    /// Receiver that changes whenever a request is queued.
    pub fn subscribe_enqueued(&self) -> watch::Receiver<u64> {
        self.enqueued.subscribe()
    }

    /// Queue a mutating request for later delivery. Makes no network call.
    pub fn enqueue(
        &self,
        url: &str,
        method: HttpMethod,
        payload: &Value,
    ) -> Result<Queued, QueueError> {
        if !method.is_mutating() {
            return Err(QueueError::InvalidOfflineOperation(method));
        }

        let id = self.store.add(url, method, payload)?;
        log::info!("Request saved for later processing: {} {} ({})", method, url, id);
        self.enqueued.send_modify(|n| *n = n.wrapping_add(1));

        Ok(Queued { offline: true, id })
    }

    /// Number of requests waiting in the store.
    pub fn pending_count(&self) -> Result<usize, QueueError> {
        self.store.count()
    }

    /// Deliver every queued request to the remote system.
    ///
    /// A no-op while offline or while another drain runs; skips never fail,
    /// even with an unreadable store. Network failures are contained and
    /// counted in the report; only store errors of a running drain are returned.
    pub async fn drain_all(&self) -> Result<DrainReport, QueueError> {
        if !self.monitor.is_online() {
            log::debug!("Still offline, cannot process pending requests");
            return Ok(DrainReport::skipped(SkipReason::Offline, self.remaining()));
        }

        let Some(_guard) = DrainGuard::acquire(&self.draining) else {
            log::debug!("Drain already in progress, skipping");
            return Ok(DrainReport::skipped(SkipReason::InProgress, self.remaining()));
        };

        let snapshot = self.store.get_all()?;
        if snapshot.is_empty() {
            return Ok(DrainReport {
                strategy: DrainStrategy::Empty,
                snapshot: 0,
                synced: 0,
                failed: 0,
                remaining: 0,
            });
        }

        log::info!("Processing {} pending requests", snapshot.len());

        match self.remote.sync_all(&snapshot).await {
            Ok(()) => {
                for request in &snapshot {
                    self.store.remove(&request.id)?;
                }
                log::info!(
                    "All {} requests processed and removed via bulk sync",
                    snapshot.len()
                );
                return Ok(DrainReport {
                    strategy: DrainStrategy::Bulk,
                    snapshot: snapshot.len(),
                    synced: snapshot.len(),
                    failed: 0,
                    remaining: self.store.count()?,
                });
            }
            Err(e) => {
                log::warn!(
                    "{}; falling back to per-item replay",
                    QueueError::BulkSyncFailure(e)
                );
            }
        }

        let mut synced = 0;
        let mut failed = 0;

        for request in &snapshot {
            if !self.monitor.is_online() {
                log::info!("Connectivity lost mid-drain, leaving remaining requests queued");
                break;
            }
            if !self.store.contains(&request.id)? {
                log::debug!("Queued request {} already removed, skipping", request.id);
                continue;
            }

            match self.replay(request).await {
                Ok(()) => {
                    self.store.remove(&request.id)?;
                    synced += 1;
                    log::info!("Request {} processed and removed", request.id);
                }
                Err(reason) => {
                    failed += 1;
                    let failure = QueueError::ReplayFailure {
                        id: request.id.clone(),
                        reason,
                    };
                    log::error!("{}", failure);
                }
            }
        }

        Ok(DrainReport {
            strategy: DrainStrategy::PerItem,
            snapshot: snapshot.len(),
            synced,
            failed,
            remaining: self.store.count()?,
        })
    }

    /// Pending count for a skipped drain; 0 if the store cannot be read.
    fn remaining(&self) -> usize {
        self.store.count().unwrap_or_else(|e| {
            log::warn!("Could not count pending requests: {}", e);
            0
        })
    }

    /// Record the action with the backend, falling back to sending the
    /// original request if the action endpoint refuses it.
    async fn replay(&self, request: &PendingRequest) -> Result<(), String> {
        let record_err = match self.remote.record_action(request).await {
            Ok(()) => return Ok(()),
            Err(e) => e,
        };

        log::warn!(
            "Recording request {} failed ({}), replaying directly",
            request.id,
            record_err
        );

        self.remote
            .replay_direct(request)
            .await
            .map_err(|direct_err| format!("{}; direct replay: {}", record_err, direct_err))
    }
}
