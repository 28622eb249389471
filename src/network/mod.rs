//! Reachability monitor.
//!
//! Combines the platform's connectivity hint with active health probes into a
//! single online/offline signal. The hint alone never marks the API reachable:
//! an online hint schedules a probe, an offline hint flips the signal at once.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Default interval between probes while the native hint says online.
pub const PROBE_INTERVAL: Duration = Duration::from_secs(30);

/// Default timeout for a single probe. A timeout counts as offline.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Shortest period accepted for the probe and sync tickers. Shorter values,
/// including zero, are raised to this.
pub const MIN_INTERVAL: Duration = Duration::from_millis(10);

/// A change of the reachability signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    WentOnline,
    WentOffline,
}

/// Lightweight check that the remote API answers.
///
/// Returns `true` for a 2xx answer. Transport errors are reported as `false`,
/// never as errors.
pub trait HealthProbe: Send + Sync {
    fn check(&self) -> impl Future<Output = bool> + Send;
}

impl<T: HealthProbe> HealthProbe for Arc<T> {
    fn check(&self) -> impl Future<Output = bool> + Send {
        (**self).check()
    }
}

type Listener = Arc<dyn Fn(Transition) + Send + Sync>;

#[derive(Default)]
struct Listeners {
    next_id: AtomicU64,
    entries: Mutex<Vec<(u64, Listener)>>,
}

impl Listeners {
    fn remove(&self, id: u64) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.retain(|(entry_id, _)| *entry_id != id);
        }
    }
}

/// Handle returned by [`ReachabilityMonitor::on_transition`].
///
/// The listener stays registered until `unsubscribe()` is called or the
/// handle is dropped.
pub struct Subscription {
    id: u64,
    listeners: Weak<Listeners>,
}

impl Subscription {
    pub fn unsubscribe(self) {
        // Drop does the work.
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(listeners) = self.listeners.upgrade() {
            listeners.remove(self.id);
        }
    }
}

/// Process-wide online/offline signal.
pub struct ReachabilityMonitor {
    online: watch::Sender<bool>,
    native_online: watch::Sender<bool>,
    listeners: Arc<Listeners>,
}

impl ReachabilityMonitor {
    /// Create a monitor seeded from the native connectivity hint.
    pub fn new(native_online: bool) -> Arc<Self> {
        let (online, _) = watch::channel(native_online);
        let (native, _) = watch::channel(native_online);
        Arc::new(Self {
            online,
            native_online: native,
            listeners: Arc::new(Listeners::default()),
        })
    }

    /// Current best-effort reachability.
    pub fn is_online(&self) -> bool {
        *self.online.borrow()
    }

    /// Last value of the native connectivity hint.
    pub fn native_online(&self) -> bool {
        *self.native_online.borrow()
    }

    /// Receiver that observes every change of the online signal.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.online.subscribe()
    }

    /// Register a listener for online/offline transitions.
    ///
    /// Listeners run synchronously on the thread that flipped the signal and
    /// must not block.
    pub fn on_transition<F>(&self, handler: F) -> Subscription
    where
        F: Fn(Transition) + Send + Sync + 'static,
    {
        let id = self.listeners.next_id.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut entries) = self.listeners.entries.lock() {
            entries.push((id, Arc::new(handler)));
        }
        Subscription {
            id,
            listeners: Arc::downgrade(&self.listeners),
        }
    }

    /// Forward a platform connectivity event.
    ///
    /// Offline takes effect immediately. Online only wakes the probe task,
    /// which decides whether the API is actually reachable.
    pub fn set_native_online(&self, online: bool) {
        self.native_online.send_replace(online);
        if !online {
            self.set_online(false);
        }
    }

    /// Record the outcome of a probe.
    pub fn report_probe(&self, reachable: bool) {
        if !reachable {
            log::debug!("Reachability probe failed");
        }
        self.set_online(reachable);
    }

    fn set_online(&self, online: bool) {
        let changed = self.online.send_if_modified(|current| {
            if *current == online {
                false
            } else {
                *current = online;
                true
            }
        });
        if !changed {
            return;
        }

        let transition = if online {
            log::info!("Network: online");
            Transition::WentOnline
        } else {
            log::warn!("Network: offline");
            Transition::WentOffline
        };

        // Call listeners outside the lock so they may (un)subscribe.
        let snapshot: Vec<Listener> = match self.listeners.entries.lock() {
            Ok(entries) => entries.iter().map(|(_, l)| Arc::clone(l)).collect(),
            Err(_) => Vec::new(),
        };
        for listener in snapshot {
            listener(transition);
        }
    }

    /// Run one probe with a timeout and record the outcome.
    pub async fn probe_once<P: HealthProbe>(&self, probe: &P, timeout: Duration) -> bool {
        let reachable = tokio::time::timeout(timeout, probe.check())
            .await
            .unwrap_or_else(|_| {
                log::debug!("Reachability probe timed out after {:?}", timeout);
                false
            });
        self.report_probe(reachable);
        reachable
    }

    /// Spawn the periodic probe task.
    ///
    /// Probes once at startup, then every `interval` while the native hint
    /// says online, and immediately whenever the hint turns online.
    /// `interval` is raised to [`MIN_INTERVAL`] if shorter.
    pub fn spawn_probe<P>(self: &Arc<Self>, probe: P, interval: Duration, timeout: Duration) -> ProbeHandle
    where
        P: HealthProbe + 'static,
    {
        let monitor = Arc::clone(self);
        let mut native_rx = self.native_online.subscribe();
        let interval = interval.max(MIN_INTERVAL);

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            log::info!("Reachability monitor started (interval: {:?})", interval);

            loop {
                tokio::select! {
                    // The first tick fires immediately and doubles as the startup probe.
                    _ = ticker.tick() => {
                        if monitor.native_online() {
                            monitor.probe_once(&probe, timeout).await;
                        }
                    }
                    changed = native_rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let native = *native_rx.borrow_and_update();
                        if native {
                            monitor.probe_once(&probe, timeout).await;
                        }
                    }
                }
            }
        });

        ProbeHandle { task: Some(task) }
    }
}

/// Owns the periodic probe task. Dropping it cancels the task.
pub struct ProbeHandle {
    task: Option<JoinHandle<()>>,
}

impl ProbeHandle {
    pub fn shutdown(mut self) {
        self.stop();
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            log::debug!("Reachability monitor stopped");
        }
    }
}

impl Drop for ProbeHandle {
    fn drop(&mut self) {
        self.stop();
    }
}
