//! Application state for the offline sync subsystem.
//!
//! Built once per application from a [`SyncConfig`] and shared by reference.
//! Holds the API client, the durable store, the reachability monitor and the
//! queue manager.

use std::sync::Arc;

use crate::api::{auth, ApiClient, HttpRemote};
use crate::config::SyncConfig;
use crate::error::QueueError;
use crate::fetch::OfflineFetch;
use crate::network::{ProbeHandle, ReachabilityMonitor};
use crate::sync::{OfflineQueue, PendingStore, SyncTrigger};

/// Production remote: the HTTP implementation shared by queue and probe.
pub type Remote = Arc<HttpRemote>;

pub struct AppState {
    pub config: SyncConfig,

    /// HTTP client for marketplace API communication.
    pub api: Arc<ApiClient>,

    pub remote: Remote,

    /// Durable pending-request store (process-wide).
    pub store: Arc<PendingStore>,

    pub monitor: Arc<ReachabilityMonitor>,

    pub queue: Arc<OfflineQueue<Remote>>,

    /// Entry point for mutating API calls. Refuses to queue when the store
    /// could not be opened at startup.
    pub fetch: OfflineFetch<Remote>,
}

impl AppState {
    /// Build the state and open the store.
    ///
    /// `native_online` seeds the reachability monitor from the platform's
    /// connectivity flag.
    pub fn new(config: SyncConfig, native_online: bool) -> Self {
        let api = Arc::new(ApiClient::new(&config.api_base_url));
        let remote = Arc::new(HttpRemote::new(
            Arc::clone(&api),
            config.endpoints.clone(),
            config.bulk_snapshot,
            config.probe_timeout,
        ));
        let store = Arc::new(PendingStore::new(&config.db_path));
        let monitor = ReachabilityMonitor::new(native_online);
        let queue = Arc::new(OfflineQueue::new(
            Arc::clone(&store),
            Arc::clone(&remote),
            Arc::clone(&monitor),
        ));

        let offline_support = match store.initialize() {
            Ok(()) => true,
            Err(e @ QueueError::StorageUnavailable(_)) => {
                log::warn!("{}; offline support disabled for this session", e);
                false
            }
            Err(e) => {
                log::warn!("Pending-request store failed to initialize: {}", e);
                false
            }
        };
        let fetch = OfflineFetch::new(Arc::clone(&api), Arc::clone(&queue))
            .with_offline_support(offline_support);

        Self {
            config,
            api,
            remote,
            store,
            monitor,
            queue,
            fetch,
        }
    }

    /// Load the bearer token from config, falling back to the keychain.
    ///
    /// Returns `true` if a token was installed.
    pub async fn load_token(&self) -> bool {
        if let Some(token) = self.config.token.clone() {
            self.api.set_access_token(token).await;
            return true;
        }

        match auth::get_token(self.config.profile) {
            Ok(Some(token)) => {
                self.api.set_access_token(token).await;
                true
            }
            Ok(None) => {
                log::info!("No stored token for {} profile", self.config.profile);
                false
            }
            Err(e) => {
                log::warn!("Failed to read token from keychain: {}", e);
                false
            }
        }
    }

    /// Start the periodic probe and the sync trigger.
    pub fn start(&self) -> RunningSync {
        let probe = self.monitor.spawn_probe(
            Arc::clone(&self.remote),
            self.config.probe_interval,
            self.config.probe_timeout,
        );
        let trigger = SyncTrigger::spawn(Arc::clone(&self.queue), self.config.sync_interval);
        RunningSync { probe, trigger }
    }

    /// Forget the bearer token and release the store.
    pub async fn logout(&self) {
        self.api.clear_access_token().await;
        if let Err(e) = auth::delete_token(self.config.profile) {
            log::warn!("Failed to delete token from keychain: {}", e);
        }
        self.store.close();
    }
}

/// Background tasks started by [`AppState::start`]. Dropping cancels them.
pub struct RunningSync {
    pub probe: ProbeHandle,
    pub trigger: SyncTrigger<Remote>,
}

impl RunningSync {
    pub fn shutdown(self) {
        self.trigger.shutdown();
        self.probe.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClientProfile;

    #[test]
    fn test_unopenable_store_disables_offline_support() {
        let blocker = std::env::temp_dir().join(format!("dodo-state-blocker-{}", uuid::Uuid::new_v4()));
        std::fs::write(&blocker, b"file").unwrap();
        let mut config = SyncConfig::new(ClientProfile::Customer);
        config.db_path = blocker.join("queue.db");

        let state = AppState::new(config, false);

        assert!(!state.fetch.offline_support());
        let _ = std::fs::remove_file(&blocker);
    }

    #[test]
    fn test_store_opened_at_startup() {
        let dir = std::env::temp_dir().join(format!("dodo-state-{}", uuid::Uuid::new_v4()));
        let mut config = SyncConfig::new(ClientProfile::Admin);
        config.db_path = dir.join("dodo-admin-offline.db");

        let state = AppState::new(config, true);

        assert!(state.fetch.offline_support());
        assert!(state.config.db_path.exists());
        state.store.close();
        let _ = std::fs::remove_dir_all(&dir);
    }
}
