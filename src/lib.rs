//! Offline action queue and background sync for the Dodo marketplace clients.
//!
//! Mutating API calls made while the backend is unreachable are persisted to a
//! local SQLite store and replayed, in insertion order, once the reachability
//! monitor reports the API back online.

pub mod api;
pub mod config;
pub mod error;
pub mod fetch;
pub mod network;
pub mod state;
pub mod sync;

pub use config::{ClientProfile, SyncConfig};
pub use error::QueueError;
pub use fetch::{FetchOutcome, OfflineFetch};
pub use network::{ReachabilityMonitor, Transition};
pub use state::AppState;
pub use sync::{OfflineQueue, PendingStore, SyncStatus, SyncTrigger};
