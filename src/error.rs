//! Error taxonomy for the offline queue.
//!
//! Storage and validation errors are returned to the immediate caller.
//! Replay and bulk-sync failures are built for logging and never leave a drain.

use thiserror::Error;

use crate::sync::request::HttpMethod;

#[derive(Debug, Error)]
pub enum QueueError {
    /// The durable store could not be opened. Offline queuing is disabled.
    #[error("Offline storage unavailable: {0}")]
    StorageUnavailable(String),

    /// A non-mutating request was handed to the offline queue.
    #[error("Cannot queue {0} request while offline")]
    InvalidOfflineOperation(HttpMethod),

    #[error("Store operation failed: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("Invalid request payload: {0}")]
    Payload(#[from] serde_json::Error),

    /// An online pass-through request failed.
    #[error("Request failed: {0}")]
    Request(String),

    #[error("Replay of queued request {id} failed: {reason}")]
    ReplayFailure { id: String, reason: String },

    #[error("Bulk sync failed: {0}")]
    BulkSyncFailure(String),
}
