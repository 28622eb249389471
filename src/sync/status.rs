//! Status of the background sync, as shown by a pending-count indicator.

/// All states the sync subsystem reports to the UI.
///
/// The indicator displays the human-readable label returned by
/// `SyncStatus::label()` and, when non-zero, the pending count.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncStatus {
    /// Nothing has run yet.
    Idle,
    /// A drain is in flight.
    Syncing,
    /// Last drain finished. Entries that failed to replay stay queued.
    Synced { remaining: usize },
    /// API unreachable; queued requests wait for connectivity.
    Offline { pending: usize },
    /// The store could not be read (with human-readable description).
    Error(String),
}

impl SyncStatus {
    pub fn label(&self) -> &str {
        match self {
            SyncStatus::Idle => "Idle",
            SyncStatus::Syncing => "Syncing...",
            SyncStatus::Synced { remaining: 0 } => "Synced",
            SyncStatus::Synced { .. } => "Pending",
            SyncStatus::Offline { .. } => "Offline",
            SyncStatus::Error(_) => "Error",
        }
    }

    /// Number of requests still waiting, when known.
    pub fn pending(&self) -> Option<usize> {
        match self {
            SyncStatus::Synced { remaining } => Some(*remaining),
            SyncStatus::Offline { pending } => Some(*pending),
            _ => None,
        }
    }
}
