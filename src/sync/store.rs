//! Durable pending-request store backed by SQLite.
//!
//! One row per queued request. The connection is opened lazily on first use
//! (or eagerly via `initialize()`) and every operation is a single statement,
//! so records are never torn. Rows that can no longer be decoded are moved to
//! a `dead_letters` table instead of blocking the queue.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{TimeZone, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use uuid::Uuid;

use super::request::{HttpMethod, PendingRequest};
use crate::error::QueueError;

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS pending_requests (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    id TEXT NOT NULL UNIQUE,
    url TEXT NOT NULL,
    method TEXT NOT NULL,
    data TEXT NOT NULL,
    timestamp INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS dead_letters (
    id TEXT PRIMARY KEY,
    url TEXT NOT NULL,
    method TEXT NOT NULL,
    data TEXT NOT NULL,
    timestamp INTEGER NOT NULL,
    reason TEXT NOT NULL,
    moved_at INTEGER NOT NULL
);";

/// Process-wide store of queued mutating requests.
///
/// Constructed once per application and shared by `Arc` between the queue
/// manager and anything that needs the pending count.
pub struct PendingStore {
    /// Database file, or `None` for an in-memory store.
    path: Option<PathBuf>,
    conn: Mutex<Option<Connection>>,
}

impl PendingStore {
    /// Create a store backed by the SQLite file at `path`. Nothing is opened yet.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            conn: Mutex::new(None),
        }
    }

    /// Create a store that lives in memory. Contents are lost on `close()`.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            conn: Mutex::new(None),
        }
    }

    /// Location of the backing file, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Open (or create) the backing store. Idempotent.
    pub fn initialize(&self) -> Result<(), QueueError> {
        self.with_conn(|_| Ok(()))
    }

    /// Release the connection. The next operation re-opens it.
    pub fn close(&self) {
        if let Ok(mut guard) = self.conn.lock() {
            if guard.take().is_some() {
                log::debug!("Pending-request store closed");
            }
        }
    }

    /// Persist a new request and return its generated id.
    pub fn add(&self, url: &str, method: HttpMethod, payload: &Value) -> Result<String, QueueError> {
        let id = Uuid::new_v4().to_string();
        let data = serde_json::to_string(payload)?;
        let timestamp = Utc::now().timestamp_millis();

        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO pending_requests (id, url, method, data, timestamp)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![id, url, method.as_str(), data, timestamp],
            )?;
            Ok(())
        })?;

        log::debug!("Queued {} {} as {}", method, url, id);
        Ok(id)
    }

    /// All queued requests in insertion order.
    ///
    /// Rows that cannot be decoded are moved to the dead-letter table, so
    /// `count()` always matches the length of the returned list.
    pub fn get_all(&self) -> Result<Vec<PendingRequest>, QueueError> {
        let rows = self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, url, method, data, timestamp FROM pending_requests ORDER BY seq",
            )?;
            let rows = stmt
                .query_map([], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, i64>(4)?,
                    ))
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })?;

        let mut requests = Vec::with_capacity(rows.len());
        for (id, url, method, data, timestamp) in rows {
            let method = match method.parse::<HttpMethod>() {
                Ok(m) => m,
                Err(e) => {
                    self.dead_letter(&id, &e)?;
                    continue;
                }
            };
            let payload = match serde_json::from_str::<Value>(&data) {
                Ok(v) => v,
                Err(e) => {
                    self.dead_letter(&id, &format!("bad payload ({})", e))?;
                    continue;
                }
            };
            requests.push(PendingRequest {
                id,
                url,
                method,
                payload,
                enqueued_at: Utc
                    .timestamp_millis_opt(timestamp)
                    .single()
                    .unwrap_or_else(Utc::now),
            });
        }
        Ok(requests)
    }

    /// Delete one request. Absent ids are not an error.
    pub fn remove(&self, id: &str) -> Result<(), QueueError> {
        let removed = self.with_conn(|conn| {
            Ok(conn.execute("DELETE FROM pending_requests WHERE id = ?1", params![id])?)
        })?;
        if removed == 0 {
            log::debug!("Queued request {} already removed", id);
        }
        Ok(())
    }

    pub fn contains(&self, id: &str) -> Result<bool, QueueError> {
        self.with_conn(|conn| {
            let found = conn
                .query_row(
                    "SELECT 1 FROM pending_requests WHERE id = ?1",
                    params![id],
                    |row| row.get::<_, i64>(0),
                )
                .optional()?;
            Ok(found.is_some())
        })
    }

    pub fn count(&self) -> Result<usize, QueueError> {
        self.with_conn(|conn| {
            let n: i64 =
                conn.query_row("SELECT COUNT(*) FROM pending_requests", [], |row| row.get(0))?;
            Ok(n.max(0) as usize)
        })
    }

    /// Number of rows moved aside because they could not be decoded.
    pub fn dead_letter_count(&self) -> Result<usize, QueueError> {
        self.with_conn(|conn| {
            let n: i64 = conn.query_row("SELECT COUNT(*) FROM dead_letters", [], |row| row.get(0))?;
            Ok(n.max(0) as usize)
        })
    }

    /// Move one undecodable row out of the queue.
    fn dead_letter(&self, id: &str, reason: &str) -> Result<(), QueueError> {
        log::warn!("Moving queued request {} to dead letters: {}", id, reason);
        self.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            tx.execute(
                "INSERT OR REPLACE INTO dead_letters
                     (id, url, method, data, timestamp, reason, moved_at)
                 SELECT id, url, method, data, timestamp, ?2, ?3
                 FROM pending_requests WHERE id = ?1",
                params![id, reason, Utc::now().timestamp_millis()],
            )?;
            tx.execute("DELETE FROM pending_requests WHERE id = ?1", params![id])?;
            tx.commit()?;
            Ok(())
        })
    }

    /// Run `f` against the open connection, opening it first if needed.
    fn with_conn<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, QueueError>,
    ) -> Result<T, QueueError> {
        let mut guard = self
            .conn
            .lock()
            .map_err(|_| QueueError::StorageUnavailable("store lock poisoned".to_string()))?;

        if guard.is_none() {
            *guard = Some(self.open()?);
        }

        match guard.as_ref() {
            Some(conn) => f(conn),
            None => Err(QueueError::StorageUnavailable(
                "connection not open".to_string(),
            )),
        }
    }

    fn open(&self) -> Result<Connection, QueueError> {
        let conn = match &self.path {
            Some(path) => open_file(path)?,
            None => Connection::open_in_memory()
                .map_err(|e| QueueError::StorageUnavailable(format!("sqlite open: {}", e)))?,
        };

        conn.execute_batch(SCHEMA)
            .map_err(|e| QueueError::StorageUnavailable(format!("schema setup: {}", e)))?;

        match &self.path {
            Some(path) => log::info!("Pending-request store opened at {}", path.display()),
            None => log::info!("Pending-request store opened in memory"),
        }
        Ok(conn)
    }
}

fn open_file(path: &Path) -> Result<Connection, QueueError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| {
            QueueError::StorageUnavailable(format!(
                "cannot create {}: {}",
                parent.display(),
                e
            ))
        })?;
    }

    let conn = Connection::open(path)
        .map_err(|e| QueueError::StorageUnavailable(format!("sqlite open: {}", e)))?;

    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA busy_timeout = 5000;
         PRAGMA synchronous = NORMAL;",
    )
    .map_err(|e| QueueError::StorageUnavailable(format!("pragma setup: {}", e)))?;

    Ok(conn)
}
