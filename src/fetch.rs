//! Offline-aware request wrapper.
//!
//! Callers route mutating API calls through [`OfflineFetch`]. While the API is
//! reachable requests go straight out; while it is not, mutating requests are
//! queued for the next drain and reads fail.

use std::sync::Arc;

use serde_json::Value;

use crate::api::ApiClient;
use crate::error::QueueError;
use crate::sync::queue::{OfflineQueue, Queued, RemoteSync};
use crate::sync::request::HttpMethod;

#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    /// Offline: the request was stored and will be replayed later.
    Queued(Queued),
    /// Online: the server's decoded JSON answer (`Null` for empty bodies).
    Completed(Value),
}

pub struct OfflineFetch<R> {
    api: Arc<ApiClient>,
    queue: Arc<OfflineQueue<R>>,
    /// Cleared when the store could not be opened at startup.
    offline_support: bool,
}

impl<R: RemoteSync> OfflineFetch<R> {
    pub fn new(api: Arc<ApiClient>, queue: Arc<OfflineQueue<R>>) -> Self {
        Self {
            api,
            queue,
            offline_support: true,
        }
    }

    /// Enable or disable queuing for the rest of the session.
    pub fn with_offline_support(mut self, enabled: bool) -> Self {
        self.offline_support = enabled;
        self
    }

    pub fn offline_support(&self) -> bool {
        self.offline_support
    }

    /// Send `method url` with an optional JSON body.
    ///
    /// Offline, a `GET` fails with `InvalidOfflineOperation` and a mutating
    /// request is queued. With offline support disabled, or a store that
    /// cannot be opened, mutating calls fail with `StorageUnavailable` rather
    /// than dropping the request.
    pub async fn send(
        &self,
        method: HttpMethod,
        url: &str,
        payload: Option<Value>,
    ) -> Result<FetchOutcome, QueueError> {
        if !self.queue.monitor().is_online() {
            if !self.offline_support && method.is_mutating() {
                return Err(QueueError::StorageUnavailable(
                    "offline support disabled for this session".to_string(),
                ));
            }
            let payload = payload.unwrap_or(Value::Null);
            return self
                .queue
                .enqueue(url, method, &payload)
                .map(FetchOutcome::Queued);
        }

        self.api
            .request_json(method.to_reqwest(), url, payload.as_ref())
            .await
            .map(FetchOutcome::Completed)
            .map_err(QueueError::Request)
    }

    pub async fn get(&self, url: &str) -> Result<FetchOutcome, QueueError> {
        self.send(HttpMethod::Get, url, None).await
    }

    pub async fn post(&self, url: &str, payload: Value) -> Result<FetchOutcome, QueueError> {
        self.send(HttpMethod::Post, url, Some(payload)).await
    }

    pub async fn patch(&self, url: &str, payload: Value) -> Result<FetchOutcome, QueueError> {
        self.send(HttpMethod::Patch, url, Some(payload)).await
    }

    pub async fn put(&self, url: &str, payload: Value) -> Result<FetchOutcome, QueueError> {
        self.send(HttpMethod::Put, url, Some(payload)).await
    }

    pub async fn delete(&self, url: &str) -> Result<FetchOutcome, QueueError> {
        self.send(HttpMethod::Delete, url, None).await
    }
}
