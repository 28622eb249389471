//! Offline-actions endpoints and the health probe.
//!
//! `HttpRemote` is the production [`RemoteSync`] and [`HealthProbe`]: it talks
//! to the bulk-sync and per-item action routes and replays queued requests
//! against their original urls.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use super::client::ApiClient;
use super::types::{ActionRecord, BulkSyncRequest};
use crate::config::Endpoints;
use crate::network::HealthProbe;
use crate::sync::queue::RemoteSync;
use crate::sync::request::PendingRequest;

pub struct HttpRemote {
    api: Arc<ApiClient>,
    endpoints: Endpoints,
    /// Include the snapshot in the bulk-sync body.
    bulk_snapshot: bool,
    probe_timeout: Duration,
}

impl HttpRemote {
    pub fn new(
        api: Arc<ApiClient>,
        endpoints: Endpoints,
        bulk_snapshot: bool,
        probe_timeout: Duration,
    ) -> Self {
        Self {
            api,
            endpoints,
            bulk_snapshot,
            probe_timeout,
        }
    }
}

/// POST {bulk_sync}: ask the server to apply every pending action.
pub async fn sync_all(
    client: &ApiClient,
    path: &str,
    snapshot: Option<&[PendingRequest]>,
) -> Result<(), String> {
    let resp = match snapshot {
        Some(actions) => {
            client
                .authenticated_post(path, &BulkSyncRequest { actions })
                .await
        }
        None => client.authenticated_post(path, &serde_json::json!({})).await,
    }
    .map_err(|e| format!("Bulk sync request failed: {}", e))?;

    if !resp.status().is_success() {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        return Err(format!("Bulk sync failed ({}): {}", status, body));
    }

    Ok(())
}

/// POST {actions}: record one queued request as an offline action.
pub async fn record_action(
    client: &ApiClient,
    path: &str,
    request: &PendingRequest,
) -> Result<(), String> {
    let record = ActionRecord::from_pending(request);
    let resp = client
        .authenticated_post(path, &record)
        .await
        .map_err(|e| format!("Recording action failed: {}", e))?;

    if !resp.status().is_success() {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        return Err(format!("Recording action failed ({}): {}", status, body));
    }

    Ok(())
}

/// Send the queued request to its own url with its own method.
pub async fn replay_direct(client: &ApiClient, request: &PendingRequest) -> Result<(), String> {
    let body = match &request.payload {
        Value::Null => None,
        payload => Some(payload),
    };
    client
        .request_json(request.method.to_reqwest(), &request.url, body)
        .await
        .map(|_| ())
}

impl RemoteSync for HttpRemote {
    async fn sync_all(&self, snapshot: &[PendingRequest]) -> Result<(), String> {
        let snapshot = self.bulk_snapshot.then_some(snapshot);
        sync_all(&self.api, &self.endpoints.bulk_sync, snapshot).await
    }

    async fn record_action(&self, request: &PendingRequest) -> Result<(), String> {
        record_action(&self.api, &self.endpoints.actions, request).await?;
        log::info!("Request {} saved to backend offline actions store", request.id);
        Ok(())
    }

    async fn replay_direct(&self, request: &PendingRequest) -> Result<(), String> {
        replay_direct(&self.api, request).await
    }
}

impl HealthProbe for HttpRemote {
    async fn check(&self) -> bool {
        match self
            .api
            .head_no_cache(&self.endpoints.health, self.probe_timeout)
            .await
        {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                log::debug!("Health check failed: {}", e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use chrono::Utc;
    use serde_json::json;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    use crate::network::ReachabilityMonitor;
    use crate::sync::queue::{DrainStrategy, OfflineQueue};
    use crate::sync::request::HttpMethod;
    use crate::sync::store::PendingStore;

    /// One request as seen by the local server.
    #[derive(Debug, Clone)]
    struct Captured {
        head: String,
        body: String,
    }

    impl Captured {
        fn request_line(&self) -> &str {
            self.head.lines().next().unwrap_or("")
        }

        fn has_header(&self, name: &str, value: &str) -> bool {
            self.head.lines().any(|line| {
                line.split_once(':').is_some_and(|(k, v)| {
                    k.trim().eq_ignore_ascii_case(name) && v.trim() == value
                })
            })
        }
    }

    /// Local HTTP server answering each connection with the next scripted
    /// status (the last one repeats).
    async fn scripted_server(statuses: Vec<u16>) -> (String, Arc<Mutex<Vec<Captured>>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);

        tokio::spawn(async move {
            let mut statuses = statuses.into_iter();
            let mut last = 200;
            while let Ok((mut socket, _)) = listener.accept().await {
                let status = statuses.next().unwrap_or(last);
                last = status;
                if let Some(captured) = read_request(&mut socket).await {
                    sink.lock().unwrap().push(captured);
                }
                let length = if status == 204 { "" } else { "content-length: 0\r\n" };
                let reply = format!(
                    "HTTP/1.1 {} Scripted\r\n{}connection: close\r\n\r\n",
                    status, length
                );
                let _ = socket.write_all(reply.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });

        (format!("http://{}", addr), seen)
    }

    async fn read_request(socket: &mut TcpStream) -> Option<Captured> {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 1024];
        let header_end = loop {
            let n = socket.read(&mut chunk).await.ok()?;
            if n == 0 {
                return None;
            }
            buf.extend_from_slice(&chunk[..n]);
            if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                break pos + 4;
            }
        };

        let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
        let length = head
            .lines()
            .filter_map(|line| line.split_once(':'))
            .find(|(k, _)| k.trim().eq_ignore_ascii_case("content-length"))
            .and_then(|(_, v)| v.trim().parse::<usize>().ok())
            .unwrap_or(0);

        while buf.len() < header_end + length {
            let n = socket.read(&mut chunk).await.ok()?;
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
        }

        let body = String::from_utf8_lossy(&buf[header_end..]).to_string();
        Some(Captured { head, body })
    }

    fn remote(base_url: &str, bulk_snapshot: bool) -> HttpRemote {
        HttpRemote::new(
            Arc::new(ApiClient::new(base_url)),
            Endpoints::default(),
            bulk_snapshot,
            Duration::from_secs(2),
        )
    }

    fn cancel_booking() -> PendingRequest {
        PendingRequest {
            id: "req-1".to_string(),
            url: "/bookings/42".to_string(),
            method: HttpMethod::Patch,
            payload: json!({ "status": "cancelled" }),
            enqueued_at: Utc::now(),
        }
    }

    fn captured(seen: &Arc<Mutex<Vec<Captured>>>) -> Vec<Captured> {
        seen.lock().unwrap().clone()
    }

    // ── Health check ─────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_health_check_online_only_for_2xx() {
        let (base, seen) = scripted_server(vec![204, 503, 404]).await;
        let remote = remote(&base, false);

        assert!(remote.check().await);
        assert!(!remote.check().await);
        assert!(!remote.check().await);

        let requests = captured(&seen);
        assert_eq!(requests.len(), 3);
        assert!(requests[0].request_line().starts_with("HEAD /api/health-check?_="));
    }

    #[tokio::test]
    async fn test_health_check_disables_caching() {
        let (base, seen) = scripted_server(vec![200]).await;
        let remote = remote(&base, false);

        assert!(remote.check().await);

        let request = &captured(&seen)[0];
        let target = request.request_line().split(' ').nth(1).unwrap_or("");
        let stamp = target.split_once("?_=").map(|(_, ts)| ts).unwrap_or("");
        assert!(stamp.parse::<i64>().is_ok(), "missing cache buster in {}", target);
        assert!(request.has_header("cache-control", "no-cache, no-store, must-revalidate"));
        assert!(request.has_header("pragma", "no-cache"));
        assert!(request.has_header("expires", "0"));
    }

    #[tokio::test]
    async fn test_health_check_unreachable_is_offline() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        assert!(!remote(&format!("http://{}", addr), false).check().await);
    }

    // ── Bulk sync ────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_bulk_sync_status_handling() {
        let (base, seen) = scripted_server(vec![200, 503]).await;
        let remote = remote(&base, false);
        let snapshot = [cancel_booking()];

        assert!(RemoteSync::sync_all(&remote, &snapshot).await.is_ok());
        let err = RemoteSync::sync_all(&remote, &snapshot).await.unwrap_err();
        assert!(err.contains("503"), "unexpected error: {}", err);

        let requests = captured(&seen);
        assert_eq!(requests[0].request_line(), "POST /api/offline-actions/sync/ HTTP/1.1");
    }

    #[tokio::test]
    async fn test_bulk_body_follows_snapshot_setting() {
        let (base, seen) = scripted_server(vec![200]).await;
        let snapshot = [cancel_booking()];

        RemoteSync::sync_all(&remote(&base, false), &snapshot).await.unwrap();
        RemoteSync::sync_all(&remote(&base, true), &snapshot).await.unwrap();

        let requests = captured(&seen);
        let inferred: Value = serde_json::from_str(&requests[0].body).unwrap();
        assert_eq!(inferred, json!({}));

        let explicit: Value = serde_json::from_str(&requests[1].body).unwrap();
        let actions = explicit["actions"].as_array().unwrap();
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0]["id"], "req-1");
        assert_eq!(actions[0]["url"], "/bookings/42");
        assert_eq!(actions[0]["method"], "PATCH");
        assert_eq!(actions[0]["data"], json!({ "status": "cancelled" }));
    }

    // ── Per-item replay ──────────────────────────────────────────────────

    #[tokio::test]
    async fn test_record_action_sends_action_body() {
        let (base, seen) = scripted_server(vec![201, 500]).await;
        let remote = remote(&base, false);

        RemoteSync::record_action(&remote, &cancel_booking()).await.unwrap();
        assert!(RemoteSync::record_action(&remote, &cancel_booking()).await.is_err());

        let request = &captured(&seen)[0];
        assert_eq!(request.request_line(), "POST /api/offline-actions/ HTTP/1.1");
        let body: Value = serde_json::from_str(&request.body).unwrap();
        assert_eq!(
            body,
            json!({
                "action_type": "update",
                "resource_type": "bookings",
                "resource_id": "42",
                "data": { "status": "cancelled" },
            })
        );
    }

    #[tokio::test]
    async fn test_rejected_bulk_and_record_fall_back_to_direct_replay() {
        // Bulk sync 503, record action 404, direct PATCH 200.
        let (base, seen) = scripted_server(vec![503, 404, 200]).await;
        let queue = OfflineQueue::new(
            Arc::new(PendingStore::in_memory()),
            remote(&base, false),
            ReachabilityMonitor::new(true),
        );
        queue
            .enqueue("/bookings/42", HttpMethod::Patch, &json!({ "status": "cancelled" }))
            .unwrap();

        let report = queue.drain_all().await.unwrap();

        assert_eq!(report.strategy, DrainStrategy::PerItem);
        assert_eq!(report.synced, 1);
        assert_eq!(report.remaining, 0);

        let lines: Vec<String> = captured(&seen)
            .iter()
            .map(|c| c.request_line().to_string())
            .collect();
        assert_eq!(
            lines,
            vec![
                "POST /api/offline-actions/sync/ HTTP/1.1",
                "POST /api/offline-actions/ HTTP/1.1",
                "PATCH /bookings/42 HTTP/1.1",
            ]
        );
        let direct: Value = serde_json::from_str(&captured(&seen)[2].body).unwrap();
        assert_eq!(direct, json!({ "status": "cancelled" }));
    }

    #[tokio::test]
    async fn test_entry_stays_queued_when_every_path_fails() {
        let (base, _seen) = scripted_server(vec![503, 500, 502]).await;
        let queue = OfflineQueue::new(
            Arc::new(PendingStore::in_memory()),
            remote(&base, false),
            ReachabilityMonitor::new(true),
        );
        queue.enqueue("/bookings", HttpMethod::Post, &json!({ "slot": 1 })).unwrap();

        let report = queue.drain_all().await.unwrap();

        assert_eq!(report.failed, 1);
        assert_eq!(report.remaining, 1);
        assert_eq!(queue.pending_count().unwrap(), 1);
    }
}
