//! HTTP client with bearer-token injection.
//!
//! Paths are relative to the API base URL; absolute `http(s)://` urls are
//! used as given.

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, Method, Response};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::RwLock;

/// HTTP client wrapper for marketplace API communication.
///
/// Manages base URL and access token for every request.
pub struct ApiClient {
    client: Client,
    base_url: String,
    access_token: Arc<RwLock<Option<String>>>,
}

impl ApiClient {
    /// Create a new API client with the given base URL.
    pub fn new(base_url: &str) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            access_token: Arc::new(RwLock::new(None)),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Store the access token for authenticated requests.
    pub async fn set_access_token(&self, token: String) {
        let mut guard = self.access_token.write().await;
        *guard = Some(token);
    }

    /// Clear the access token (used on logout).
    pub async fn clear_access_token(&self) {
        let mut guard = self.access_token.write().await;
        *guard = None;
    }

    /// Resolve a path against the base URL.
    pub fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    /// Send an authenticated POST request with a JSON body to a relative API path.
    pub async fn authenticated_post<T: Serialize>(
        &self,
        path: &str,
        body: &T,
    ) -> Result<Response, reqwest::Error> {
        self.authenticated_request(Method::POST, path, Some(body))
            .await
    }

    /// Send an authenticated request with an optional JSON body.
    pub async fn authenticated_request<T: Serialize>(
        &self,
        method: Method,
        path: &str,
        body: Option<&T>,
    ) -> Result<Response, reqwest::Error> {
        let url = self.url(path);
        let token = self.access_token.read().await.clone();

        let mut builder = self
            .client
            .request(method, &url)
            .header("Content-Type", "application/json");

        if let Some(body) = body {
            builder = builder.json(body);
        }
        if let Some(ref t) = token {
            builder = builder.bearer_auth(t);
        }

        builder.send().await
    }

    /// Send an authenticated request and decode the JSON answer.
    ///
    /// Empty bodies decode to `Value::Null`.
    pub async fn request_json(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Value, String> {
        let resp = self
            .authenticated_request(method.clone(), path, body)
            .await
            .map_err(|e| format!("{} {} failed: {}", method, path, e))?;

        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(format!("{} {} failed ({}): {}", method, path, status, text));
        }
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }

        serde_json::from_str(&text)
            .map_err(|e| format!("Failed to parse response from {}: {}", path, e))
    }

    /// Cache-busting HEAD request used for reachability checks.
    pub async fn head_no_cache(
        &self,
        path: &str,
        timeout: Duration,
    ) -> Result<Response, reqwest::Error> {
        let separator = if path.contains('?') { '&' } else { '?' };
        let url = format!(
            "{}{}_={}",
            self.url(path),
            separator,
            chrono::Utc::now().timestamp_millis()
        );

        self.client
            .head(&url)
            .timeout(timeout)
            .header("Cache-Control", "no-cache, no-store, must-revalidate")
            .header("Pragma", "no-cache")
            .header("Expires", "0")
            .send()
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_resolution() {
        let client = ApiClient::new("https://api.dodo.test/");
        assert_eq!(client.base_url(), "https://api.dodo.test");
        assert_eq!(client.url("/bookings/42"), "https://api.dodo.test/bookings/42");
        assert_eq!(client.url("bookings"), "https://api.dodo.test/bookings");
        assert_eq!(client.url("https://other.test/x"), "https://other.test/x");
    }
}
