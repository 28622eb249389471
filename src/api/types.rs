//! Request bodies for the offline-actions API.
//!
//! Field names are snake_case to match the backend's JSON format.

use serde::Serialize;
use serde_json::Value;

use crate::sync::request::{HttpMethod, PendingRequest};

/// Kind of change an offline action represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionType {
    Create,
    Update,
    Delete,
}

impl ActionType {
    /// Map a mutating HTTP method to the action it performs.
    pub fn from_method(method: HttpMethod) -> Self {
        match method {
            HttpMethod::Put | HttpMethod::Patch => ActionType::Update,
            HttpMethod::Delete => ActionType::Delete,
            HttpMethod::Post | HttpMethod::Get => ActionType::Create,
        }
    }
}

/// Body sent to POST {actions} for one queued request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionRecord {
    pub action_type: ActionType,
    pub resource_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<String>,
    pub data: Value,
}

impl ActionRecord {
    pub fn from_pending(request: &PendingRequest) -> Self {
        Self {
            action_type: ActionType::from_method(request.method),
            resource_type: resource_type(&request.url),
            resource_id: resource_id(&request.url, &request.payload),
            data: request.payload.clone(),
        }
    }
}

/// Body sent to POST {bulk_sync} when the client passes its snapshot.
#[derive(Debug, Serialize)]
pub struct BulkSyncRequest<'a> {
    pub actions: &'a [PendingRequest],
}

fn path_segments(url: &str) -> Vec<&str> {
    let path = url.split(['?', '#']).next().unwrap_or_default();
    let path = match path.find("://") {
        // Drop scheme and host from absolute urls.
        Some(i) => path[i + 3..].split_once('/').map(|(_, p)| p).unwrap_or_default(),
        None => path,
    };
    path.split('/').filter(|s| !s.is_empty()).collect()
}

fn is_identifier(segment: &str) -> bool {
    segment.starts_with(|c: char| c.is_ascii_digit())
}

/// Last path segment naming a collection, skipping trailing ids.
pub fn resource_type(url: &str) -> String {
    path_segments(url)
        .into_iter()
        .rev()
        .find(|s| !is_identifier(s))
        .unwrap_or("unknown")
        .to_string()
}

/// `payload.id` when present, otherwise a trailing id segment of the url.
pub fn resource_id(url: &str, payload: &Value) -> Option<String> {
    match payload.get("id") {
        Some(Value::String(s)) => return Some(s.clone()),
        Some(Value::Number(n)) => return Some(n.to_string()),
        _ => {}
    }
    path_segments(url)
        .last()
        .filter(|s| is_identifier(s))
        .map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    fn pending(url: &str, method: HttpMethod, payload: Value) -> PendingRequest {
        PendingRequest {
            id: "p-1".to_string(),
            url: url.to_string(),
            method,
            payload,
            enqueued_at: Utc::now(),
        }
    }

    #[test]
    fn test_action_type_mapping() {
        assert_eq!(ActionType::from_method(HttpMethod::Post), ActionType::Create);
        assert_eq!(ActionType::from_method(HttpMethod::Put), ActionType::Update);
        assert_eq!(ActionType::from_method(HttpMethod::Patch), ActionType::Update);
        assert_eq!(ActionType::from_method(HttpMethod::Delete), ActionType::Delete);
    }

    #[test]
    fn test_resource_type_skips_ids_and_query() {
        assert_eq!(resource_type("/bookings/42"), "bookings");
        assert_eq!(resource_type("/api/bookings/"), "bookings");
        assert_eq!(resource_type("/reviews?draft=1"), "reviews");
        assert_eq!(resource_type("https://api.dodo.test/vendors/7/services"), "services");
        assert_eq!(resource_type("/"), "unknown");
        assert_eq!(resource_type("/42"), "unknown");
    }

    #[test]
    fn test_resource_id_prefers_payload() {
        assert_eq!(resource_id("/bookings/42", &json!({ "id": "b-9" })), Some("b-9".to_string()));
        assert_eq!(resource_id("/bookings", &json!({ "id": 17 })), Some("17".to_string()));
        assert_eq!(resource_id("/bookings/42", &json!({ "status": "x" })), Some("42".to_string()));
        assert_eq!(resource_id("/bookings", &json!(null)), None);
    }

    #[test]
    fn test_action_record_body() {
        let record = ActionRecord::from_pending(&pending(
            "/bookings/42",
            HttpMethod::Patch,
            json!({ "status": "cancelled" }),
        ));

        let body = serde_json::to_value(&record).unwrap();
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

    #[test]
    fn test_action_record_omits_missing_id() {
        let record = ActionRecord::from_pending(&pending(
            "/bookings",
            HttpMethod::Post,
            json!({ "service": "cleaning" }),
        ));
        let body = serde_json::to_value(&record).unwrap();
        assert!(body.get("resource_id").is_none());
        assert_eq!(body["action_type"], "create");
    }
}
