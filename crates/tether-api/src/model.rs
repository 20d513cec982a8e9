//! HTTP request/response models for the dispatch API
//!
//! Shapes are shared between the v1 (account-scoped) and v2
//! (org-scoped) surfaces; only the tenant identifier differs.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Body of `POST /connections/{id}/message`
#[derive(Clone, Debug, Deserialize)]
pub struct MessageRequest {
    pub directive: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(default)]
    pub metadata: Option<Value>,
}

/// `201` body: the broker message id assigned to the dispatched payload
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub id: String,
}

/// Body of `POST /connections/{id}/reconnect`
#[derive(Clone, Debug, Deserialize)]
pub struct ReconnectRequest {
    #[serde(default)]
    pub delay: i64,
}

/// Body of `GET /connections/{id}/status`
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConnectionStatusResponse {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub org_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub canonical_facts: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dispatchers: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Value>,
}

impl ConnectionStatusResponse {
    pub fn disconnected() -> Self {
        ConnectionStatusResponse {
            status: "disconnected".to_string(),
            account: None,
            org_id: None,
            client_id: None,
            canonical_facts: None,
            dispatchers: None,
            tags: None,
        }
    }
}

/// One row of `GET /connections`
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConnectionSummary {
    pub client_id: String,
    pub account: String,
    pub org_id: String,
}

/// Pagination metadata
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Meta {
    pub count: u64,
}

/// Pagination navigation links
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Links {
    pub first: String,
    pub last: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prev: Option<String>,
}

/// Paginated response envelope
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PaginatedResponse<T> {
    pub meta: Meta,
    pub links: Links,
    pub data: Vec<T>,
}

impl<T> PaginatedResponse<T> {
    /// Build a page with navigation links for the given base path.
    pub fn new(base_path: &str, offset: u64, limit: u64, total: u64, data: Vec<T>) -> Self {
        let link = |o: u64| format!("{}?offset={}&limit={}", base_path, o, limit);

        let last_offset = if total == 0 {
            0
        } else {
            ((total - 1) / limit) * limit
        };

        let next = if offset + limit < total {
            Some(link(offset + limit))
        } else {
            None
        };
        let prev = if offset > 0 {
            Some(link(offset.saturating_sub(limit)))
        } else {
            None
        };

        PaginatedResponse {
            meta: Meta { count: total },
            links: Links {
                first: link(0),
                last: link(last_offset),
                next,
                prev,
            },
            data,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_request_defaults() {
        let req: MessageRequest = serde_json::from_str(r#"{"directive":"d"}"#).unwrap();
        assert_eq!(req.directive, "d");
        assert!(req.payload.is_null());
        assert!(req.metadata.is_none());
    }

    #[test]
    fn test_status_disconnected_shape() {
        let body = serde_json::to_value(ConnectionStatusResponse::disconnected()).unwrap();
        assert_eq!(body, serde_json::json!({"status": "disconnected"}));
    }

    #[test]
    fn test_pagination_middle_page() {
        let page = PaginatedResponse::new("/api/tether/v2/connections", 10, 10, 35, vec![1, 2]);
        assert_eq!(page.meta.count, 35);
        assert_eq!(page.links.first, "/api/tether/v2/connections?offset=0&limit=10");
        assert_eq!(page.links.last, "/api/tether/v2/connections?offset=30&limit=10");
        assert_eq!(
            page.links.next.as_deref(),
            Some("/api/tether/v2/connections?offset=20&limit=10")
        );
        assert_eq!(
            page.links.prev.as_deref(),
            Some("/api/tether/v2/connections?offset=0&limit=10")
        );
    }

    #[test]
    fn test_pagination_single_page() {
        let page = PaginatedResponse::new("/c", 0, 50, 3, vec![1, 2, 3]);
        assert!(page.links.next.is_none());
        assert!(page.links.prev.is_none());
        assert_eq!(page.links.last, "/c?offset=0&limit=50");
    }

    #[test]
    fn test_pagination_empty() {
        let page: PaginatedResponse<i32> = PaginatedResponse::new("/c", 0, 10, 0, vec![]);
        assert_eq!(page.meta.count, 0);
        assert!(page.links.next.is_none());
        assert_eq!(page.links.last, "/c?offset=0&limit=10");
    }
}
