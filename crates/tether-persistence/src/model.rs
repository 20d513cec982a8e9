//! Domain model for connection state
//!
//! `ConnectorClientState` is the per-agent record held by the store;
//! the opaque JSON documents (canonical facts, dispatchers, tags) are
//! kept as `serde_json::Value` trees to preserve round-trip fidelity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use tether_common::TetherError;

use crate::entity::connections;

/// Id and send-time of the most recent handshake message that produced
/// a record; used to filter duplicate and out-of-order handshakes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageMetadata {
    pub latest_message_id: String,
    pub latest_timestamp: DateTime<Utc>,
}

/// The per-agent record; one row per agent id
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConnectorClientState {
    pub client_id: String,
    /// Tenant identifier; empty while tenant resolution is pending
    pub org_id: String,
    /// Legacy tenant identifier; paired with `org_id`
    pub account: String,
    pub canonical_facts: Option<Value>,
    pub dispatchers: Value,
    pub tags: Value,
    pub message_metadata: MessageMetadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub stale_timestamp: DateTime<Utc>,
    pub tenant_lookup_timestamp: Option<DateTime<Utc>>,
    pub tenant_lookup_failure_count: i32,
}

impl ConnectorClientState {
    /// True when the dispatcher document advertises the given capability.
    pub fn has_dispatcher(&self, name: &str) -> bool {
        self.dispatchers
            .as_object()
            .is_some_and(|d| d.contains_key(name))
    }

    /// True when canonical facts are present and non-empty.
    pub fn has_canonical_facts(&self) -> bool {
        match &self.canonical_facts {
            Some(Value::Object(m)) => !m.is_empty(),
            Some(Value::Null) | None => false,
            Some(_) => true,
        }
    }
}

/// One page of a listing plus the total row count
#[derive(Clone, Debug)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
}

fn parse_document(raw: &str, column: &str) -> Result<Value, TetherError> {
    serde_json::from_str(raw)
        .map_err(|e| TetherError::Fatal(format!("malformed {} document: {}", column, e)))
}

impl TryFrom<connections::Model> for ConnectorClientState {
    type Error = TetherError;

    fn try_from(model: connections::Model) -> Result<Self, Self::Error> {
        let canonical_facts = model
            .canonical_facts
            .as_deref()
            .map(|raw| parse_document(raw, "canonical_facts"))
            .transpose()?;
        Ok(ConnectorClientState {
            client_id: model.client_id,
            org_id: model.org_id,
            account: model.account,
            canonical_facts,
            dispatchers: parse_document(&model.dispatchers, "dispatchers")?,
            tags: parse_document(&model.tags, "tags")?,
            message_metadata: MessageMetadata {
                latest_message_id: model.latest_message_id,
                latest_timestamp: model.latest_timestamp,
            },
            created_at: model.created_at,
            updated_at: model.updated_at,
            stale_timestamp: model.stale_timestamp,
            tenant_lookup_timestamp: model.tenant_lookup_timestamp,
            tenant_lookup_failure_count: model.tenant_lookup_failure_count,
        })
    }
}
