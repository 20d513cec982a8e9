//! Inventory reporting capability
//!
//! Emits a "host seen" event for an agent onto the event bus so the
//! platform's inventory vouches for its presence. Canonical facts are
//! cleaned before emission: an `insights_id` that is not a valid UUID
//! is dropped, everything else passes through untouched.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Duration;
use serde_json::{Value, json};
use uuid::Uuid;

use tether_common::{INVENTORY_REPORTER, TetherError, utils::rfc3339};
use tether_persistence::ConnectorClientState;

use crate::bridge::EventBusProducer;
use crate::metrics;

#[async_trait]
pub trait InventoryReporter: Send + Sync {
    /// Emit a host-seen event for the agent's current state.
    async fn report(
        &self,
        identity: &str,
        state: &ConnectorClientState,
    ) -> Result<(), TetherError>;
}

/// Event-bus backed reporter
pub struct KafkaInventoryReporter {
    producer: Arc<EventBusProducer>,
    /// How long inventory keeps vouching for a host after one report
    stale_offset: Duration,
}

impl KafkaInventoryReporter {
    pub fn new(producer: Arc<EventBusProducer>, stale_offset: Duration) -> Self {
        Self {
            producer,
            stale_offset,
        }
    }
}

/// The host-seen event: agent id, cleaned canonical facts, the
/// staleness window, and the reporter name.
pub fn host_seen_envelope(
    identity: &str,
    state: &ConnectorClientState,
    stale_timestamp: chrono::DateTime<chrono::Utc>,
) -> Value {
    let facts = state
        .canonical_facts
        .clone()
        .map(clean_canonical_facts)
        .unwrap_or_else(|| json!({}));
    json!({
        "operation": "add_host",
        "platform_metadata": { "b64_identity": identity },
        "data": {
            "account": state.account,
            "org_id": state.org_id,
            "canonical_facts": facts,
            "stale_timestamp": rfc3339(stale_timestamp),
            "reporter": INVENTORY_REPORTER,
            "system_profile": { "rhc_client_id": state.client_id },
        },
    })
}

#[async_trait]
impl InventoryReporter for KafkaInventoryReporter {
    async fn report(
        &self,
        identity: &str,
        state: &ConnectorClientState,
    ) -> Result<(), TetherError> {
        let stale_timestamp = tether_common::now_utc() + self.stale_offset;
        let envelope = host_seen_envelope(identity, state, stale_timestamp);
        let value = serde_json::to_vec(&envelope).map_err(TetherError::fatal)?;
        self.producer
            .publish(&state.client_id, value, BTreeMap::new())
            .await
            .map_err(TetherError::transient)?;
        metrics::record_inventory_report();
        tracing::debug!(client_id = %state.client_id, "Host-seen event emitted");
        Ok(())
    }
}

/// Reporter that drops events, for development and the bridge topology.
pub struct NoopInventoryReporter;

#[async_trait]
impl InventoryReporter for NoopInventoryReporter {
    async fn report(
        &self,
        _identity: &str,
        state: &ConnectorClientState,
    ) -> Result<(), TetherError> {
        tracing::debug!(client_id = %state.client_id, "Inventory reporting disabled");
        Ok(())
    }
}

/// Drop an `insights_id` fact that is not a valid UUID; all other
/// facts pass through.
pub fn clean_canonical_facts(mut facts: Value) -> Value {
    if let Some(map) = facts.as_object_mut() {
        let valid = map
            .get("insights_id")
            .and_then(Value::as_str)
            .is_none_or(|id| Uuid::parse_str(id).is_ok());
        if !valid {
            map.remove("insights_id");
        }
    }
    facts
}

#[cfg(test)]
mod tests {
    use super::*;
    use tether_persistence::MessageMetadata;

    #[test]
    fn test_host_seen_envelope_shape() {
        let now = tether_common::now_utc();
        let state = ConnectorClientState {
            client_id: "c1".to_string(),
            org_id: "org-1".to_string(),
            account: "0001".to_string(),
            canonical_facts: Some(json!({"fqdn": "host.example.com", "insights_id": "junk"})),
            dispatchers: json!({"rhc-worker-playbook": {}}),
            tags: json!({}),
            message_metadata: MessageMetadata {
                latest_message_id: "m1".to_string(),
                latest_timestamp: now,
            },
            created_at: now,
            updated_at: now,
            stale_timestamp: now,
            tenant_lookup_timestamp: None,
            tenant_lookup_failure_count: 0,
        };

        let envelope = host_seen_envelope("aWRlbnRpdHk=", &state, now + Duration::hours(26));
        assert_eq!(envelope["operation"], "add_host");
        assert_eq!(envelope["platform_metadata"]["b64_identity"], "aWRlbnRpdHk=");
        assert_eq!(envelope["data"]["org_id"], "org-1");
        assert_eq!(envelope["data"]["reporter"], INVENTORY_REPORTER);
        assert_eq!(envelope["data"]["system_profile"]["rhc_client_id"], "c1");
        // the bad insights_id was cleaned away
        assert!(envelope["data"]["canonical_facts"].get("insights_id").is_none());
        assert_eq!(envelope["data"]["canonical_facts"]["fqdn"], "host.example.com");
    }

    #[test]
    fn test_clean_drops_invalid_insights_id() {
        let facts = json!({
            "insights_id": "not-a-uuid",
            "fqdn": "host.example.com",
        });
        let cleaned = clean_canonical_facts(facts);
        assert!(cleaned.get("insights_id").is_none());
        assert_eq!(cleaned["fqdn"], "host.example.com");
    }

    #[test]
    fn test_clean_keeps_valid_insights_id() {
        let facts = json!({
            "insights_id": "3a57b1ad-5163-47ee-9e57-3bb6d90bdfff",
            "mac_addresses": ["00:00:00:00:00:01"],
        });
        let cleaned = clean_canonical_facts(facts.clone());
        assert_eq!(cleaned, facts);
    }

    #[test]
    fn test_clean_ignores_non_string_id_and_non_object() {
        let facts = json!({"insights_id": 42});
        let cleaned = clean_canonical_facts(facts);
        assert_eq!(cleaned["insights_id"], 42);

        let scalar = json!("opaque");
        assert_eq!(clean_canonical_facts(scalar.clone()), scalar);
    }
}
