//! Bridge topology: control messages are re-published onto the event bus
//!
//! The record key is the agent id, so partitioning preserves per-agent
//! order for the downstream consumer that performs admission. In this
//! topology the pipeline never touches the state store.

use std::sync::Arc;

use async_trait::async_trait;

use tether_api::message::ControlMessage;
use tether_common::TetherError;

use crate::bridge::{EventBusProducer, bridge_headers};
use crate::metrics::{self, Disposition};
use crate::pipeline::{ControlMessageSink, Inbound, classify};

pub struct BridgeSink {
    producer: Arc<EventBusProducer>,
}

impl BridgeSink {
    pub fn new(producer: Arc<EventBusProducer>) -> Self {
        Self { producer }
    }

    /// Validate one publish and produce its record key. `None` means
    /// the message is dropped (malformed topic, empty payload, data
    /// traffic, unparseable envelope).
    fn prepare(raw_topic: &str, payload: &[u8]) -> Option<String> {
        let parsed = match classify(raw_topic, payload) {
            Inbound::Control(parsed) => parsed,
            Inbound::Dropped => return None,
        };
        if let Err(e) = serde_json::from_slice::<ControlMessage>(payload) {
            metrics::record_message("control", Disposition::ParseError);
            tracing::error!(
                client_id = %parsed.client_id,
                error = %e,
                "Dropping unparseable control message"
            );
            return None;
        }
        Some(parsed.client_id)
    }
}

#[async_trait]
impl ControlMessageSink for BridgeSink {
    async fn handle(
        &self,
        raw_topic: &str,
        payload: &[u8],
        mqtt_message_id: u16,
    ) -> Result<(), TetherError> {
        let Some(client_id) = Self::prepare(raw_topic, payload) else {
            return Ok(());
        };

        let headers = bridge_headers(raw_topic, mqtt_message_id);
        match self
            .producer
            .publish(&client_id, payload.to_vec(), headers)
            .await
        {
            Ok(()) => {
                metrics::record_bridge_publish(true);
                metrics::record_message("control", Disposition::Handled);
                tracing::debug!(client_id = %client_id, "Control message bridged");
                Ok(())
            }
            Err(e) => {
                // An uncategorized event-bus failure is fatal: the
                // process must not keep consuming traffic it drops.
                metrics::record_bridge_publish(false);
                tracing::error!(client_id = %client_id, error = %e, "Event-bus publish failed");
                Err(TetherError::Fatal(e.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn online_payload() -> Vec<u8> {
        serde_json::to_vec(&json!({
            "type": "connection-status",
            "message_id": "m1",
            "version": 1,
            "sent": "2024-01-01T00:00:00Z",
            "content": {"state": "online", "dispatchers": {}}
        }))
        .unwrap()
    }

    #[test]
    fn test_prepare_keys_by_client_id() {
        let key = BridgeSink::prepare("redhat/insights/c1/control/out", &online_payload());
        assert_eq!(key.as_deref(), Some("c1"));
    }

    #[test]
    fn test_prepare_drops_invalid_input() {
        assert!(BridgeSink::prepare("redhat/insights/c1/control/out", b"not json").is_none());
        assert!(BridgeSink::prepare("redhat/insights/c1/control/out", b"").is_none());
        assert!(BridgeSink::prepare("redhat/insights/c1/data/out", &online_payload()).is_none());
        assert!(BridgeSink::prepare("redhat/bogus", &online_payload()).is_none());
    }
}
