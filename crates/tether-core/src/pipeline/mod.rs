//! Inbound handshake pipeline
//!
//! Two topologies implement the same `ControlMessageSink` capability:
//! `DirectSink` turns control messages into state-store mutations,
//! `BridgeSink` re-publishes them onto the durable event bus for a
//! downstream consumer. A deployment selects exactly one; both must
//! not run simultaneously against the same set of agents.

pub mod bridge;
pub mod direct;

use async_trait::async_trait;

use tether_api::topic::{self, ParsedTopic, TopicDirection, TopicKind};
use tether_common::TetherError;

use crate::metrics::{self, Disposition};

pub use bridge::BridgeSink;
pub use direct::DirectSink;

#[async_trait]
pub trait ControlMessageSink: Send + Sync {
    /// Process one inbound broker publish. `mqtt_message_id` is the
    /// broker packet id, carried as a header in the bridge topology.
    async fn handle(
        &self,
        topic: &str,
        payload: &[u8],
        mqtt_message_id: u16,
    ) -> Result<(), TetherError>;
}

/// Classification of one inbound publish after topic decode and the
/// empty-payload short-circuit.
pub(crate) enum Inbound {
    /// A control-topic message to process
    Control(ParsedTopic),
    /// Everything that ends here: malformed topic, retained-message
    /// clear, data-plane traffic (transit only)
    Dropped,
}

/// Shared front of both topologies: decode the topic, drop malformed
/// ones with a metric, count data traffic, and short-circuit
/// zero-length payloads (retained message clears).
pub(crate) fn classify(raw_topic: &str, payload: &[u8]) -> Inbound {
    let parsed = match topic::parse(raw_topic) {
        Ok(parsed) => parsed,
        Err(e) => {
            metrics::record_message("unknown", Disposition::MalformedTopic);
            tracing::warn!(topic = %raw_topic, error = %e, "Dropping message on malformed topic");
            return Inbound::Dropped;
        }
    };

    if parsed.direction != TopicDirection::Out {
        metrics::record_message("unknown", Disposition::Ignored);
        tracing::debug!(topic = %raw_topic, "Ignoring non-agent-originated topic");
        return Inbound::Dropped;
    }

    if payload.is_empty() {
        // retained message clear
        metrics::record_message(parsed.kind.as_str(), Disposition::EmptyPayload);
        return Inbound::Dropped;
    }

    match parsed.kind {
        TopicKind::Control => Inbound::Control(parsed),
        TopicKind::Data => {
            metrics::record_message("data", Disposition::Handled);
            tracing::debug!(client_id = %parsed.client_id, "Data message observed in transit");
            Inbound::Dropped
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_control() {
        match classify("redhat/insights/c1/control/out", b"{}") {
            Inbound::Control(parsed) => assert_eq!(parsed.client_id, "c1"),
            Inbound::Dropped => panic!("control message dropped"),
        }
    }

    #[test]
    fn test_classify_drops() {
        assert!(matches!(
            classify("redhat/insights/c1/control", b"{}"),
            Inbound::Dropped
        ));
        assert!(matches!(
            classify("redhat/insights/c1/control/out", b""),
            Inbound::Dropped
        ));
        assert!(matches!(
            classify("redhat/insights/c1/data/out", b"{}"),
            Inbound::Dropped
        ));
        assert!(matches!(
            classify("redhat/insights/c1/control/in", b"{}"),
            Inbound::Dropped
        ));
    }
}
