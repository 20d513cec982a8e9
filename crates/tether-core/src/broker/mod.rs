//! Broker adapter
//!
//! Publish paths to agents plus the subscription loop. Reconnect
//! signalling after an admission failure is a distinct method on the
//! adapter rather than part of the generic publish path.

pub mod listener;

use std::time::Duration;

use async_trait::async_trait;
use rumqttc::{AsyncClient, QoS};

use tether_api::message::{CommandContent, ControlMessage, DataMessage};
use tether_api::topic;
use tether_common::TetherError;

use crate::metrics;

/// Map a configured QoS level onto the broker client's type.
pub fn qos_from_level(level: u8) -> QoS {
    match level {
        0 => QoS::AtMostOnce,
        1 => QoS::AtLeastOnce,
        _ => QoS::ExactlyOnce,
    }
}

#[async_trait]
pub trait BrokerPublisher: Send + Sync {
    /// Publish a directed payload to the agent's incoming data topic.
    async fn publish_data(
        &self,
        client_id: &str,
        message: &DataMessage,
    ) -> Result<(), TetherError>;

    /// Publish a command to the agent's incoming control topic.
    async fn publish_control(
        &self,
        client_id: &str,
        message: &ControlMessage,
    ) -> Result<(), TetherError>;

    /// Tell the agent to drop its session and reconnect after `delay`
    /// seconds. Used as side-channel control after admission failures.
    async fn send_reconnect(&self, client_id: &str, delay_seconds: i64) -> Result<(), TetherError> {
        let message = ControlMessage::command(CommandContent::reconnect(delay_seconds));
        self.publish_control(client_id, &message).await?;
        metrics::record_reconnect_sent();
        Ok(())
    }
}

/// MQTT-backed publisher
pub struct MqttBroker {
    client: AsyncClient,
    topic_prefix: String,
    control_qos: QoS,
    data_qos: QoS,
    publish_timeout: Duration,
}

impl MqttBroker {
    pub fn new(
        client: AsyncClient,
        topic_prefix: String,
        control_qos: u8,
        data_qos: u8,
        publish_timeout: Duration,
    ) -> Self {
        Self {
            client,
            topic_prefix,
            control_qos: qos_from_level(control_qos),
            data_qos: qos_from_level(data_qos),
            publish_timeout,
        }
    }

    async fn publish(
        &self,
        kind: &'static str,
        topic: String,
        qos: QoS,
        payload: Vec<u8>,
    ) -> Result<(), TetherError> {
        let result =
            tokio::time::timeout(self.publish_timeout, self.client.publish(topic, qos, false, payload))
                .await;
        match result {
            Ok(Ok(())) => {
                metrics::record_broker_publish(kind, true);
                Ok(())
            }
            Ok(Err(e)) => {
                metrics::record_broker_publish(kind, false);
                Err(TetherError::transient(e))
            }
            Err(_) => {
                metrics::record_broker_publish(kind, false);
                Err(TetherError::Transient("broker publish timeout".to_string()))
            }
        }
    }
}

#[async_trait]
impl BrokerPublisher for MqttBroker {
    async fn publish_data(
        &self,
        client_id: &str,
        message: &DataMessage,
    ) -> Result<(), TetherError> {
        let payload = serde_json::to_vec(message).map_err(TetherError::fatal)?;
        let topic = topic::data_in(&self.topic_prefix, client_id);
        self.publish("data", topic, self.data_qos, payload).await
    }

    async fn publish_control(
        &self,
        client_id: &str,
        message: &ControlMessage,
    ) -> Result<(), TetherError> {
        let payload = serde_json::to_vec(message).map_err(TetherError::fatal)?;
        let topic = topic::control_in(&self.topic_prefix, client_id);
        self.publish("control", topic, self.control_qos, payload).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qos_mapping() {
        assert_eq!(qos_from_level(0), QoS::AtMostOnce);
        assert_eq!(qos_from_level(1), QoS::AtLeastOnce);
        assert_eq!(qos_from_level(2), QoS::ExactlyOnce);
    }
}
