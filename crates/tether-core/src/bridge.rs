//! Event-bus producer
//!
//! Records are routed to `hash(key) % partitions`, so all records for
//! one key land on one partition and per-key ordering holds
//! end-to-end. Partition clients are resolved once at startup.

use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};
use std::time::Duration;

use rskafka::client::ClientBuilder;
use rskafka::client::partition::{Compression, PartitionClient, UnknownTopicHandling};
use rskafka::record::Record;

/// Header carried on every bridged record: originating broker topic
pub const HEADER_TOPIC: &str = "topic";
/// Header carried on every bridged record: broker packet id
pub const HEADER_MQTT_MESSAGE_ID: &str = "mqtt_message_id";

/// Keyed producer for one event-bus topic
pub struct EventBusProducer {
    topic: String,
    partitions: Vec<PartitionClient>,
    publish_timeout: Duration,
}

impl EventBusProducer {
    /// Connect and resolve the partition set for `topic`.
    pub async fn connect(
        brokers: Vec<String>,
        topic: String,
        publish_timeout: Duration,
    ) -> anyhow::Result<Self> {
        let client = ClientBuilder::new(brokers).build().await?;
        let topics = client.list_topics().await?;
        let partition_ids = topics
            .into_iter()
            .find(|t| t.name == topic)
            .map(|t| t.partitions)
            .ok_or_else(|| anyhow::anyhow!("event-bus topic '{}' does not exist", topic))?;
        if partition_ids.is_empty() {
            anyhow::bail!("event-bus topic '{}' has no partitions", topic);
        }

        let mut partitions = Vec::with_capacity(partition_ids.len());
        for partition_id in partition_ids {
            partitions.push(
                client
                    .partition_client(topic.clone(), partition_id, UnknownTopicHandling::Retry)
                    .await?,
            );
        }
        tracing::info!(
            topic = %topic,
            partitions = partitions.len(),
            "Event-bus producer connected"
        );
        Ok(Self {
            topic,
            partitions,
            publish_timeout,
        })
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Publish one keyed record with headers. Callers classify the
    /// failure: fatal in the bridge path, retryable for inventory.
    pub async fn publish(
        &self,
        key: &str,
        value: Vec<u8>,
        headers: BTreeMap<String, Vec<u8>>,
    ) -> anyhow::Result<()> {
        let index = partition_for_key(key, self.partitions.len());
        let record = Record {
            key: Some(key.as_bytes().to_vec()),
            value: Some(value),
            headers,
            timestamp: chrono::Utc::now(),
        };
        tokio::time::timeout(
            self.publish_timeout,
            self.partitions[index].produce(vec![record], Compression::default()),
        )
        .await
        .map_err(|_| anyhow::anyhow!("event-bus publish deadline exceeded"))??;
        Ok(())
    }
}

/// Stable key-to-partition routing.
pub fn partition_for_key(key: &str, partitions: usize) -> usize {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    key.hash(&mut hasher);
    (hasher.finish() % partitions as u64) as usize
}

/// Headers for a bridged control message.
pub fn bridge_headers(topic: &str, mqtt_message_id: u16) -> BTreeMap<String, Vec<u8>> {
    BTreeMap::from([
        (HEADER_TOPIC.to_string(), topic.as_bytes().to_vec()),
        (
            HEADER_MQTT_MESSAGE_ID.to_string(),
            mqtt_message_id.to_string().into_bytes(),
        ),
    ])
}
