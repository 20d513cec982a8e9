//! Direct topology: control messages mutate the state store
//!
//! Online handshakes pass the duplicate/older guard, resolve identity,
//! register the connection, and fan out to the inventory and sources
//! reporters. Offline handshakes unregister unconditionally: the
//! broker emits them as the agent's last will, so they are always
//! authoritative.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use tether_api::message::{ConnectionState, ConnectionStatusContent, ControlMessage, EnvelopeType};
use tether_common::{DISPATCHER_PLAYBOOK, TetherError, now_utc};
use tether_persistence::{ConnectionStore, ConnectorClientState, MessageMetadata};

use crate::broker::BrokerPublisher;
use crate::identity::IdentityResolver;
use crate::inventory::InventoryReporter;
use crate::metrics::{self, Disposition};
use crate::pipeline::{ControlMessageSink, Inbound, classify};
use crate::sources::{CatalogEntry, SourcesReporter};

pub struct DirectSink {
    store: Arc<dyn ConnectionStore>,
    resolver: Arc<dyn IdentityResolver>,
    inventory: Arc<dyn InventoryReporter>,
    sources: Arc<dyn SourcesReporter>,
    broker: Arc<dyn BrokerPublisher>,
    /// Delay in seconds sent with reconnect-after-failure signals
    reconnect_delay: i64,
}

impl DirectSink {
    pub fn new(
        store: Arc<dyn ConnectionStore>,
        resolver: Arc<dyn IdentityResolver>,
        inventory: Arc<dyn InventoryReporter>,
        sources: Arc<dyn SourcesReporter>,
        broker: Arc<dyn BrokerPublisher>,
        reconnect_delay: i64,
    ) -> Self {
        Self {
            store,
            resolver,
            inventory,
            sources,
            broker,
            reconnect_delay,
        }
    }

    /// Online handshake admission.
    async fn handle_online(
        &self,
        client_id: &str,
        message: &ControlMessage,
        content: ConnectionStatusContent,
    ) -> Result<(), TetherError> {
        // Duplicate guard: an id we have already admitted, or a send
        // time behind the admitted one, never mutates the record.
        match self.store.find_by_client_id(client_id).await {
            Ok(current) => {
                let metadata = &current.message_metadata;
                if message.message_id == metadata.latest_message_id
                    || message.sent < metadata.latest_timestamp
                {
                    metrics::record_message("control", Disposition::Duplicate);
                    tracing::debug!(
                        client_id = %client_id,
                        message_id = %message.message_id,
                        "Dropping duplicate or older handshake"
                    );
                    return Ok(());
                }
            }
            Err(TetherError::NotFound) => {}
            Err(e) => return Err(e),
        }

        let resolved = match self.resolver.resolve(client_id).await {
            Ok(resolved) => resolved,
            Err(e) => {
                metrics::record_identity_failure();
                tracing::error!(
                    client_id = %client_id,
                    error = %e,
                    "Identity resolution failed, signalling reconnect"
                );
                if let Err(send_err) =
                    self.broker.send_reconnect(client_id, self.reconnect_delay).await
                {
                    tracing::error!(
                        client_id = %client_id,
                        error = %send_err,
                        "Failed to send reconnect signal"
                    );
                }
                return Err(e);
            }
        };

        let state = ConnectorClientState {
            client_id: client_id.to_string(),
            org_id: resolved.org_id.clone(),
            account: resolved.account.clone(),
            canonical_facts: content.canonical_facts.clone(),
            dispatchers: content.dispatchers.clone().unwrap_or_else(|| json!({})),
            tags: content.tags.clone().unwrap_or_else(|| json!({})),
            message_metadata: MessageMetadata {
                latest_message_id: message.message_id.clone(),
                latest_timestamp: message.sent,
            },
            created_at: now_utc(),
            updated_at: now_utc(),
            stale_timestamp: now_utc(),
            tenant_lookup_timestamp: None,
            tenant_lookup_failure_count: 0,
        };
        self.store.register(&state).await?;

        tracing::info!(
            client_id = %client_id,
            org_id = %resolved.org_id,
            client_name = content.client_name.as_deref().unwrap_or(""),
            "Connection registered"
        );
        metrics::record_message("control", Disposition::Handled);

        // Inventory requires both canonical facts and the playbook
        // dispatcher. The record is already written; on failure the
        // staleness sweeper retries inventory, but the agent is told
        // to reconnect so the next handshake can complete admission.
        if state.has_canonical_facts() && state.has_dispatcher(DISPATCHER_PLAYBOOK) {
            if let Err(e) = self.inventory.report(&resolved.identity, &state).await {
                tracing::error!(
                    client_id = %client_id,
                    error = %e,
                    "Inventory registration failed, signalling reconnect"
                );
                if let Err(send_err) =
                    self.broker.send_reconnect(client_id, self.reconnect_delay).await
                {
                    tracing::error!(
                        client_id = %client_id,
                        error = %send_err,
                        "Failed to send reconnect signal"
                    );
                }
                return Err(e);
            }
        }

        if let Some(entry) = CatalogEntry::from_dispatchers(&state.dispatchers) {
            if let Err(e) = self
                .sources
                .register(&resolved.identity, client_id, &entry)
                .await
            {
                metrics::record_sources_registration("error");
                tracing::error!(
                    client_id = %client_id,
                    source_ref = %entry.source_ref,
                    error = %e,
                    "Catalog registration failed"
                );
            }
        }

        Ok(())
    }
}

#[async_trait]
impl ControlMessageSink for DirectSink {
    async fn handle(
        &self,
        raw_topic: &str,
        payload: &[u8],
        _mqtt_message_id: u16,
    ) -> Result<(), TetherError> {
        let parsed = match classify(raw_topic, payload) {
            Inbound::Control(parsed) => parsed,
            Inbound::Dropped => return Ok(()),
        };
        let client_id = parsed.client_id;

        let message: ControlMessage = match serde_json::from_slice(payload) {
            Ok(message) => message,
            Err(e) => {
                metrics::record_message("control", Disposition::ParseError);
                tracing::error!(
                    client_id = %client_id,
                    error = %e,
                    "Dropping unparseable control message"
                );
                return Ok(());
            }
        };

        match message.message_type {
            EnvelopeType::ConnectionStatus => {
                let content = match message.connection_status() {
                    Ok(content) => content,
                    Err(e) => {
                        metrics::record_message("control", Disposition::ParseError);
                        tracing::error!(
                            client_id = %client_id,
                            error = %e,
                            "Dropping connection-status with malformed content"
                        );
                        return Ok(());
                    }
                };
                match content.state {
                    ConnectionState::Online => {
                        self.handle_online(&client_id, &message, content).await
                    }
                    ConnectionState::Offline => {
                        self.store.unregister(&client_id).await?;
                        metrics::record_message("control", Disposition::Handled);
                        tracing::info!(client_id = %client_id, "Connection unregistered");
                        Ok(())
                    }
                }
            }
            EnvelopeType::Event => {
                metrics::record_message("control", Disposition::Handled);
                tracing::info!(
                    client_id = %client_id,
                    message_id = %message.message_id,
                    "Agent event received"
                );
                Ok(())
            }
            _ => {
                metrics::record_message("control", Disposition::Ignored);
                tracing::debug!(
                    client_id = %client_id,
                    message_type = message.message_type.as_str(),
                    "Ignoring unexpected control message type"
                );
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::ResolvedIdentity;
    use chrono::{DateTime, Utc};
    use parking_lot::Mutex;
    use tether_api::message::DataMessage;
    use tether_persistence::MemoryConnectionStore;

    struct StaticResolver {
        fail: bool,
    }

    #[async_trait]
    impl IdentityResolver for StaticResolver {
        async fn resolve(&self, client_id: &str) -> Result<ResolvedIdentity, TetherError> {
            if self.fail {
                return Err(TetherError::Transient("gateway unavailable".to_string()));
            }
            Ok(ResolvedIdentity {
                identity: "aWRlbnRpdHk=".to_string(),
                account: "0001".to_string(),
                org_id: format!("org-for-{}", client_id),
            })
        }
    }

    #[derive(Default)]
    struct RecordingInventory {
        reported: Mutex<Vec<String>>,
        fail: bool,
    }

    #[async_trait]
    impl InventoryReporter for RecordingInventory {
        async fn report(
            &self,
            _identity: &str,
            state: &ConnectorClientState,
        ) -> Result<(), TetherError> {
            if self.fail {
                return Err(TetherError::Transient("inventory down".to_string()));
            }
            self.reported.lock().push(state.client_id.clone());
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingSources {
        registered: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl SourcesReporter for RecordingSources {
        async fn register(
            &self,
            _identity: &str,
            _client_id: &str,
            entry: &CatalogEntry,
        ) -> Result<(), TetherError> {
            self.registered.lock().push(entry.source_ref.clone());
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingBroker {
        reconnects: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl BrokerPublisher for RecordingBroker {
        async fn publish_data(
            &self,
            _client_id: &str,
            _message: &DataMessage,
        ) -> Result<(), TetherError> {
            Ok(())
        }

        async fn publish_control(
            &self,
            client_id: &str,
            message: &ControlMessage,
        ) -> Result<(), TetherError> {
            if message.content["command"] == "reconnect" {
                self.reconnects.lock().push(client_id.to_string());
            }
            Ok(())
        }
    }

    struct Fixture {
        store: Arc<MemoryConnectionStore>,
        inventory: Arc<RecordingInventory>,
        sources: Arc<RecordingSources>,
        broker: Arc<RecordingBroker>,
        sink: DirectSink,
    }

    fn fixture(resolver_fails: bool, inventory_fails: bool) -> Fixture {
        let store = Arc::new(MemoryConnectionStore::new());
        let inventory = Arc::new(RecordingInventory {
            fail: inventory_fails,
            ..Default::default()
        });
        let sources = Arc::new(RecordingSources::default());
        let broker = Arc::new(RecordingBroker::default());
        let sink = DirectSink::new(
            store.clone(),
            Arc::new(StaticResolver {
                fail: resolver_fails,
            }),
            inventory.clone(),
            sources.clone(),
            broker.clone(),
            30,
        );
        Fixture {
            store,
            inventory,
            sources,
            broker,
            sink,
        }
    }

    fn online_payload(message_id: &str, sent: &str) -> Vec<u8> {
        serde_json::to_vec(&json!({
            "type": "connection-status",
            "message_id": message_id,
            "version": 1,
            "sent": sent,
            "content": {
                "canonical_facts": {"fqdn": "host.example.com"},
                "dispatchers": {"rhc-worker-playbook": {}},
                "state": "online",
                "tags": {},
                "client_name": "rhc",
                "client_version": "0.2.1"
            }
        }))
        .unwrap()
    }

    fn offline_payload(message_id: &str, sent: &str) -> Vec<u8> {
        serde_json::to_vec(&json!({
            "type": "connection-status",
            "message_id": message_id,
            "version": 1,
            "sent": sent,
            "content": {"state": "offline"}
        }))
        .unwrap()
    }

    const TOPIC: &str = "redhat/insights/c1/control/out";

    #[tokio::test]
    async fn test_first_online_handshake_creates_record() {
        let f = fixture(false, false);
        f.sink
            .handle(TOPIC, &online_payload("m1", "2024-01-01T00:00:00Z"), 1)
            .await
            .unwrap();

        let state = f.store.find_by_client_id("c1").await.unwrap();
        assert_eq!(state.org_id, "org-for-c1");
        assert_eq!(state.message_metadata.latest_message_id, "m1");
        assert_eq!(f.inventory.reported.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_handshake_is_dropped() {
        let f = fixture(false, false);
        let payload = online_payload("m1", "2024-01-01T00:00:00Z");
        f.sink.handle(TOPIC, &payload, 1).await.unwrap();
        let before = f.store.find_by_client_id("c1").await.unwrap();

        f.sink.handle(TOPIC, &payload, 2).await.unwrap();

        let after = f.store.find_by_client_id("c1").await.unwrap();
        assert_eq!(after.updated_at, before.updated_at);
        assert_eq!(f.inventory.reported.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_older_handshake_is_dropped() {
        let f = fixture(false, false);
        f.sink
            .handle(TOPIC, &online_payload("m1", "2024-01-01T00:00:00Z"), 1)
            .await
            .unwrap();

        f.sink
            .handle(TOPIC, &online_payload("m0", "2023-12-31T00:00:00Z"), 2)
            .await
            .unwrap();

        let state = f.store.find_by_client_id("c1").await.unwrap();
        assert_eq!(state.message_metadata.latest_message_id, "m1");
        assert_eq!(f.inventory.reported.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_newer_handshake_overwrites() {
        let f = fixture(false, false);
        f.sink
            .handle(TOPIC, &online_payload("m1", "2024-01-01T00:00:00Z"), 1)
            .await
            .unwrap();
        f.sink
            .handle(TOPIC, &online_payload("m2", "2024-01-02T00:00:00Z"), 2)
            .await
            .unwrap();

        let state = f.store.find_by_client_id("c1").await.unwrap();
        assert_eq!(state.message_metadata.latest_message_id, "m2");
        let sent: DateTime<Utc> = "2024-01-02T00:00:00Z".parse().unwrap();
        assert_eq!(state.message_metadata.latest_timestamp, sent);
    }

    #[tokio::test]
    async fn test_offline_removes_record() {
        let f = fixture(false, false);
        f.sink
            .handle(TOPIC, &online_payload("m1", "2024-01-01T00:00:00Z"), 1)
            .await
            .unwrap();

        f.sink
            .handle(TOPIC, &offline_payload("m2", "2024-01-01T00:01:00Z"), 2)
            .await
            .unwrap();
        assert!(matches!(
            f.store.find_by_client_id("c1").await,
            Err(TetherError::NotFound)
        ));

        // offline is idempotent
        f.sink
            .handle(TOPIC, &offline_payload("m3", "2024-01-01T00:02:00Z"), 3)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_identity_failure_sends_reconnect_without_state_write() {
        let f = fixture(true, false);
        let result = f
            .sink
            .handle(TOPIC, &online_payload("m1", "2024-01-01T00:00:00Z"), 1)
            .await;

        assert!(result.is_err());
        assert!(matches!(
            f.store.find_by_client_id("c1").await,
            Err(TetherError::NotFound)
        ));
        assert_eq!(f.broker.reconnects.lock().as_slice(), ["c1"]);
    }

    #[tokio::test]
    async fn test_inventory_failure_keeps_state_and_sends_reconnect() {
        let f = fixture(false, true);
        let result = f
            .sink
            .handle(TOPIC, &online_payload("m1", "2024-01-01T00:00:00Z"), 1)
            .await;

        assert!(result.is_err());
        // the record survives; the staleness sweeper retries inventory
        assert!(f.store.find_by_client_id("c1").await.is_ok());
        assert_eq!(f.broker.reconnects.lock().as_slice(), ["c1"]);
    }

    #[tokio::test]
    async fn test_catalog_dispatcher_registers_source() {
        let f = fixture(false, false);
        let payload = serde_json::to_vec(&json!({
            "type": "connection-status",
            "message_id": "m1",
            "version": 1,
            "sent": "2024-01-01T00:00:00Z",
            "content": {
                "canonical_facts": {"fqdn": "host.example.com"},
                "dispatchers": {
                    "rhc-worker-playbook": {},
                    "catalog": {
                        "ApplicationType": "/insights/platform/catalog",
                        "SrcType": "ansible-tower",
                        "SourceRef": "ref-1",
                        "SrcName": "tower-a"
                    }
                },
                "state": "online",
                "tags": {}
            }
        }))
        .unwrap();

        f.sink.handle(TOPIC, &payload, 1).await.unwrap();
        assert_eq!(f.sources.registered.lock().as_slice(), ["ref-1"]);
    }

    #[tokio::test]
    async fn test_garbage_inputs_are_dropped_silently() {
        let f = fixture(false, false);
        // malformed topic
        f.sink.handle("redhat/insights/c1", b"{}", 1).await.unwrap();
        // empty payload (retained clear)
        f.sink.handle(TOPIC, b"", 1).await.unwrap();
        // unparseable JSON
        f.sink.handle(TOPIC, b"not json", 1).await.unwrap();
        // event type is log-only
        let event = serde_json::to_vec(&json!({
            "type": "event",
            "message_id": "m1",
            "version": 1,
            "sent": "2024-01-01T00:00:00Z",
            "content": "disconnect"
        }))
        .unwrap();
        f.sink.handle(TOPIC, &event, 1).await.unwrap();

        assert!(f.store.is_empty());
    }
}
