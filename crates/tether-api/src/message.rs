//! Broker message envelopes
//!
//! Two envelopes travel the broker: `ControlMessage` on the control
//! topics and `DataMessage` on the data topics. Both are JSON;
//! timestamps are RFC3339 with sub-second precision.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Envelope discriminator carried in the `type` field
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EnvelopeType {
    ConnectionStatus,
    Event,
    Command,
    Data,
}

impl EnvelopeType {
    pub fn as_str(self) -> &'static str {
        match self {
            EnvelopeType::ConnectionStatus => "connection-status",
            EnvelopeType::Event => "event",
            EnvelopeType::Command => "command",
            EnvelopeType::Data => "data",
        }
    }
}

/// Agent connection state carried in connection-status content
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Online,
    Offline,
}

/// Control-topic envelope
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ControlMessage {
    #[serde(rename = "type")]
    pub message_type: EnvelopeType,
    pub message_id: String,
    pub version: i32,
    pub sent: DateTime<Utc>,
    #[serde(default)]
    pub content: Value,
}

impl ControlMessage {
    /// Build an outgoing command message (reconnect/disconnect/ping).
    pub fn command(content: CommandContent) -> Self {
        ControlMessage {
            message_type: EnvelopeType::Command,
            message_id: Uuid::new_v4().to_string(),
            version: 1,
            sent: Utc::now(),
            content: serde_json::to_value(content).unwrap_or(Value::Null),
        }
    }

    /// Decode the content as a connection-status document.
    pub fn connection_status(&self) -> Result<ConnectionStatusContent, serde_json::Error> {
        serde_json::from_value(self.content.clone())
    }
}

/// Data-topic envelope
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DataMessage {
    #[serde(rename = "type")]
    pub message_type: EnvelopeType,
    pub message_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_to: Option<String>,
    pub version: i32,
    pub sent: DateTime<Utc>,
    pub directive: String,
    #[serde(default)]
    pub metadata: Value,
    #[serde(default)]
    pub content: Value,
}

impl DataMessage {
    /// Build a directed data message with a fresh v4 message id.
    pub fn new(directive: String, metadata: Value, content: Value) -> Self {
        DataMessage {
            message_type: EnvelopeType::Data,
            message_id: Uuid::new_v4().to_string(),
            response_to: None,
            version: 1,
            sent: Utc::now(),
            directive,
            metadata,
            content,
        }
    }
}

/// Content of a connection-status handshake
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ConnectionStatusContent {
    #[serde(default)]
    pub canonical_facts: Option<Value>,
    #[serde(default)]
    pub dispatchers: Option<Value>,
    pub state: ConnectionState,
    #[serde(default)]
    pub tags: Option<Value>,
    #[serde(default)]
    pub client_name: Option<String>,
    #[serde(default)]
    pub client_version: Option<String>,
}

impl Default for ConnectionState {
    fn default() -> Self {
        ConnectionState::Offline
    }
}

/// Content of an outgoing command message
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CommandContent {
    pub command: String,
    #[serde(default)]
    pub arguments: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl CommandContent {
    pub fn reconnect(delay_seconds: i64) -> Self {
        CommandContent {
            command: "reconnect".to_string(),
            arguments: serde_json::json!({ "delay": delay_seconds }),
            message: None,
        }
    }

    pub fn disconnect() -> Self {
        CommandContent {
            command: "disconnect".to_string(),
            arguments: Value::Null,
            message: None,
        }
    }

    pub fn ping() -> Self {
        CommandContent {
            command: "ping".to_string(),
            arguments: Value::Null,
            message: None,
        }
    }
}
