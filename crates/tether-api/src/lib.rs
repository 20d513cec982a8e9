//! Tether API - Wire formats shared by the server and its clients
//!
//! This crate defines:
//! - Broker message envelopes (control and data)
//! - The broker topic codec
//! - The `x-rh-identity` header document
//! - HTTP request/response models including the pagination envelope

pub mod identity;
pub mod message;
pub mod model;
pub mod topic;

pub use identity::XRhIdentity;
pub use message::{
    CommandContent, ConnectionState, ControlMessage, DataMessage, EnvelopeType,
    ConnectionStatusContent,
};
pub use topic::{ParsedTopic, TopicDirection, TopicKind};
