//! Tether Core - Broker-facing ingest, dispatch, and reconciliation
//!
//! This crate holds the domain logic between the broker and the
//! connection state store:
//! - The broker adapter (publish paths and the subscription loop)
//! - The inbound handshake pipeline with its two topologies
//! - The event-bus bridge producer
//! - The identity, inventory, and sources capabilities
//! - The reconciliation sweepers

pub mod bridge;
pub mod broker;
pub mod identity;
pub mod inventory;
pub mod metrics;
pub mod pipeline;
pub mod sources;
pub mod sweeper;

pub use broker::BrokerPublisher;
pub use identity::{IdentityResolver, ResolvedIdentity};
pub use inventory::InventoryReporter;
pub use pipeline::ControlMessageSink;
pub use sources::SourcesReporter;
