//! Tether Persistence - Connection state store
//!
//! This crate provides:
//! - The SeaORM entity for the `connections` table
//! - The `ConnectionStore` trait, the single source of truth API for
//!   agent presence
//! - The SQL backend for production and the in-memory backend for
//!   tests and single-node development

pub mod entity;
pub mod memory;
pub mod model;
pub mod sql;
pub mod traits;

// Re-export sea-orm for convenience
pub use sea_orm;

// Re-export the store trait and backends
pub use memory::MemoryConnectionStore;
pub use sql::SqlConnectionStore;
pub use traits::ConnectionStore;

// Re-export model types
pub use model::{ConnectorClientState, MessageMetadata, Page};
