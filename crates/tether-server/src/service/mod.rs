//! Domain services backing the HTTP handlers

pub mod connections;

pub use connections::{ConnectionService, TenantScope};
