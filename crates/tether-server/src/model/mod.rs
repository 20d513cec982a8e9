//! Server models: configuration, application state, response helpers

pub mod config;
pub mod response;

use std::sync::Arc;

use tether_core::BrokerPublisher;
use tether_persistence::ConnectionStore;

pub use config::Configuration;

/// Shared application state for HTTP handlers
pub struct AppState {
    pub configuration: Configuration,
    pub store: Arc<dyn ConnectionStore>,
    pub broker: Arc<dyn BrokerPublisher>,
}
