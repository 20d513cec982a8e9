//! Startup and shutdown plumbing

pub mod http;
pub mod logging;
pub mod shutdown;

pub use http::http_server;
pub use logging::{LoggingConfig, init_logging};
pub use shutdown::{ShutdownSignal, wait_for_shutdown_signal};
