//! Actix middleware

pub mod identity;
pub mod telemetry;

pub use identity::IdentityAuth;
pub use telemetry::Telemetry;
