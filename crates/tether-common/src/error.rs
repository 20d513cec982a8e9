//! Error types for Tether
//!
//! One taxonomy is surfaced uniformly across components:
//! - validation errors are local and never retried
//! - `NotFound` is a sentinel, not a failure
//! - transient errors are surfaced to the caller and retried by the
//!   next sweep or broker redelivery
//! - fatal errors terminate the calling request; broker redelivery plus
//!   the duplicate guard make restart safe
//! - `DuplicateOrOld` is a counted non-error drop in the online path

use std::fmt::Display;

/// Application-specific error types
#[derive(thiserror::Error, Debug)]
pub enum TetherError {
    #[error("connection not found")]
    NotFound,

    #[error("invalid client id")]
    InvalidClientId,

    #[error("invalid org id")]
    InvalidOrgId,

    #[error("invalid account")]
    InvalidAccount,

    #[error("validation error: {0}")]
    Validation(String),

    #[error("duplicate or older message: {0}")]
    DuplicateOrOld(String),

    #[error("transient error: {0}")]
    Transient(String),

    #[error("fatal error: {0}")]
    Fatal(String),
}

impl TetherError {
    /// Wrap an underlying storage or serialization failure.
    pub fn fatal(err: impl Display) -> Self {
        TetherError::Fatal(err.to_string())
    }

    /// Wrap a retryable external failure (broker timeout, gateway HTTP
    /// error, event-bus write).
    pub fn transient(err: impl Display) -> Self {
        TetherError::Transient(err.to_string())
    }

    /// True for errors that must terminate the calling request.
    pub fn is_fatal(&self) -> bool {
        matches!(self, TetherError::Fatal(_))
    }

    /// True for the non-error duplicate/older drop.
    pub fn is_duplicate(&self) -> bool {
        matches!(self, TetherError::DuplicateOrOld(_))
    }
}
