//! HTTP response helpers
//!
//! Maps the shared error taxonomy onto status codes: validation → 400,
//! not-found → 404, everything external or fatal → 500. Authentication
//! failures answer 401 with a generic body.

use actix_web::HttpResponse;
use serde::{Deserialize, Serialize};

use tether_common::TetherError;

/// Generic error body; deliberately sparse to avoid leaking internals
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub message: String,
}

impl ErrorBody {
    pub fn new(message: impl Into<String>) -> Self {
        ErrorBody {
            message: message.into(),
        }
    }
}

pub fn bad_request(message: impl Into<String>) -> HttpResponse {
    HttpResponse::BadRequest().json(ErrorBody::new(message))
}

pub fn unauthorized() -> HttpResponse {
    HttpResponse::Unauthorized().json(ErrorBody::new("authentication required"))
}

pub fn forbidden() -> HttpResponse {
    HttpResponse::Forbidden().json(ErrorBody::new("access denied"))
}

pub fn not_found() -> HttpResponse {
    HttpResponse::NotFound().json(ErrorBody::new("connection not found"))
}

pub fn internal_error() -> HttpResponse {
    HttpResponse::InternalServerError().json(ErrorBody::new("internal error"))
}

/// Translate a domain error into its HTTP response.
pub fn error_response(err: &TetherError) -> HttpResponse {
    match err {
        TetherError::NotFound => not_found(),
        TetherError::Validation(message) => bad_request(message.clone()),
        TetherError::InvalidClientId => bad_request("invalid client id"),
        TetherError::InvalidOrgId => bad_request("invalid org id"),
        TetherError::InvalidAccount => bad_request("invalid account"),
        TetherError::DuplicateOrOld(_) | TetherError::Transient(_) | TetherError::Fatal(_) => {
            internal_error()
        }
    }
}
