//! HTTP API surface
//!
//! v2 is org-scoped, v1 is the legacy account-scoped variant of the
//! same shape. Both mount under the configured context path.

pub mod v1;
pub mod v2;

use actix_web::{HttpRequest, HttpResponse};
use serde::Deserialize;

use crate::auth::{self, Principal};
use crate::model::response;

/// Paging query parameters; non-integer input fails deserialization
/// and answers 400 before any handler runs.
#[derive(Debug, Deserialize)]
pub struct PageQuery {
    pub offset: Option<u64>,
    pub limit: Option<u64>,
}

impl PageQuery {
    pub fn offset(&self) -> u64 {
        self.offset.unwrap_or(0)
    }

    pub fn limit(&self) -> u64 {
        self.limit.unwrap_or(50)
    }
}

/// The principal placed by the authentication middleware; its absence
/// means a route was mounted outside the middleware, which is a bug,
/// answered as 401 rather than a panic.
pub fn principal(req: &HttpRequest) -> Result<Principal, HttpResponse> {
    auth::principal_of(req).ok_or_else(response::unauthorized)
}

/// Administrative routes require an Associate identity or cert-auth.
pub fn admin(req: &HttpRequest) -> Result<Principal, HttpResponse> {
    let principal = principal(req)?;
    if !principal.is_admin() {
        return Err(response::forbidden());
    }
    Ok(principal)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_query_defaults() {
        let query = PageQuery {
            offset: None,
            limit: None,
        };
        assert_eq!(query.offset(), 0);
        assert_eq!(query.limit(), 50);
    }
}
