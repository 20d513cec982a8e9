//! Request principals
//!
//! Two mechanisms authenticate a caller: the `x-rh-identity` header
//! (base64 JSON document) or the pre-shared-key triple used by
//! service-to-service callers. The effective tenant comes from
//! whichever mechanism authenticated.

use actix_web::HttpMessage;
use actix_web::dev::ServiceRequest;
use std::collections::HashMap;

use tether_api::XRhIdentity;

pub const IDENTITY_HEADER: &str = "x-rh-identity";
pub const PSK_CLIENT_ID_HEADER: &str = "x-rh-tether-client-id";
pub const PSK_ORG_ID_HEADER: &str = "x-rh-tether-org-id";
pub const PSK_ACCOUNT_HEADER: &str = "x-rh-tether-account";
pub const PSK_HEADER: &str = "x-rh-tether-psk";

/// The authenticated caller of one request
#[derive(Clone, Debug)]
pub enum Principal {
    /// Platform identity header
    Identity(XRhIdentity),
    /// Pre-shared-key authenticated service
    Service {
        name: String,
        org_id: Option<String>,
        account: Option<String>,
    },
}

impl Principal {
    pub fn org_id(&self) -> Option<&str> {
        match self {
            Principal::Identity(identity) => identity.org_id(),
            Principal::Service { org_id, .. } => org_id.as_deref(),
        }
    }

    pub fn account(&self) -> Option<&str> {
        match self {
            Principal::Identity(identity) => identity.account_number(),
            Principal::Service { account, .. } => account.as_deref(),
        }
    }

    /// Administrative operations require an Associate identity or
    /// cert-auth; service callers never qualify.
    pub fn is_admin(&self) -> bool {
        match self {
            Principal::Identity(identity) => identity.is_admin(),
            Principal::Service { .. } => false,
        }
    }
}

fn header(req: &ServiceRequest, name: &str) -> Option<String> {
    req.headers()
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Authenticate a request against the identity header or the PSK map.
/// `None` means 401; no detail is surfaced to the caller.
pub fn authenticate(
    req: &ServiceRequest,
    psks: &HashMap<String, String>,
) -> Option<Principal> {
    if let Some(raw) = header(req, IDENTITY_HEADER) {
        return match XRhIdentity::decode(&raw) {
            Ok(identity) => Some(Principal::Identity(identity)),
            Err(e) => {
                tracing::debug!(error = %e, "Rejecting malformed identity header");
                None
            }
        };
    }

    let name = header(req, PSK_CLIENT_ID_HEADER)?;
    let presented = header(req, PSK_HEADER)?;
    let expected = psks.get(&name)?;
    if *expected != presented {
        tracing::debug!(service = %name, "Rejecting bad pre-shared key");
        return None;
    }
    Some(Principal::Service {
        name,
        org_id: header(req, PSK_ORG_ID_HEADER),
        account: header(req, PSK_ACCOUNT_HEADER),
    })
}

/// Pull the principal a middleware stored on the request.
pub fn principal_of(req: &actix_web::HttpRequest) -> Option<Principal> {
    req.extensions().get::<Principal>().cloned()
}
