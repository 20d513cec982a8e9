//! The `x-rh-identity` header document
//!
//! The header value is a base64-encoded JSON document describing the
//! calling principal. Only the fields the dispatch path needs are
//! modeled; everything else passes through opaquely when the document
//! is forwarded to downstream services.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use tether_common::TetherError;

/// Principal types that unlock administrative operations
pub const IDENTITY_TYPE_ASSOCIATE: &str = "Associate";

/// Auth type set by mTLS-terminating gateways
pub const AUTH_TYPE_CERT: &str = "cert-auth";

/// Decoded `x-rh-identity` document
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct XRhIdentity {
    pub identity: IdentityDetail,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct IdentityDetail {
    #[serde(default)]
    pub account_number: Option<String>,
    #[serde(default)]
    pub org_id: Option<String>,
    #[serde(rename = "type", default)]
    pub identity_type: Option<String>,
    #[serde(default)]
    pub auth_type: Option<String>,
    #[serde(default)]
    pub internal: Option<InternalDetail>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct InternalDetail {
    #[serde(default)]
    pub org_id: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl XRhIdentity {
    /// Decode a base64 header value into an identity document.
    pub fn decode(header_value: &str) -> Result<Self, TetherError> {
        let raw = BASE64
            .decode(header_value.trim())
            .map_err(|e| TetherError::Validation(format!("identity header: {}", e)))?;
        serde_json::from_slice(&raw)
            .map_err(|e| TetherError::Validation(format!("identity header: {}", e)))
    }

    /// Encode the document back into a base64 header value.
    pub fn encode(&self) -> Result<String, TetherError> {
        let raw = serde_json::to_vec(self).map_err(TetherError::fatal)?;
        Ok(BASE64.encode(raw))
    }

    /// The effective tenant identifier: top-level `org_id` with the
    /// legacy `internal.org_id` as fallback.
    pub fn org_id(&self) -> Option<&str> {
        self.identity
            .org_id
            .as_deref()
            .or_else(|| self.identity.internal.as_ref()?.org_id.as_deref())
    }

    pub fn account_number(&self) -> Option<&str> {
        self.identity.account_number.as_deref()
    }

    /// True when the principal may invoke administrative operations.
    pub fn is_admin(&self) -> bool {
        self.identity.identity_type.as_deref() == Some(IDENTITY_TYPE_ASSOCIATE)
            || self.identity.auth_type.as_deref() == Some(AUTH_TYPE_CERT)
    }

    /// Fabricate a System identity for a resolved tenant, used by the
    /// config and fixed identity resolvers.
    pub fn for_system(account: &str, org_id: &str, client_id: &str) -> Self {
        XRhIdentity {
            identity: IdentityDetail {
                account_number: Some(account.to_string()),
                org_id: Some(org_id.to_string()),
                identity_type: Some("System".to_string()),
                auth_type: Some(AUTH_TYPE_CERT.to_string()),
                internal: Some(InternalDetail {
                    org_id: Some(org_id.to_string()),
                    extra: serde_json::Map::new(),
                }),
                extra: serde_json::Map::from_iter([(
                    "system".to_string(),
                    serde_json::json!({ "cn": client_id }),
                )]),
            },
        }
    }
}
