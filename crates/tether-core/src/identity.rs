//! Identity resolution capability
//!
//! `(client_id) → (identity, account, org_id)` against the identity
//! gateway. Back-ends are selected by configuration string at startup;
//! errors are opaque to the core, which only distinguishes "resolved"
//! from "any failure".

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;

use tether_api::XRhIdentity;
use tether_common::TetherError;

/// Header carrying the certificate common name to the auth gateway
const CERT_AUTH_CN_HEADER: &str = "x-rh-certauth-cn";

/// A resolved principal for one agent
#[derive(Clone, Debug)]
pub struct ResolvedIdentity {
    /// Base64 identity document, forwarded verbatim to downstream
    /// services as `x-rh-identity`
    pub identity: String,
    pub account: String,
    pub org_id: String,
}

#[async_trait]
pub trait IdentityResolver: Send + Sync {
    async fn resolve(&self, client_id: &str) -> Result<ResolvedIdentity, TetherError>;
}

/// Resolver backed by the auth gateway. The gateway authenticates the
/// agent's certificate common name and answers with the identity
/// document for its tenant.
pub struct GatewayIdentityResolver {
    http: reqwest::Client,
    url: String,
}

impl GatewayIdentityResolver {
    pub fn new(url: String, timeout: Duration) -> Result<Self, TetherError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(TetherError::fatal)?;
        Ok(Self { http, url })
    }
}

#[async_trait]
impl IdentityResolver for GatewayIdentityResolver {
    async fn resolve(&self, client_id: &str) -> Result<ResolvedIdentity, TetherError> {
        let response = self
            .http
            .get(&self.url)
            .header(CERT_AUTH_CN_HEADER, format!("/CN={}", client_id))
            .send()
            .await
            .map_err(TetherError::transient)?;

        let status = response.status();
        if !status.is_success() {
            return Err(TetherError::Transient(format!(
                "identity gateway answered {} for '{}'",
                status, client_id
            )));
        }

        let body = response.bytes().await.map_err(TetherError::transient)?;
        let document: XRhIdentity =
            serde_json::from_slice(&body).map_err(TetherError::transient)?;

        let org_id = document
            .org_id()
            .ok_or_else(|| TetherError::Transient("identity document lacks org_id".to_string()))?
            .to_string();
        let account = document.account_number().unwrap_or_default().to_string();

        Ok(ResolvedIdentity {
            identity: BASE64.encode(&body),
            account,
            org_id,
        })
    }
}

/// Resolver backed by a static configuration map, for environments
/// without a gateway.
pub struct ConfigIdentityResolver {
    mapping: HashMap<String, (String, String)>,
}

impl ConfigIdentityResolver {
    /// `mapping`: client_id → (account, org_id)
    pub fn new(mapping: HashMap<String, (String, String)>) -> Self {
        Self { mapping }
    }
}

#[async_trait]
impl IdentityResolver for ConfigIdentityResolver {
    async fn resolve(&self, client_id: &str) -> Result<ResolvedIdentity, TetherError> {
        let (account, org_id) = self
            .mapping
            .get(client_id)
            .ok_or_else(|| {
                TetherError::Transient(format!("no identity mapping for '{}'", client_id))
            })?
            .clone();
        let identity = XRhIdentity::for_system(&account, &org_id, client_id).encode()?;
        Ok(ResolvedIdentity {
            identity,
            account,
            org_id,
        })
    }
}

/// Resolver answering a fixed tenant for every client (development).
pub struct FixedIdentityResolver {
    account: String,
    org_id: String,
}

impl FixedIdentityResolver {
    pub fn new(account: String, org_id: String) -> Self {
        Self { account, org_id }
    }
}

#[async_trait]
impl IdentityResolver for FixedIdentityResolver {
    async fn resolve(&self, client_id: &str) -> Result<ResolvedIdentity, TetherError> {
        let identity =
            XRhIdentity::for_system(&self.account, &self.org_id, client_id).encode()?;
        Ok(ResolvedIdentity {
            identity,
            account: self.account.clone(),
            org_id: self.org_id.clone(),
        })
    }
}
