//! Sources registration capability
//!
//! Registers an agent's catalog dispatcher with the sources service.
//! Registration is idempotent: an existence check keyed on the source
//! ref runs first and creation only happens when it finds nothing.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use tether_common::TetherError;

use crate::metrics;

/// Catalog dispatcher metadata required for registration
#[derive(Clone, Debug, Deserialize)]
pub struct CatalogEntry {
    #[serde(rename = "ApplicationType")]
    pub application_type: String,
    #[serde(rename = "SrcType")]
    pub source_type: String,
    #[serde(rename = "SourceRef")]
    pub source_ref: String,
    #[serde(rename = "SrcName")]
    pub source_name: String,
}

impl CatalogEntry {
    /// Extract the catalog entry from a dispatcher document; `None`
    /// when the catalog dispatcher is absent or incomplete.
    pub fn from_dispatchers(dispatchers: &serde_json::Value) -> Option<Self> {
        let entry = dispatchers.get(tether_common::DISPATCHER_CATALOG)?;
        serde_json::from_value(entry.clone()).ok()
    }
}

#[async_trait]
pub trait SourcesReporter: Send + Sync {
    async fn register(
        &self,
        identity: &str,
        client_id: &str,
        entry: &CatalogEntry,
    ) -> Result<(), TetherError>;
}

#[derive(Debug, Deserialize)]
struct SourcesPage {
    #[serde(default)]
    data: Vec<serde_json::Value>,
}

/// HTTP-backed reporter against the sources service
pub struct HttpSourcesReporter {
    http: reqwest::Client,
    base_url: String,
}

impl HttpSourcesReporter {
    pub fn new(base_url: String, timeout: Duration) -> Result<Self, TetherError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(TetherError::fatal)?;
        Ok(Self { http, base_url })
    }

    async fn exists(&self, identity: &str, source_ref: &str) -> Result<bool, TetherError> {
        let url = format!("{}/sources", self.base_url);
        let response = self
            .http
            .get(&url)
            .query(&[("filter[source_ref][eq]", source_ref)])
            .header("x-rh-identity", identity)
            .send()
            .await
            .map_err(TetherError::transient)?;

        let status = response.status();
        if !status.is_success() {
            return Err(TetherError::Transient(format!(
                "sources existence check answered {}",
                status
            )));
        }
        let page: SourcesPage = response.json().await.map_err(TetherError::transient)?;
        Ok(!page.data.is_empty())
    }

    async fn create(
        &self,
        identity: &str,
        entry: &CatalogEntry,
    ) -> Result<(), TetherError> {
        let url = format!("{}/bulk_create", self.base_url);
        let body = json!({
            "sources": [{
                "source_ref": entry.source_ref,
                "name": entry.source_name,
                "source_type_name": entry.source_type,
            }],
            "applications": [{
                "source_name": entry.source_name,
                "application_type_name": entry.application_type,
            }],
        });
        let response = self
            .http
            .post(&url)
            .header("x-rh-identity", identity)
            .json(&body)
            .send()
            .await
            .map_err(TetherError::transient)?;

        let status = response.status();
        if !status.is_success() {
            return Err(TetherError::Transient(format!(
                "sources bulk create answered {}",
                status
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl SourcesReporter for HttpSourcesReporter {
    async fn register(
        &self,
        identity: &str,
        client_id: &str,
        entry: &CatalogEntry,
    ) -> Result<(), TetherError> {
        if self.exists(identity, &entry.source_ref).await? {
            metrics::record_sources_registration("exists");
            tracing::debug!(
                client_id = %client_id,
                source_ref = %entry.source_ref,
                "Catalog source already registered"
            );
            return Ok(());
        }

        self.create(identity, entry).await?;
        metrics::record_sources_registration("created");
        tracing::info!(
            client_id = %client_id,
            source_ref = %entry.source_ref,
            source_name = %entry.source_name,
            "Catalog source registered"
        );
        Ok(())
    }
}

/// Reporter that drops registrations, for development.
pub struct NoopSourcesReporter;

#[async_trait]
impl SourcesReporter for NoopSourcesReporter {
    async fn register(
        &self,
        _identity: &str,
        client_id: &str,
        entry: &CatalogEntry,
    ) -> Result<(), TetherError> {
        tracing::debug!(
            client_id = %client_id,
            source_ref = %entry.source_ref,
            "Sources reporting disabled"
        );
        Ok(())
    }
}
