//! Connection operations shared by the v1 and v2 surfaces
//!
//! v2 scopes every operation on the caller's org id, v1 on the legacy
//! account number; nothing else differs. Directed lookups use the
//! relaxed tenant form so Satellite-managed hosts stay reachable
//! across tenants; listings stay strictly tenant-scoped.

use std::sync::Arc;

use serde_json::Value;

use tether_api::message::{CommandContent, ControlMessage, DataMessage};
use tether_api::model::{ConnectionStatusResponse, ConnectionSummary, MessageResponse};
use tether_common::TetherError;
use tether_persistence::{ConnectionStore, ConnectorClientState, Page};

use tether_core::BrokerPublisher;

/// Tenant identifier of the calling principal
#[derive(Clone, Debug)]
pub enum TenantScope {
    Org(String),
    Account(String),
}

impl TenantScope {
    fn matches(&self, state: &ConnectorClientState) -> bool {
        match self {
            TenantScope::Org(org_id) => state.org_id == *org_id,
            TenantScope::Account(account) => state.account == *account,
        }
    }

    fn describe(&self) -> (&'static str, &str) {
        match self {
            TenantScope::Org(org_id) => ("org_id", org_id),
            TenantScope::Account(account) => ("account", account),
        }
    }
}

pub struct ConnectionService {
    store: Arc<dyn ConnectionStore>,
    broker: Arc<dyn BrokerPublisher>,
}

impl ConnectionService {
    pub fn new(store: Arc<dyn ConnectionStore>, broker: Arc<dyn BrokerPublisher>) -> Self {
        Self { store, broker }
    }

    async fn find(
        &self,
        scope: &TenantScope,
        client_id: &str,
        relaxed: bool,
    ) -> Result<ConnectorClientState, TetherError> {
        let state = match scope {
            TenantScope::Org(org_id) => {
                self.store
                    .find_by_org_and_client_id(org_id, client_id, relaxed)
                    .await?
            }
            TenantScope::Account(account) => {
                self.store
                    .find_by_account_and_client_id(account, client_id, relaxed)
                    .await?
            }
        };
        if !scope.matches(&state) {
            let (key, caller_tenant) = scope.describe();
            tracing::info!(
                client_id = %client_id,
                caller = %format!("{}={}", key, caller_tenant),
                connection_org_id = %state.org_id,
                "Satellite-managed connection served across tenants"
            );
        }
        Ok(state)
    }

    /// Dispatch a directed payload to a live agent.
    pub async fn send_message(
        &self,
        scope: &TenantScope,
        client_id: &str,
        directive: &str,
        payload: Value,
        metadata: Option<Value>,
    ) -> Result<MessageResponse, TetherError> {
        if directive.trim().is_empty() {
            return Err(TetherError::Validation("directive must not be empty".to_string()));
        }
        self.find(scope, client_id, true).await?;

        let message = DataMessage::new(
            directive.to_string(),
            metadata.unwrap_or(Value::Null),
            payload,
        );
        self.broker.publish_data(client_id, &message).await?;
        tracing::info!(
            client_id = %client_id,
            message_id = %message.message_id,
            directive = %directive,
            "Message dispatched"
        );
        Ok(MessageResponse {
            id: message.message_id,
        })
    }

    /// Agent status plus facts; unknown or cross-tenant agents are
    /// simply disconnected from the caller's point of view.
    pub async fn status(
        &self,
        scope: &TenantScope,
        client_id: &str,
    ) -> Result<ConnectionStatusResponse, TetherError> {
        match self.find(scope, client_id, true).await {
            Ok(state) => Ok(ConnectionStatusResponse {
                status: "connected".to_string(),
                account: Some(state.account),
                org_id: Some(state.org_id),
                client_id: Some(state.client_id),
                canonical_facts: state.canonical_facts,
                dispatchers: Some(state.dispatchers),
                tags: Some(state.tags),
            }),
            Err(TetherError::NotFound) => Ok(ConnectionStatusResponse::disconnected()),
            Err(e) => Err(e),
        }
    }

    /// Page of connections within the caller's tenant.
    pub async fn list(
        &self,
        scope: &TenantScope,
        offset: u64,
        limit: u64,
    ) -> Result<Page<ConnectionSummary>, TetherError> {
        let page = match scope {
            TenantScope::Org(org_id) => self.store.list_by_org(org_id, offset, limit).await?,
            TenantScope::Account(account) => {
                self.store.list_by_account(account, offset, limit).await?
            }
        };
        Ok(Page {
            total: page.total,
            items: page
                .items
                .into_iter()
                .map(|state| ConnectionSummary {
                    client_id: state.client_id,
                    account: state.account,
                    org_id: state.org_id,
                })
                .collect(),
        })
    }

    /// Page over every connection regardless of tenant, ordered by
    /// `(account, client_id)`. Administrative surface only.
    pub async fn list_all(
        &self,
        offset: u64,
        limit: u64,
    ) -> Result<Page<ConnectionSummary>, TetherError> {
        let page = self.store.list_all(offset, limit).await?;
        Ok(Page {
            total: page.total,
            items: page
                .items
                .into_iter()
                .map(|state| ConnectionSummary {
                    client_id: state.client_id,
                    account: state.account,
                    org_id: state.org_id,
                })
                .collect(),
        })
    }

    /// Publish an administrative command to a live agent.
    pub async fn send_command(
        &self,
        scope: &TenantScope,
        client_id: &str,
        content: CommandContent,
    ) -> Result<MessageResponse, TetherError> {
        self.find(scope, client_id, true).await?;

        let message = ControlMessage::command(content);
        self.broker.publish_control(client_id, &message).await?;
        tracing::info!(
            client_id = %client_id,
            message_id = %message.message_id,
            command = %message.content["command"],
            "Command dispatched"
        );
        Ok(MessageResponse {
            id: message.message_id,
        })
    }

    /// Administrative removal of a connection record.
    pub async fn unregister(
        &self,
        scope: &TenantScope,
        client_id: &str,
    ) -> Result<(), TetherError> {
        self.find(scope, client_id, false).await?;
        self.store.unregister(client_id).await
    }
}
