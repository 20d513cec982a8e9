//! SQL store backend (MySQL/PostgreSQL via SeaORM)
//!
//! Every operation runs under the configured query deadline. Writes
//! are single-row; concurrent registers for different client ids do
//! not conflict, and registers for the same client id serialize on the
//! row with last-commit-wins on the mutable fields.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, Condition, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect,
};

use tether_common::{DISPATCHER_PACKAGE_MANAGER, DISPATCHER_PLAYBOOK, TetherError, now_utc};

use crate::entity::connections;
use crate::model::{ConnectorClientState, Page};
use crate::traits::{
    ConnectionStore, validate_account, validate_client_id, validate_limit, validate_org_id,
};

/// SQL-backed connection store
pub struct SqlConnectionStore {
    db: DatabaseConnection,
    query_timeout: Duration,
}

impl SqlConnectionStore {
    pub fn new(db: DatabaseConnection, query_timeout: Duration) -> Self {
        Self { db, query_timeout }
    }

    /// Get a reference to the underlying database connection
    pub fn db(&self) -> &DatabaseConnection {
        &self.db
    }

    /// Run a query under the configured deadline. An elapsed deadline
    /// is a storage failure, fatal to the calling request.
    async fn with_deadline<F, T>(&self, fut: F) -> Result<T, TetherError>
    where
        F: Future<Output = Result<T, sea_orm::DbErr>>,
    {
        match tokio::time::timeout(self.query_timeout, fut).await {
            Ok(result) => result.map_err(TetherError::fatal),
            Err(_) => Err(TetherError::Fatal("database query deadline exceeded".to_string())),
        }
    }

    async fn find_model(
        &self,
        client_id: &str,
    ) -> Result<Option<connections::Model>, TetherError> {
        self.with_deadline(
            connections::Entity::find()
                .filter(connections::Column::ClientId.eq(client_id))
                .one(&self.db),
        )
        .await
    }

    async fn require_model(&self, client_id: &str) -> Result<connections::Model, TetherError> {
        self.find_model(client_id).await?.ok_or(TetherError::NotFound)
    }

    async fn page_query(
        &self,
        query: sea_orm::Select<connections::Entity>,
        offset: u64,
        limit: u64,
    ) -> Result<Page<ConnectorClientState>, TetherError> {
        validate_limit(limit)?;
        let total = self.with_deadline(query.clone().count(&self.db)).await?;
        let models = self
            .with_deadline(query.offset(offset).limit(limit).all(&self.db))
            .await?;
        let items = models
            .into_iter()
            .map(ConnectorClientState::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Page { items, total })
    }
}

fn serialize_document(value: &serde_json::Value, column: &str) -> Result<String, TetherError> {
    serde_json::to_string(value)
        .map_err(|e| TetherError::Fatal(format!("serialize {}: {}", column, e)))
}

/// Scope a fetched row to the caller's tenant. The relaxed form admits
/// Satellite-managed rows (`foreman_rh_cloud` dispatcher) across
/// tenants; the caller logs the relaxation.
fn scope_to_tenant(
    state: ConnectorClientState,
    matches_tenant: bool,
    relaxed: bool,
) -> Result<ConnectorClientState, TetherError> {
    if matches_tenant {
        return Ok(state);
    }
    if relaxed && state.has_dispatcher(tether_common::DISPATCHER_SATELLITE) {
        return Ok(state);
    }
    Err(TetherError::NotFound)
}

#[async_trait]
impl ConnectionStore for SqlConnectionStore {
    async fn register(&self, state: &ConnectorClientState) -> Result<(), TetherError> {
        validate_client_id(&state.client_id)?;

        let canonical_facts = state
            .canonical_facts
            .as_ref()
            .map(|facts| serialize_document(facts, "canonical_facts"))
            .transpose()?;
        let dispatchers = serialize_document(&state.dispatchers, "dispatchers")?;
        let tags = serialize_document(&state.tags, "tags")?;
        let now = now_utc();

        match self.find_model(&state.client_id).await? {
            Some(existing) => {
                let mut active: connections::ActiveModel = existing.into();
                active.org_id = Set(state.org_id.clone());
                active.account = Set(state.account.clone());
                active.canonical_facts = Set(canonical_facts);
                active.dispatchers = Set(dispatchers);
                active.tags = Set(tags);
                active.latest_message_id = Set(state.message_metadata.latest_message_id.clone());
                active.latest_timestamp = Set(state.message_metadata.latest_timestamp);
                active.updated_at = Set(now);
                active.stale_timestamp = Set(now);
                self.with_deadline(active.update(&self.db)).await?;
            }
            None => {
                let active = connections::ActiveModel {
                    client_id: Set(state.client_id.clone()),
                    org_id: Set(state.org_id.clone()),
                    account: Set(state.account.clone()),
                    canonical_facts: Set(canonical_facts),
                    dispatchers: Set(dispatchers),
                    tags: Set(tags),
                    latest_message_id: Set(state.message_metadata.latest_message_id.clone()),
                    latest_timestamp: Set(state.message_metadata.latest_timestamp),
                    created_at: Set(now),
                    updated_at: Set(now),
                    stale_timestamp: Set(now),
                    tenant_lookup_timestamp: Set(state.tenant_lookup_timestamp),
                    tenant_lookup_failure_count: Set(state.tenant_lookup_failure_count),
                    ..Default::default()
                };
                self.with_deadline(active.insert(&self.db)).await?;
            }
        }
        Ok(())
    }

    async fn unregister(&self, client_id: &str) -> Result<(), TetherError> {
        validate_client_id(client_id)?;
        self.with_deadline(
            connections::Entity::delete_many()
                .filter(connections::Column::ClientId.eq(client_id))
                .exec(&self.db),
        )
        .await?;
        Ok(())
    }

    async fn find_by_client_id(
        &self,
        client_id: &str,
    ) -> Result<ConnectorClientState, TetherError> {
        validate_client_id(client_id)?;
        ConnectorClientState::try_from(self.require_model(client_id).await?)
    }

    async fn find_by_org_and_client_id(
        &self,
        org_id: &str,
        client_id: &str,
        relaxed: bool,
    ) -> Result<ConnectorClientState, TetherError> {
        validate_org_id(org_id)?;
        validate_client_id(client_id)?;
        let state = ConnectorClientState::try_from(self.require_model(client_id).await?)?;
        let matches = state.org_id == org_id;
        scope_to_tenant(state, matches, relaxed)
    }

    async fn find_by_account_and_client_id(
        &self,
        account: &str,
        client_id: &str,
        relaxed: bool,
    ) -> Result<ConnectorClientState, TetherError> {
        validate_account(account)?;
        validate_client_id(client_id)?;
        let state = ConnectorClientState::try_from(self.require_model(client_id).await?)?;
        let matches = state.account == account;
        scope_to_tenant(state, matches, relaxed)
    }

    async fn list_by_org(
        &self,
        org_id: &str,
        offset: u64,
        limit: u64,
    ) -> Result<Page<ConnectorClientState>, TetherError> {
        validate_org_id(org_id)?;
        let query = connections::Entity::find()
            .filter(connections::Column::OrgId.eq(org_id))
            .order_by_asc(connections::Column::ClientId);
        self.page_query(query, offset, limit).await
    }

    async fn list_by_account(
        &self,
        account: &str,
        offset: u64,
        limit: u64,
    ) -> Result<Page<ConnectorClientState>, TetherError> {
        validate_account(account)?;
        let query = connections::Entity::find()
            .filter(connections::Column::Account.eq(account))
            .order_by_asc(connections::Column::ClientId);
        self.page_query(query, offset, limit).await
    }

    async fn list_all(
        &self,
        offset: u64,
        limit: u64,
    ) -> Result<Page<ConnectorClientState>, TetherError> {
        let query = connections::Entity::find()
            .order_by_asc(connections::Column::Account)
            .order_by_asc(connections::Column::ClientId);
        self.page_query(query, offset, limit).await
    }

    async fn list_stale(
        &self,
        cutoff: DateTime<Utc>,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<ConnectorClientState>, TetherError> {
        validate_limit(limit)?;
        // Dispatcher capability is matched on the serialized document;
        // the quoted key form cannot collide with metadata values.
        let playbook = format!("\"{}\"", DISPATCHER_PLAYBOOK);
        let package_manager = format!("\"{}\"", DISPATCHER_PACKAGE_MANAGER);
        let models = self
            .with_deadline(
                connections::Entity::find()
                    .filter(connections::Column::OrgId.ne(""))
                    .filter(connections::Column::CanonicalFacts.is_not_null())
                    .filter(connections::Column::CanonicalFacts.ne("{}"))
                    .filter(
                        Condition::any()
                            .add(connections::Column::Dispatchers.contains(playbook.as_str()))
                            .add(connections::Column::Dispatchers.contains(package_manager.as_str())),
                    )
                    .filter(connections::Column::StaleTimestamp.lt(cutoff))
                    .order_by_asc(connections::Column::StaleTimestamp)
                    .offset(offset)
                    .limit(limit)
                    .all(&self.db),
            )
            .await?;
        models
            .into_iter()
            .map(ConnectorClientState::try_from)
            .collect()
    }

    async fn list_tenantless(
        &self,
        cutoff: DateTime<Utc>,
        offset: u64,
        limit: u64,
        ceiling: i32,
    ) -> Result<Vec<ConnectorClientState>, TetherError> {
        validate_limit(limit)?;
        let models = self
            .with_deadline(
                connections::Entity::find()
                    .filter(connections::Column::OrgId.eq(""))
                    .filter(connections::Column::TenantLookupTimestamp.is_not_null())
                    .filter(connections::Column::TenantLookupTimestamp.lt(cutoff))
                    .filter(connections::Column::TenantLookupFailureCount.lt(ceiling))
                    .order_by_asc(connections::Column::TenantLookupTimestamp)
                    .offset(offset)
                    .limit(limit)
                    .all(&self.db),
            )
            .await?;
        models
            .into_iter()
            .map(ConnectorClientState::try_from)
            .collect()
    }

    async fn record_stale_refresh(&self, client_id: &str) -> Result<(), TetherError> {
        validate_client_id(client_id)?;
        let now = now_utc();
        let mut active: connections::ActiveModel = self.require_model(client_id).await?.into();
        active.stale_timestamp = Set(now);
        active.updated_at = Set(now);
        active.tenant_lookup_timestamp = Set(None);
        active.tenant_lookup_failure_count = Set(0);
        self.with_deadline(active.update(&self.db)).await?;
        Ok(())
    }

    async fn record_tenant_lookup_success(
        &self,
        client_id: &str,
        account: &str,
        org_id: &str,
    ) -> Result<(), TetherError> {
        validate_client_id(client_id)?;
        let mut active: connections::ActiveModel = self.require_model(client_id).await?.into();
        active.org_id = Set(org_id.to_string());
        active.account = Set(account.to_string());
        active.updated_at = Set(now_utc());
        active.tenant_lookup_timestamp = Set(None);
        active.tenant_lookup_failure_count = Set(0);
        self.with_deadline(active.update(&self.db)).await?;
        Ok(())
    }

    async fn record_tenant_lookup_failure(&self, client_id: &str) -> Result<(), TetherError> {
        validate_client_id(client_id)?;
        let now = now_utc();
        let model = self.require_model(client_id).await?;
        let count = model.tenant_lookup_failure_count;
        let mut active: connections::ActiveModel = model.into();
        active.org_id = Set(String::new());
        active.account = Set(String::new());
        active.updated_at = Set(now);
        active.tenant_lookup_timestamp = Set(Some(now));
        active.tenant_lookup_failure_count = Set(count + 1);
        self.with_deadline(active.update(&self.db)).await?;
        Ok(())
    }

    async fn record_max_tenant_lookup_failures(
        &self,
        client_id: &str,
        ceiling: i32,
    ) -> Result<(), TetherError> {
        validate_client_id(client_id)?;
        let now = now_utc();
        let model = self.require_model(client_id).await?;
        let count = (model.tenant_lookup_failure_count + 1).max(ceiling);
        let mut active: connections::ActiveModel = model.into();
        active.org_id = Set(String::new());
        active.account = Set(String::new());
        active.updated_at = Set(now);
        active.tenant_lookup_timestamp = Set(Some(now));
        active.tenant_lookup_failure_count = Set(count);
        self.with_deadline(active.update(&self.db)).await?;
        Ok(())
    }

    async fn purge_created_before(&self, cutoff: DateTime<Utc>) -> Result<u64, TetherError> {
        let result = self
            .with_deadline(
                connections::Entity::delete_many()
                    .filter(connections::Column::CreatedAt.lt(cutoff))
                    .exec(&self.db),
            )
            .await?;
        Ok(result.rows_affected)
    }
}
