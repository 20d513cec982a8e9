//! In-memory store backend
//!
//! Used by tests and single-node development. Semantics match the SQL
//! backend exactly: same validation, same sweep predicates, same
//! orderings.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use tether_common::{
    DISPATCHER_PACKAGE_MANAGER, DISPATCHER_PLAYBOOK, DISPATCHER_SATELLITE, TetherError, now_utc,
};

use crate::model::{ConnectorClientState, Page};
use crate::traits::{
    ConnectionStore, validate_account, validate_client_id, validate_limit, validate_org_id,
};

/// Map-backed connection store
#[derive(Default)]
pub struct MemoryConnectionStore {
    records: RwLock<HashMap<String, ConnectorClientState>>,
}

impl MemoryConnectionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    fn page(
        &self,
        mut rows: Vec<ConnectorClientState>,
        offset: u64,
        limit: u64,
    ) -> Page<ConnectorClientState> {
        let total = rows.len() as u64;
        let items = if offset >= total {
            Vec::new()
        } else {
            rows.drain(..).skip(offset as usize).take(limit as usize).collect()
        };
        Page { items, total }
    }

    fn scoped(
        state: ConnectorClientState,
        matches_tenant: bool,
        relaxed: bool,
    ) -> Result<ConnectorClientState, TetherError> {
        if matches_tenant || (relaxed && state.has_dispatcher(DISPATCHER_SATELLITE)) {
            Ok(state)
        } else {
            Err(TetherError::NotFound)
        }
    }
}

#[async_trait]
impl ConnectionStore for MemoryConnectionStore {
    async fn register(&self, state: &ConnectorClientState) -> Result<(), TetherError> {
        validate_client_id(&state.client_id)?;
        let now = now_utc();
        let mut records = self.records.write();
        match records.get_mut(&state.client_id) {
            Some(existing) => {
                existing.org_id = state.org_id.clone();
                existing.account = state.account.clone();
                existing.canonical_facts = state.canonical_facts.clone();
                existing.dispatchers = state.dispatchers.clone();
                existing.tags = state.tags.clone();
                existing.message_metadata = state.message_metadata.clone();
                existing.updated_at = now;
                existing.stale_timestamp = now;
            }
            None => {
                let mut created = state.clone();
                created.created_at = now;
                created.updated_at = now;
                created.stale_timestamp = now;
                records.insert(state.client_id.clone(), created);
            }
        }
        Ok(())
    }

    async fn unregister(&self, client_id: &str) -> Result<(), TetherError> {
        validate_client_id(client_id)?;
        self.records.write().remove(client_id);
        Ok(())
    }

    async fn find_by_client_id(
        &self,
        client_id: &str,
    ) -> Result<ConnectorClientState, TetherError> {
        validate_client_id(client_id)?;
        self.records
            .read()
            .get(client_id)
            .cloned()
            .ok_or(TetherError::NotFound)
    }

    async fn find_by_org_and_client_id(
        &self,
        org_id: &str,
        client_id: &str,
        relaxed: bool,
    ) -> Result<ConnectorClientState, TetherError> {
        validate_org_id(org_id)?;
        let state = self.find_by_client_id(client_id).await?;
        let matches = state.org_id == org_id;
        Self::scoped(state, matches, relaxed)
    }

    async fn find_by_account_and_client_id(
        &self,
        account: &str,
        client_id: &str,
        relaxed: bool,
    ) -> Result<ConnectorClientState, TetherError> {
        validate_account(account)?;
        let state = self.find_by_client_id(client_id).await?;
        let matches = state.account == account;
        Self::scoped(state, matches, relaxed)
    }

    async fn list_by_org(
        &self,
        org_id: &str,
        offset: u64,
        limit: u64,
    ) -> Result<Page<ConnectorClientState>, TetherError> {
        validate_org_id(org_id)?;
        validate_limit(limit)?;
        let mut rows: Vec<_> = self
            .records
            .read()
            .values()
            .filter(|r| r.org_id == org_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.client_id.cmp(&b.client_id));
        Ok(self.page(rows, offset, limit))
    }

    async fn list_by_account(
        &self,
        account: &str,
        offset: u64,
        limit: u64,
    ) -> Result<Page<ConnectorClientState>, TetherError> {
        validate_account(account)?;
        validate_limit(limit)?;
        let mut rows: Vec<_> = self
            .records
            .read()
            .values()
            .filter(|r| r.account == account)
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.client_id.cmp(&b.client_id));
        Ok(self.page(rows, offset, limit))
    }

    async fn list_all(
        &self,
        offset: u64,
        limit: u64,
    ) -> Result<Page<ConnectorClientState>, TetherError> {
        validate_limit(limit)?;
        let mut rows: Vec<_> = self.records.read().values().cloned().collect();
        rows.sort_by(|a, b| {
            a.account
                .cmp(&b.account)
                .then_with(|| a.client_id.cmp(&b.client_id))
        });
        Ok(self.page(rows, offset, limit))
    }

    async fn list_stale(
        &self,
        cutoff: DateTime<Utc>,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<ConnectorClientState>, TetherError> {
        validate_limit(limit)?;
        let mut rows: Vec<_> = self
            .records
            .read()
            .values()
            .filter(|r| {
                !r.org_id.is_empty()
                    && r.has_canonical_facts()
                    && (r.has_dispatcher(DISPATCHER_PLAYBOOK)
                        || r.has_dispatcher(DISPATCHER_PACKAGE_MANAGER))
                    && r.stale_timestamp < cutoff
            })
            .cloned()
            .collect();
        rows.sort_by_key(|r| r.stale_timestamp);
        Ok(rows
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect())
    }

    async fn list_tenantless(
        &self,
        cutoff: DateTime<Utc>,
        offset: u64,
        limit: u64,
        ceiling: i32,
    ) -> Result<Vec<ConnectorClientState>, TetherError> {
        validate_limit(limit)?;
        let mut rows: Vec<_> = self
            .records
            .read()
            .values()
            .filter(|r| {
                r.org_id.is_empty()
                    && r.tenant_lookup_timestamp.is_some_and(|ts| ts < cutoff)
                    && r.tenant_lookup_failure_count < ceiling
            })
            .cloned()
            .collect();
        rows.sort_by_key(|r| r.tenant_lookup_timestamp);
        Ok(rows
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect())
    }

    async fn record_stale_refresh(&self, client_id: &str) -> Result<(), TetherError> {
        validate_client_id(client_id)?;
        let now = now_utc();
        let mut records = self.records.write();
        let record = records.get_mut(client_id).ok_or(TetherError::NotFound)?;
        record.stale_timestamp = now;
        record.updated_at = now;
        record.tenant_lookup_timestamp = None;
        record.tenant_lookup_failure_count = 0;
        Ok(())
    }

    async fn record_tenant_lookup_success(
        &self,
        client_id: &str,
        account: &str,
        org_id: &str,
    ) -> Result<(), TetherError> {
        validate_client_id(client_id)?;
        let mut records = self.records.write();
        let record = records.get_mut(client_id).ok_or(TetherError::NotFound)?;
        record.org_id = org_id.to_string();
        record.account = account.to_string();
        record.updated_at = now_utc();
        record.tenant_lookup_timestamp = None;
        record.tenant_lookup_failure_count = 0;
        Ok(())
    }

    async fn record_tenant_lookup_failure(&self, client_id: &str) -> Result<(), TetherError> {
        validate_client_id(client_id)?;
        let now = now_utc();
        let mut records = self.records.write();
        let record = records.get_mut(client_id).ok_or(TetherError::NotFound)?;
        record.org_id = String::new();
        record.account = String::new();
        record.updated_at = now;
        record.tenant_lookup_timestamp = Some(now);
        record.tenant_lookup_failure_count += 1;
        Ok(())
    }

    async fn record_max_tenant_lookup_failures(
        &self,
        client_id: &str,
        ceiling: i32,
    ) -> Result<(), TetherError> {
        validate_client_id(client_id)?;
        let now = now_utc();
        let mut records = self.records.write();
        let record = records.get_mut(client_id).ok_or(TetherError::NotFound)?;
        record.org_id = String::new();
        record.account = String::new();
        record.updated_at = now;
        record.tenant_lookup_timestamp = Some(now);
        record.tenant_lookup_failure_count = (record.tenant_lookup_failure_count + 1).max(ceiling);
        Ok(())
    }

    async fn purge_created_before(&self, cutoff: DateTime<Utc>) -> Result<u64, TetherError> {
        let mut records = self.records.write();
        let before = records.len();
        records.retain(|_, r| r.created_at >= cutoff);
        Ok((before - records.len()) as u64)
    }
}
