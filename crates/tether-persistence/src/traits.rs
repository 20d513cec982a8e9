//! Store trait abstraction
//!
//! The `ConnectionStore` is the only shared mutable resource in the
//! process; both backends implement it. Writes are single-row; the
//! duplicate/older handshake guard is enforced by the caller before
//! `register` (see the pipeline), which makes concurrent handlers for
//! the same agent commutative.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use tether_common::{TetherError, utils::is_blank};

use crate::model::{ConnectorClientState, Page};

#[async_trait]
pub trait ConnectionStore: Send + Sync {
    /// Upsert by `client_id`. Inserts a new record or overwrites
    /// `dispatchers`, `tags`, `canonical_facts`, `message_metadata`,
    /// `org_id`, `account`, `updated_at` and `stale_timestamp` of an
    /// existing one.
    async fn register(&self, state: &ConnectorClientState) -> Result<(), TetherError>;

    /// Delete the record. Missing rows are success.
    async fn unregister(&self, client_id: &str) -> Result<(), TetherError>;

    async fn find_by_client_id(&self, client_id: &str)
    -> Result<ConnectorClientState, TetherError>;

    /// Tenant-scoped lookup. The strict form (`relaxed = false`)
    /// requires an exact `org_id` match; the relaxed form also returns
    /// a row advertising the `foreman_rh_cloud` dispatcher regardless
    /// of its `org_id`.
    async fn find_by_org_and_client_id(
        &self,
        org_id: &str,
        client_id: &str,
        relaxed: bool,
    ) -> Result<ConnectorClientState, TetherError>;

    /// Legacy variant keyed on the account number.
    async fn find_by_account_and_client_id(
        &self,
        account: &str,
        client_id: &str,
        relaxed: bool,
    ) -> Result<ConnectorClientState, TetherError>;

    /// Page of connections within one tenant, ordered by `client_id` asc.
    async fn list_by_org(
        &self,
        org_id: &str,
        offset: u64,
        limit: u64,
    ) -> Result<Page<ConnectorClientState>, TetherError>;

    /// Legacy variant keyed on the account number.
    async fn list_by_account(
        &self,
        account: &str,
        offset: u64,
        limit: u64,
    ) -> Result<Page<ConnectorClientState>, TetherError>;

    /// Page over every connection, ordered by `(account, client_id)`.
    async fn list_all(&self, offset: u64, limit: u64)
    -> Result<Page<ConnectorClientState>, TetherError>;

    /// One chunk of the staleness sweep: rows with a known tenant,
    /// non-empty canonical facts, at least one inventory-relevant
    /// dispatcher, and `stale_timestamp < cutoff`; ordered by
    /// `stale_timestamp` asc. Refreshed rows leave the window, so the
    /// sweeper pages with `offset` equal to its failed-row count.
    async fn list_stale(
        &self,
        cutoff: DateTime<Utc>,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<ConnectorClientState>, TetherError>;

    /// One chunk of the tenantless sweep: rows with empty `org_id`, a
    /// previous lookup attempt older than `cutoff`, and a failure
    /// count below `ceiling`; ordered by `tenant_lookup_timestamp` asc.
    async fn list_tenantless(
        &self,
        cutoff: DateTime<Utc>,
        offset: u64,
        limit: u64,
        ceiling: i32,
    ) -> Result<Vec<ConnectorClientState>, TetherError>;

    /// Advance `stale_timestamp` to now and clear the tenant-lookup
    /// bookkeeping.
    async fn record_stale_refresh(&self, client_id: &str) -> Result<(), TetherError>;

    /// Set the resolved tenant and clear the tenant-lookup bookkeeping.
    async fn record_tenant_lookup_success(
        &self,
        client_id: &str,
        account: &str,
        org_id: &str,
    ) -> Result<(), TetherError>;

    /// Clear the tenant, stamp the attempt time, and increment the
    /// failure count.
    async fn record_tenant_lookup_failure(&self, client_id: &str) -> Result<(), TetherError>;

    /// Terminal failure record: the count is raised to at least
    /// `ceiling`, which excludes the row from future sweeps. Only a
    /// new online handshake supplying identity brings it back.
    async fn record_max_tenant_lookup_failures(
        &self,
        client_id: &str,
        ceiling: i32,
    ) -> Result<(), TetherError>;

    /// Deletion by age with an explicit cutoff. Returns the number of
    /// rows removed.
    async fn purge_created_before(&self, cutoff: DateTime<Utc>) -> Result<u64, TetherError>;
}

/// Reject blank client ids before touching the backend.
pub fn validate_client_id(client_id: &str) -> Result<(), TetherError> {
    if is_blank(client_id) {
        return Err(TetherError::InvalidClientId);
    }
    Ok(())
}

/// Reject blank org ids before touching the backend.
pub fn validate_org_id(org_id: &str) -> Result<(), TetherError> {
    if is_blank(org_id) {
        return Err(TetherError::InvalidOrgId);
    }
    Ok(())
}

/// Reject blank accounts before touching the backend.
pub fn validate_account(account: &str) -> Result<(), TetherError> {
    if is_blank(account) {
        return Err(TetherError::InvalidAccount);
    }
    Ok(())
}

/// Paging limits must be positive.
pub fn validate_limit(limit: u64) -> Result<(), TetherError> {
    if limit == 0 {
        return Err(TetherError::Validation("limit must be positive".to_string()));
    }
    Ok(())
}
