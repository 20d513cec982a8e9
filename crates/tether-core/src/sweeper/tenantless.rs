//! Tenantless sweeper
//!
//! Retries tenant resolution for connections that were admitted before
//! their tenant was known. Every processed row leaves the sweep window
//! (success clears the attempt timestamp, failure advances it, the
//! ceiling quarantines), so paging always restarts at the front.

use std::sync::Arc;

use chrono::Duration;

use tether_common::TetherError;
use tether_persistence::ConnectionStore;

use crate::identity::IdentityResolver;
use crate::metrics;
use crate::sweeper::SweepReport;

pub struct TenantlessSweeper {
    store: Arc<dyn ConnectionStore>,
    resolver: Arc<dyn IdentityResolver>,
    /// Minimum wait between lookup attempts for one row
    retry_interval: Duration,
    /// Attempt ceiling; rows at or above it are quarantined
    ceiling: i32,
    chunk: u64,
}

impl TenantlessSweeper {
    pub fn new(
        store: Arc<dyn ConnectionStore>,
        resolver: Arc<dyn IdentityResolver>,
        retry_interval: Duration,
        ceiling: i32,
        chunk: u64,
    ) -> Self {
        Self {
            store,
            resolver,
            retry_interval,
            ceiling,
            chunk,
        }
    }

    /// One sweep over every eligible row.
    pub async fn run_once(&self) -> Result<SweepReport, TetherError> {
        let cutoff = tether_common::now_utc() - self.retry_interval;
        let mut report = SweepReport::default();

        loop {
            let rows = self
                .store
                .list_tenantless(cutoff, 0, self.chunk, self.ceiling)
                .await?;
            if rows.is_empty() {
                break;
            }
            for row in rows {
                report.processed += 1;
                match self.resolver.resolve(&row.client_id).await {
                    Ok(resolved) => {
                        self.store
                            .record_tenant_lookup_success(
                                &row.client_id,
                                &resolved.account,
                                &resolved.org_id,
                            )
                            .await?;
                        report.succeeded += 1;
                        metrics::record_sweep_row("tenantless", "resolved");
                        tracing::info!(
                            client_id = %row.client_id,
                            org_id = %resolved.org_id,
                            "Tenant resolved"
                        );
                    }
                    Err(e) => {
                        report.failed += 1;
                        if row.tenant_lookup_failure_count + 1 >= self.ceiling {
                            self.store
                                .record_max_tenant_lookup_failures(&row.client_id, self.ceiling)
                                .await?;
                            metrics::record_sweep_row("tenantless", "quarantined");
                            tracing::warn!(
                                client_id = %row.client_id,
                                attempts = row.tenant_lookup_failure_count + 1,
                                "Tenant lookup ceiling reached, no further retries"
                            );
                        } else {
                            self.store
                                .record_tenant_lookup_failure(&row.client_id)
                                .await?;
                            metrics::record_sweep_row("tenantless", "failed");
                            tracing::debug!(
                                client_id = %row.client_id,
                                error = %e,
                                "Tenant lookup failed, retried next sweep"
                            );
                        }
                    }
                }
            }
        }

        tracing::info!(
            processed = report.processed,
            resolved = report.succeeded,
            failed = report.failed,
            "Tenantless sweep complete"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::ResolvedIdentity;
    use async_trait::async_trait;
    use serde_json::json;
    use tether_persistence::{ConnectorClientState, MemoryConnectionStore, MessageMetadata};

    struct StaticResolver {
        fail: bool,
    }

    #[async_trait]
    impl IdentityResolver for StaticResolver {
        async fn resolve(&self, _client_id: &str) -> Result<ResolvedIdentity, TetherError> {
            if self.fail {
                return Err(TetherError::Transient("gateway down".to_string()));
            }
            Ok(ResolvedIdentity {
                identity: "aWRlbnRpdHk=".to_string(),
                account: "0001".to_string(),
                org_id: "org-1".to_string(),
            })
        }
    }

    async fn seed_tenantless(store: &MemoryConnectionStore, client_id: &str) {
        let now = tether_common::now_utc();
        store
            .register(&ConnectorClientState {
                client_id: client_id.to_string(),
                org_id: String::new(),
                account: String::new(),
                canonical_facts: None,
                dispatchers: json!({}),
                tags: json!({}),
                message_metadata: MessageMetadata {
                    latest_message_id: "m1".to_string(),
                    latest_timestamp: now,
                },
                created_at: now,
                updated_at: now,
                stale_timestamp: now,
                tenant_lookup_timestamp: None,
                tenant_lookup_failure_count: 0,
            })
            .await
            .unwrap();
        // an initial failed attempt puts the row into the sweep window
        store.record_tenant_lookup_failure(client_id).await.unwrap();
    }

    fn sweeper(
        store: Arc<MemoryConnectionStore>,
        fail: bool,
        ceiling: i32,
    ) -> TenantlessSweeper {
        TenantlessSweeper::new(
            store,
            Arc::new(StaticResolver { fail }),
            // zero interval: anything stamped before the sweep is due,
            // anything stamped by the sweep has left the window
            Duration::zero(),
            ceiling,
            10,
        )
    }

    /// Let the clock move past the seeded attempt timestamps.
    async fn settle() {
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }

    #[tokio::test]
    async fn test_resolution_fills_tenant() {
        let store = Arc::new(MemoryConnectionStore::new());
        seed_tenantless(&store, "c1").await;
        settle().await;

        let report = sweeper(store.clone(), false, 5).run_once().await.unwrap();
        assert_eq!(report.succeeded, 1);

        let state = store.find_by_client_id("c1").await.unwrap();
        assert_eq!(state.org_id, "org-1");
        assert_eq!(state.account, "0001");
        assert_eq!(state.tenant_lookup_failure_count, 0);
        assert!(state.tenant_lookup_timestamp.is_none());

        // resolved rows left the window
        settle().await;
        let report = sweeper(store, false, 5).run_once().await.unwrap();
        assert_eq!(report.processed, 0);
    }

    #[tokio::test]
    async fn test_failure_advances_bookkeeping() {
        let store = Arc::new(MemoryConnectionStore::new());
        seed_tenantless(&store, "c1").await;
        settle().await;

        let report = sweeper(store.clone(), true, 5).run_once().await.unwrap();
        assert_eq!(report.failed, 1);

        let state = store.find_by_client_id("c1").await.unwrap();
        assert_eq!(state.tenant_lookup_failure_count, 2);
        assert!(state.org_id.is_empty());
    }

    #[tokio::test]
    async fn test_ceiling_quarantines_row() {
        let store = Arc::new(MemoryConnectionStore::new());
        seed_tenantless(&store, "c1").await;
        settle().await;

        // ceiling 2: the seeded row already failed once, the next
        // failure quarantines it
        let report = sweeper(store.clone(), true, 2).run_once().await.unwrap();
        assert_eq!(report.processed, 1);
        assert_eq!(report.failed, 1);

        let state = store.find_by_client_id("c1").await.unwrap();
        assert!(state.tenant_lookup_failure_count >= 2);

        // quarantined: excluded from every later sweep
        settle().await;
        let report = sweeper(store.clone(), true, 2).run_once().await.unwrap();
        assert_eq!(report.processed, 0);

        // the record itself stays in the store
        assert!(store.find_by_client_id("c1").await.is_ok());
    }
}
