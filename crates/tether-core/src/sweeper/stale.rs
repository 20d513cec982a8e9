//! Staleness sweeper
//!
//! Refreshes inventory for every still-live agent one hour before its
//! platform record would go stale. Rows are processed oldest-first;
//! a refreshed row leaves the sweep window, so paging advances the
//! offset only past failed rows.

use std::sync::Arc;

use chrono::Duration;

use tether_common::TetherError;
use tether_persistence::ConnectionStore;

use crate::identity::IdentityResolver;
use crate::inventory::InventoryReporter;
use crate::metrics;
use crate::sweeper::SweepReport;

/// Refresh margin: agents are refreshed this long before their
/// inventory records would go stale.
const REFRESH_MARGIN: Duration = Duration::hours(1);

pub struct StaleSweeper {
    store: Arc<dyn ConnectionStore>,
    resolver: Arc<dyn IdentityResolver>,
    inventory: Arc<dyn InventoryReporter>,
    /// How long inventory vouches for a host after one report
    stale_offset: Duration,
    chunk: u64,
}

impl StaleSweeper {
    pub fn new(
        store: Arc<dyn ConnectionStore>,
        resolver: Arc<dyn IdentityResolver>,
        inventory: Arc<dyn InventoryReporter>,
        stale_offset: Duration,
        chunk: u64,
    ) -> Self {
        Self {
            store,
            resolver,
            inventory,
            stale_offset,
            chunk,
        }
    }

    /// One sweep over every eligible row.
    pub async fn run_once(&self) -> Result<SweepReport, TetherError> {
        let cutoff = tether_common::now_utc() - (self.stale_offset - REFRESH_MARGIN);
        let mut report = SweepReport::default();
        // Refreshed rows and identity failures (org cleared) leave the
        // sweep window; only rows whose inventory refresh failed stay
        // in it, sorted first. Skip exactly those.
        let mut stuck = 0;

        loop {
            let rows = self.store.list_stale(cutoff, stuck, self.chunk).await?;
            if rows.is_empty() {
                break;
            }
            for row in rows {
                report.processed += 1;
                match self.refresh(&row.client_id).await {
                    RowOutcome::Refreshed => {
                        report.succeeded += 1;
                        metrics::record_sweep_row("stale", "refreshed");
                    }
                    RowOutcome::Requeued(e) => {
                        report.failed += 1;
                        metrics::record_sweep_row("stale", "failed");
                        tracing::error!(
                            client_id = %row.client_id,
                            error = %e,
                            "Identity resolution failed, row handed to tenantless sweep"
                        );
                    }
                    RowOutcome::Stuck(e) => {
                        report.failed += 1;
                        stuck += 1;
                        metrics::record_sweep_row("stale", "failed");
                        tracing::error!(
                            client_id = %row.client_id,
                            error = %e,
                            "Stale refresh failed, row retried next sweep"
                        );
                    }
                }
            }
        }

        tracing::info!(
            processed = report.processed,
            refreshed = report.succeeded,
            failed = report.failed,
            "Staleness sweep complete"
        );
        Ok(report)
    }

    async fn refresh(&self, client_id: &str) -> RowOutcome {
        let resolved = match self.resolver.resolve(client_id).await {
            Ok(resolved) => resolved,
            Err(e) => {
                // hand the row to the tenantless sweeper for retry
                return match self.store.record_tenant_lookup_failure(client_id).await {
                    Ok(()) => RowOutcome::Requeued(e),
                    Err(store_err) => RowOutcome::Stuck(store_err),
                };
            }
        };

        let state = match self.store.find_by_client_id(client_id).await {
            Ok(state) => state,
            // deleted underneath the sweep; nothing left to refresh
            Err(TetherError::NotFound) => return RowOutcome::Refreshed,
            Err(e) => return RowOutcome::Stuck(e),
        };
        if let Err(e) = self.inventory.report(&resolved.identity, &state).await {
            return RowOutcome::Stuck(e);
        }
        match self.store.record_stale_refresh(client_id).await {
            Ok(()) => RowOutcome::Refreshed,
            Err(e) => RowOutcome::Stuck(e),
        }
    }
}

/// Where one swept row ended up relative to the sweep window
enum RowOutcome {
    /// Refreshed (or gone); out of the window
    Refreshed,
    /// Failure recorded for the tenantless sweeper; out of the window
    Requeued(TetherError),
    /// Still inside the window; retried next sweep
    Stuck(TetherError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::ResolvedIdentity;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::json;
    use tether_persistence::{ConnectorClientState, MemoryConnectionStore, MessageMetadata};

    struct StaticResolver {
        fail_for: Option<String>,
    }

    #[async_trait]
    impl IdentityResolver for StaticResolver {
        async fn resolve(&self, client_id: &str) -> Result<ResolvedIdentity, TetherError> {
            if self.fail_for.as_deref() == Some(client_id) {
                return Err(TetherError::Transient("gateway down".to_string()));
            }
            Ok(ResolvedIdentity {
                identity: "aWRlbnRpdHk=".to_string(),
                account: "0001".to_string(),
                org_id: "org-1".to_string(),
            })
        }
    }

    #[derive(Default)]
    struct RecordingInventory {
        reported: Mutex<Vec<String>>,
        fail_for: Option<String>,
    }

    #[async_trait]
    impl InventoryReporter for RecordingInventory {
        async fn report(
            &self,
            _identity: &str,
            state: &ConnectorClientState,
        ) -> Result<(), TetherError> {
            if self.fail_for.as_deref() == Some(state.client_id.as_str()) {
                return Err(TetherError::Transient("inventory down".to_string()));
            }
            self.reported.lock().push(state.client_id.clone());
            Ok(())
        }
    }

    async fn seed(store: &MemoryConnectionStore, client_id: &str) {
        let now = tether_common::now_utc();
        store
            .register(&ConnectorClientState {
                client_id: client_id.to_string(),
                org_id: "org-1".to_string(),
                account: "0001".to_string(),
                canonical_facts: Some(json!({"fqdn": "host.example.com"})),
                dispatchers: json!({"rhc-worker-playbook": {}}),
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
    }

    fn sweeper(
        store: Arc<MemoryConnectionStore>,
        inventory: Arc<RecordingInventory>,
        fail_for: Option<&str>,
    ) -> StaleSweeper {
        StaleSweeper::new(
            store,
            Arc::new(StaticResolver {
                fail_for: fail_for.map(str::to_string),
            }),
            inventory,
            // a one-hour offset puts the cutoff at the sweep start:
            // rows stamped before the sweep are due, rows the sweep
            // refreshes have left the window
            Duration::hours(1),
            2,
        )
    }

    /// Let the clock move past the seeded stale timestamps.
    async fn settle() {
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }

    #[tokio::test]
    async fn test_sweep_refreshes_eligible_rows() {
        let store = Arc::new(MemoryConnectionStore::new());
        let inventory = Arc::new(RecordingInventory::default());
        for id in ["c1", "c2", "c3"] {
            seed(&store, id).await;
        }
        settle().await;

        let before = store.find_by_client_id("c1").await.unwrap().stale_timestamp;
        let report = sweeper(store.clone(), inventory.clone(), None)
            .run_once()
            .await
            .unwrap();

        // every eligible row was refreshed exactly once
        assert_eq!(report.processed, 3);
        assert_eq!(report.succeeded, 3);
        assert_eq!(report.failed, 0);
        assert_eq!(inventory.reported.lock().len(), 3);

        let after = store.find_by_client_id("c1").await.unwrap().stale_timestamp;
        assert!(after > before);
    }

    #[tokio::test]
    async fn test_single_row_failure_does_not_abort_sweep() {
        let store = Arc::new(MemoryConnectionStore::new());
        let inventory = Arc::new(RecordingInventory::default());
        for id in ["c1", "c2", "c3"] {
            seed(&store, id).await;
        }
        settle().await;

        let report = sweeper(store.clone(), inventory.clone(), Some("c2"))
            .run_once()
            .await
            .unwrap();

        assert_eq!(report.processed, 3);
        assert_eq!(report.succeeded, 2);
        assert_eq!(report.failed, 1);

        // the failed row was handed to the tenantless sweeper
        let failed = store.find_by_client_id("c2").await.unwrap();
        assert_eq!(failed.tenant_lookup_failure_count, 1);
        assert!(failed.tenant_lookup_timestamp.is_some());
        assert!(failed.org_id.is_empty());
    }

    #[tokio::test]
    async fn test_inventory_failure_leaves_row_for_next_sweep() {
        let store = Arc::new(MemoryConnectionStore::new());
        let inventory = Arc::new(RecordingInventory {
            fail_for: Some("c2".to_string()),
            ..Default::default()
        });
        for id in ["c1", "c2", "c3"] {
            seed(&store, id).await;
        }
        settle().await;

        let report = sweeper(store.clone(), inventory, None).run_once().await.unwrap();
        assert_eq!(report.processed, 3);
        assert_eq!(report.succeeded, 2);
        assert_eq!(report.failed, 1);

        // the failed row keeps its tenant and its old stale timestamp
        let failed = store.find_by_client_id("c2").await.unwrap();
        assert_eq!(failed.org_id, "org-1");
        assert_eq!(failed.tenant_lookup_failure_count, 0);
    }

    #[tokio::test]
    async fn test_refreshed_rows_clear_tenant_bookkeeping() {
        let store = Arc::new(MemoryConnectionStore::new());
        let inventory = Arc::new(RecordingInventory::default());
        seed(&store, "c1").await;
        settle().await;

        sweeper(store.clone(), inventory, None).run_once().await.unwrap();

        let state = store.find_by_client_id("c1").await.unwrap();
        assert_eq!(state.tenant_lookup_failure_count, 0);
        assert!(state.tenant_lookup_timestamp.is_none());
    }
}
