//! Retention sweeper
//!
//! Deletion by age with an explicit cutoff. Off by default; only
//! deployments that cap record lifetime schedule it.

use std::sync::Arc;

use chrono::Duration;

use tether_common::TetherError;
use tether_persistence::ConnectionStore;

use crate::metrics;

pub struct RetentionSweeper {
    store: Arc<dyn ConnectionStore>,
    /// Maximum record age before deletion
    max_age: Duration,
}

impl RetentionSweeper {
    pub fn new(store: Arc<dyn ConnectionStore>, max_age: Duration) -> Self {
        Self { store, max_age }
    }

    /// Delete every record created before `now - max_age`. Returns the
    /// number of rows removed.
    pub async fn run_once(&self) -> Result<u64, TetherError> {
        let cutoff = tether_common::now_utc() - self.max_age;
        let purged = self.store.purge_created_before(cutoff).await?;
        if purged > 0 {
            metrics::record_sweep_row("retention", "purged");
            tracing::info!(purged, cutoff = %cutoff, "Aged connections purged");
        }
        Ok(purged)
    }
}
