//! Reconciliation sweepers
//!
//! Each sweeper does one bounded unit of work per `run_once` call and
//! reports per-row outcomes without aborting the sweep. The server
//! schedules them on configured intervals; an interval of zero leaves
//! a sweeper to external scheduling.

pub mod retention;
pub mod stale;
pub mod tenantless;

use std::future::Future;
use std::time::Duration;

use tokio::sync::broadcast;

pub use retention::RetentionSweeper;
pub use stale::StaleSweeper;
pub use tenantless::TenantlessSweeper;

/// Outcome counts of one sweep invocation
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub processed: u64,
    pub succeeded: u64,
    pub failed: u64,
}

/// Drive a sweeper on a fixed interval until shutdown.
pub async fn run_periodically<F, Fut>(
    name: &'static str,
    interval: Duration,
    mut shutdown: broadcast::Receiver<()>,
    sweep: F,
) where
    F: Fn() -> Fut,
    Fut: Future<Output = ()>,
{
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    tracing::info!(sweeper = name, interval_secs = interval.as_secs(), "Sweeper scheduled");

    loop {
        tokio::select! {
            _ = ticker.tick() => sweep().await,
            _ = shutdown.recv() => {
                tracing::info!(sweeper = name, "Sweeper stopped");
                return;
            }
        }
    }
}
