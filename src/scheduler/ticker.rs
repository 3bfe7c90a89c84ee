//! Background ticker that runs the drip cycle on an interval.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::scheduler::cycle::DripCycle;

/// Spawn a background task that runs a cycle every `interval`.
///
/// The external cron endpoint remains the primary trigger; this ticker is a
/// safety net for deployments without one. The cycle's internal run lock
/// serializes a tick that lands while a cron-triggered run is in flight.
pub fn spawn_cycle_ticker(cycle: Arc<DripCycle>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // First tick fires immediately; skip it so startup does not race
        // an external trigger.
        ticker.tick().await;

        info!(interval_secs = interval.as_secs(), "Cycle ticker started");
        loop {
            ticker.tick().await;
            match cycle.run(Utc::now()).await {
                Ok(report) if report.sent > 0 || report.failed > 0 => {
                    info!(sent = report.sent, failed = report.failed, "Ticker cycle finished");
                }
                Ok(_) => {}
                Err(e) => error!("Ticker cycle failed: {e}"),
            }
        }
    })
}
