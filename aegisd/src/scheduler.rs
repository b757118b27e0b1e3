//! Cycle Scheduler
//!
//! Drives the monitor on a fixed cadence. Cycles run strictly one at a
//! time: the loop awaits each cycle before sleeping, so two cycles can
//! never race on the same trailing state. Shutdown finishes the
//! in-flight cycle before stopping.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use aegis_exec::OrderExecutionPort;

use crate::monitor::RiskMonitor;

/// Runs monitoring cycles until shutdown.
pub struct Scheduler<O: OrderExecutionPort + 'static> {
    monitor: Arc<RiskMonitor<O>>,
    interval: Duration,
    shutdown: CancellationToken,
}

impl<O: OrderExecutionPort + 'static> Scheduler<O> {
    /// Create a new scheduler.
    pub fn new(monitor: Arc<RiskMonitor<O>>, interval: Duration) -> Self {
        Self { monitor, interval, shutdown: CancellationToken::new() }
    }

    /// Token that stops the loop when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Request a graceful stop: the in-flight cycle completes first.
    pub fn request_shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Start the scheduler in the background.
    ///
    /// Runs one cycle immediately, then one per interval.
    pub fn start(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(interval_secs = self.interval.as_secs(), "Risk monitor scheduler started");

            loop {
                let started = Utc::now();
                match self.monitor.run_cycle(started).await {
                    Ok(summary) => {
                        info!(
                            monitored = summary.positions_monitored,
                            executed = summary.orders_executed,
                            alerts = summary.alerts_raised,
                            "Scheduled cycle finished"
                        );
                    },
                    Err(e) => {
                        error!(error = %e, "Scheduled cycle failed");
                    },
                }

                tokio::select! {
                    _ = self.shutdown.cancelled() => {
                        info!("Risk monitor scheduler stopped");
                        break;
                    }
                    _ = tokio::time::sleep(self.interval) => {}
                }
            }
        })
    }
}

// =============================================================================
// Tests
// =============================================================================
