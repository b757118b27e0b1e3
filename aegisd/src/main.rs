//! Aegis Daemon
//!
//! Position risk-monitoring daemon: volatility envelopes, trailing
//! stops, and protective exits for open spot positions.
//!
//! # Usage
//!
//! ```bash
//! # Start with default configuration
//! cargo run -p aegisd
//!
//! # Start with custom environment
//! AEGIS_ENV=test AEGIS_CYCLE_INTERVAL_SECS=300 cargo run -p aegisd
//! ```
//!
//! # Environment Variables
//!
//! - `AEGIS_ENV`: Environment (test, development, production)
//! - `AEGIS_QUOTE_CURRENCY`: Quote currency (default: KRW)
//! - `AEGIS_ATR_WINDOW`: ATR window length (default: 14)
//! - `AEGIS_STOP_LOSS_MULT` / `AEGIS_TAKE_PROFIT_MULT` /
//!   `AEGIS_TRAILING_MULT`: envelope multipliers (2.0 / 3.0 / 1.5)
//! - `AEGIS_CYCLE_INTERVAL_SECS`: cycle cadence (default: 3600)
//! - `AEGIS_CYCLE_TIMEOUT_SECS`: per-cycle deadline (default: 120)
//! - `AEGIS_RECONCILE_INTERVAL_SECS`: full ledger sync period (14400)
//! - `AEGIS_TEST_MODE`: cap order sizes (default: true)

use std::sync::Arc;
use std::time::Duration;

use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use aegisd::{Config, RiskMonitor, Scheduler};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive("aegisd=info".parse()?))
        .init();

    // Load configuration
    let config = Config::from_env()?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        environment = %config.environment,
        quote_currency = %config.quote_currency,
        cycle_interval_secs = config.monitor.cycle_interval_secs,
        test_mode = config.execution.test_mode,
        "Aegis daemon"
    );

    let interval = Duration::from_secs(config.monitor.cycle_interval_secs);
    let monitor = RiskMonitor::new_stub(config);
    let scheduler = Arc::new(Scheduler::new(monitor, interval));

    let handle = scheduler.clone().start();

    // Graceful shutdown on SIGINT; the in-flight cycle completes first
    tokio::signal::ctrl_c().await?;
    info!("Received shutdown signal");
    scheduler.request_shutdown();
    handle.await?;

    Ok(())
}
