//! Aegis Daemon
//!
//! Runtime orchestrator for the position risk-monitoring engine:
//! configuration, the per-cycle monitor, and the scheduler that drives
//! non-overlapping cycles until shutdown.

#![warn(clippy::all)]

pub mod alerts;
pub mod config;
pub mod error;
pub mod monitor;
pub mod scheduler;

pub use alerts::LogAlertSink;
pub use config::{Config, Environment};
pub use error::{DaemonError, DaemonResult};
pub use monitor::{CycleSummary, RiskMonitor};
pub use scheduler::Scheduler;
