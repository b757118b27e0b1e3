//! Aegis Execution Layer
//!
//! Ports for the external collaborators (market data, account, order
//! execution, ledger, alerting) and the idempotent exit executor.
//!
//! # Architecture
//!
//! ```text
//! Engine Decision → ExitExecutor → OrderExecutionPort → ExecutionRecord
//! ```
//!
//! The executor threads a three-outcome result through every call site:
//! `Succeeded`, `Failed` (never submitted — safe to retry next cycle) and
//! `Unknown` (submitted but unconfirmed — must never be retried blindly).

#![warn(clippy::all)]

pub mod error;
pub mod executor;
pub mod ports;
pub mod stub;

// Re-exports for convenience
pub use error::{ExecError, ExecResult};
pub use executor::{
    ExecutionOutcome, ExecutionRecord, ExecutorConfig, ExitExecutor, ExitRequest, RetryPolicy,
};
pub use ports::{
    AccountPort, AlertSink, ExitFill, LedgerError, LedgerPort, MarketDataPort, OrderError,
    OrderExecutionPort, ProviderError, Severity,
};
pub use stub::{MemoryLedger, OrderBehavior, RecordingAlertSink, StubAccount, StubMarketData, StubOrderService};
