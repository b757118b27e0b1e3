//! Daemon error types.

use aegis_domain::DomainError;
use aegis_engine::EngineError;
use aegis_exec::{ExecError, ProviderError};
use aegis_store::StoreError;
use thiserror::Error;

/// Daemon-level errors.
#[derive(Debug, Error)]
pub enum DaemonError {
    /// Domain error
    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),

    /// Engine error
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    /// Execution error
    #[error("Execution error: {0}")]
    Exec(#[from] ExecError),

    /// Store error
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Data provider error
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// A cycle was invoked while the previous one was still running
    #[error("Monitoring cycle already in progress")]
    CycleInProgress,

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type for daemon operations.
pub type DaemonResult<T> = Result<T, DaemonError>;
