//! Execution layer error types.

use rust_decimal::Decimal;
use thiserror::Error;

/// Errors that can occur during execution operations.
///
/// Order submission results are NOT errors: the executor threads them
/// through `ExecutionRecord.outcome` so call sites must handle the
/// ambiguous case explicitly. These variants cover preconditions that
/// stop a submission from being attempted at all.
#[derive(Debug, Error)]
pub enum ExecError {
    /// Domain error
    #[error("Domain error: {0}")]
    Domain(#[from] aegis_domain::DomainError),

    /// Exit decision with no sellable balance behind it
    #[error("no available balance to exit {market}")]
    NoAvailableBalance {
        /// Market code
        market: String,
    },

    /// Order notional below the venue minimum; the order could never fill
    #[error("order value {value} below minimum {minimum} for {market}")]
    BelowMinimumOrder {
        /// Market code
        market: String,
        /// Notional value of the refused order
        value: Decimal,
        /// Configured minimum order value
        minimum: Decimal,
    },
}

/// Result type for execution operations.
pub type ExecResult<T> = Result<T, ExecError>;
