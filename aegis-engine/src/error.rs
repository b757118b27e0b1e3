//! Engine error types.

use rust_decimal::Decimal;
use thiserror::Error;

/// Errors from the pure decision layer.
///
/// Both variants are per-symbol conditions: the caller skips the market
/// for the current cycle and raises an alert instead of aborting the pass.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// Too few history periods to compute the volatility window
    #[error("insufficient history: required {required} periods, got {got}")]
    InsufficientHistory {
        /// Periods needed (window + 1)
        required: usize,
        /// Periods actually supplied
        got: usize,
    },

    /// Volatility must be strictly positive to derive a usable envelope
    #[error("invalid volatility: {0}")]
    InvalidVolatility(Decimal),
}
