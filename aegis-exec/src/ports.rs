//! Execution layer port definitions.
//!
//! Ports define the interfaces for external services (market data,
//! account balances, order execution, ledger, alerting). Adapters
//! implement these ports for specific venues; the stubs in this crate
//! implement them for tests and development.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use aegis_domain::{Balance, Candle, Market, Price, Quantity};

// =============================================================================
// Provider Errors
// =============================================================================

/// Errors from the read-only data providers (market data, account).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    /// Provider could not be reached or returned a malformed response
    #[error("data provider unavailable: {0}")]
    Unavailable(String),
}

/// Errors from order submission.
///
/// The three variants carry distinct retry semantics and every call
/// site must handle them separately:
/// - `Unreachable`: the request never reached the venue (or failed before
///   acknowledgment) — nothing was submitted, retrying is safe.
/// - `Rejected`: the venue refused the order — retrying the same order
///   will fail again.
/// - `Ambiguous`: the order was acknowledged but the fill result timed
///   out — a blind retry risks selling twice.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderError {
    /// Submission failed before acknowledgment; safe to retry
    #[error("order service unreachable: {0}")]
    Unreachable(String),

    /// Venue rejected the order; retrying is pointless
    #[error("order rejected: {0}")]
    Rejected(String),

    /// Submission acknowledged but the result is indeterminate
    #[error("order result ambiguous: {0}")]
    Ambiguous(String),
}

/// Errors from the external ledger.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    /// Ledger write failed; safe to retry later with the same data
    #[error("ledger sync failed: {0}")]
    Sync(String),
}

// =============================================================================
// Market Data Port
// =============================================================================

/// Port for price and history retrieval.
#[async_trait]
pub trait MarketDataPort: Send + Sync {
    /// Fetch the most recent `periods` of OHLC history for a market,
    /// ordered oldest → newest. May return fewer periods than requested;
    /// the caller validates the count.
    async fn fetch_history(
        &self,
        market: &Market,
        periods: usize,
    ) -> Result<Vec<Candle>, ProviderError>;

    /// Fetch the current price for a market.
    async fn fetch_current_price(&self, market: &Market) -> Result<Price, ProviderError>;
}

// =============================================================================
// Account Port
// =============================================================================

/// Port for account balance retrieval.
#[async_trait]
pub trait AccountPort: Send + Sync {
    /// List all currency balances, including the quote currency.
    async fn list_balances(&self) -> Result<Vec<Balance>, ProviderError>;
}

// =============================================================================
// Order Execution Port
// =============================================================================

/// Port for placing protective market exits.
#[async_trait]
pub trait OrderExecutionPort: Send + Sync {
    /// Submit a market sell for `quantity` of the market's base asset.
    ///
    /// `client_order_id` is the idempotency key; a venue that supports
    /// deduplication drops replays carrying the same id.
    async fn submit_market_exit(
        &self,
        market: &Market,
        quantity: Quantity,
        client_order_id: &str,
    ) -> Result<ExitFill, OrderError>;
}

/// Result of a confirmed market exit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExitFill {
    /// Venue-assigned order ID
    pub order_id: String,
    /// Actual fill price
    pub fill_price: Price,
    /// Actual filled quantity
    pub fill_quantity: Decimal,
    /// When the order was filled
    pub filled_at: DateTime<Utc>,
}

// =============================================================================
// Ledger Port
// =============================================================================

/// Port for the external durable portfolio record.
///
/// Both operations must be safely callable multiple times with the same
/// data: the monitor re-syncs after every cycle and on the coarser
/// reconciliation period.
#[async_trait]
pub trait LedgerPort: Send + Sync {
    /// Insert or update one position row (idempotent upsert).
    async fn upsert_position(
        &self,
        market: &Market,
        quantity: Decimal,
        value: Decimal,
    ) -> Result<(), LedgerError>;

    /// Record one execution (idempotent on the record id).
    async fn record_execution(
        &self,
        record: &crate::executor::ExecutionRecord,
    ) -> Result<(), LedgerError>;
}

// =============================================================================
// Alert Sink
// =============================================================================

/// Alert severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    /// Informational (summaries, confirmations)
    Info,
    /// Needs attention but the engine handled it
    Warning,
    /// Requires reconciliation or human intervention
    Critical,
}

/// Port for outbound notifications.
///
/// Fire-and-forget: implementations swallow their own delivery failures.
/// A broken alert channel must never fail a monitoring cycle.
#[async_trait]
pub trait AlertSink: Send + Sync {
    /// Deliver one notification with structured context fields.
    async fn notify(&self, severity: Severity, message: &str, fields: serde_json::Value);
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_exit_fill_serialization() {
        let fill = ExitFill {
            order_id: "ORD-12345".to_string(),
            fill_price: Price::new(dec!(45000000)).unwrap(),
            fill_quantity: dec!(0.1),
            filled_at: Utc::now(),
        };

        let json = serde_json::to_string(&fill).unwrap();
        let parsed: ExitFill = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed.order_id, "ORD-12345");
        assert_eq!(parsed.fill_price.as_decimal(), dec!(45000000));
    }

    #[test]
    fn test_order_error_display() {
        let err = OrderError::Ambiguous("fill confirmation timed out".to_string());
        assert_eq!(err.to_string(), "order result ambiguous: fill confirmation timed out");
    }
}
