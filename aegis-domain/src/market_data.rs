//! Market Data Types
//!
//! Canonical market data types used across the workspace.
//! Venue-agnostic; usable for both live and simulated data.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// =============================================================================
// Candle
// =============================================================================

/// One period of OHLC price history.
///
/// Only the fields consumed by the True-Range computation are carried.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    /// High price of the period
    pub high: Decimal,
    /// Low price of the period
    pub low: Decimal,
    /// Close price of the period
    pub close: Decimal,
    /// Period close time
    pub closed_at: DateTime<Utc>,
}

impl Candle {
    /// Create a new candle.
    pub fn new(high: Decimal, low: Decimal, close: Decimal, closed_at: DateTime<Utc>) -> Self {
        Self { high, low, close, closed_at }
    }
}

// =============================================================================
// Balance
// =============================================================================

/// One currency balance as reported by the account provider.
///
/// `locked` is the portion reserved by open orders; only
/// `total - locked` is sellable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Balance {
    /// Currency code (e.g. "BTC", "KRW")
    pub currency: String,
    /// Total quantity held
    pub total: Decimal,
    /// Quantity locked in open orders
    pub locked: Decimal,
}

impl Balance {
    /// Quantity available for new orders.
    pub fn available(&self) -> Decimal {
        self.total - self.locked
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_balance_available() {
        let balance = Balance {
            currency: "BTC".to_string(),
            total: dec!(1.5),
            locked: dec!(0.5),
        };
        assert_eq!(balance.available(), dec!(1.0));
    }

    #[test]
    fn test_balance_fully_locked() {
        let balance = Balance {
            currency: "ETH".to_string(),
            total: dec!(2.0),
            locked: dec!(2.0),
        };
        assert_eq!(balance.available(), dec!(0));
    }
}
