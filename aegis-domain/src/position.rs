//! Position Snapshot and Trailing-Stop State
//!
//! `Holding` is the ephemeral per-cycle view of one held asset, rebuilt
//! from account balances on every monitoring pass. `TrailingState` is the
//! only entity with cross-cycle lifetime: it tracks the trailing-stop
//! lifecycle of a market between passes and is owned exclusively by the
//! state store.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::value_objects::{Market, Price};

// =============================================================================
// Holding
// =============================================================================

/// One held asset, rebuilt each cycle from account balances.
///
/// Not persisted beyond a cycle; the market code is the identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Holding {
    /// Market the asset trades in (e.g. KRW-BTC)
    pub market: Market,
    /// Total quantity held (available + locked)
    pub total: Decimal,
    /// Quantity locked in open orders
    pub locked: Decimal,
    /// Current market price
    pub current_price: Price,
}

impl Holding {
    /// Create a new holding snapshot.
    pub fn new(market: Market, total: Decimal, locked: Decimal, current_price: Price) -> Self {
        Self { market, total, locked, current_price }
    }

    /// Quantity available for a protective exit (excludes locked).
    pub fn available(&self) -> Decimal {
        self.total - self.locked
    }

    /// Current market value of the whole holding in quote currency.
    pub fn market_value(&self) -> Decimal {
        self.total * self.current_price.as_decimal()
    }
}

// =============================================================================
// Trailing-Stop State Machine
// =============================================================================

/// Per-market trailing-stop lifecycle state.
///
/// Lifecycle: `Armed` → `Trailing` → `Exited`. A market with no stored
/// state is treated as a fresh `Armed` record, so a position that is
/// manually reopened after an exit re-arms from scratch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TrailingState {
    /// No favorable excursion recorded yet; fixed stop/target levels apply.
    Armed,

    /// Price has moved past the activation offset; the stop follows price.
    Trailing {
        /// Highest price seen since trailing began (only ever rises)
        highest_price: Price,
        /// Active stop level (monotonic non-decreasing)
        active_stop: Decimal,
    },

    /// Terminal: a protective exit has been submitted for this position.
    Exited {
        /// Why the exit fired
        reason: ExitReason,
        /// When the transition happened
        at: DateTime<Utc>,
    },
}

impl TrailingState {
    /// Check whether this state is terminal.
    pub fn is_exited(&self) -> bool {
        matches!(self, TrailingState::Exited { .. })
    }

    /// Get the name of the state for display.
    pub fn name(&self) -> &str {
        match self {
            TrailingState::Armed => "armed",
            TrailingState::Trailing { .. } => "trailing",
            TrailingState::Exited { .. } => "exited",
        }
    }
}

/// Why a protective exit fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitReason {
    /// Price fell to or below the fixed stop-loss level
    StopLoss,
    /// Price rose to or above the take-profit level
    TakeProfit,
    /// Price fell to or below the trailing stop level
    TrailingStop,
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitReason::StopLoss => write!(f, "STOP-LOSS"),
            ExitReason::TakeProfit => write!(f, "TAKE-PROFIT"),
            ExitReason::TrailingStop => write!(f, "TRAILING-STOP"),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn krw_btc() -> Market {
        Market::from_code("KRW-BTC").unwrap()
    }

    #[test]
    fn test_holding_available_excludes_locked() {
        let holding = Holding::new(
            krw_btc(),
            dec!(0.5),
            dec!(0.2),
            Price::new(dec!(45000000)).unwrap(),
        );
        assert_eq!(holding.available(), dec!(0.3));
    }

    #[test]
    fn test_holding_market_value_uses_total() {
        let holding = Holding::new(
            krw_btc(),
            dec!(0.5),
            dec!(0.2),
            Price::new(dec!(45000000)).unwrap(),
        );
        assert_eq!(holding.market_value(), dec!(22500000));
    }

    #[test]
    fn test_trailing_state_names() {
        assert_eq!(TrailingState::Armed.name(), "armed");
        let trailing = TrailingState::Trailing {
            highest_price: Price::new(dec!(47000000)).unwrap(),
            active_stop: dec!(45500000),
        };
        assert_eq!(trailing.name(), "trailing");
        let exited = TrailingState::Exited { reason: ExitReason::StopLoss, at: Utc::now() };
        assert_eq!(exited.name(), "exited");
        assert!(exited.is_exited());
        assert!(!trailing.is_exited());
    }

    #[test]
    fn test_exit_reason_display() {
        assert_eq!(ExitReason::StopLoss.to_string(), "STOP-LOSS");
        assert_eq!(ExitReason::TakeProfit.to_string(), "TAKE-PROFIT");
        assert_eq!(ExitReason::TrailingStop.to_string(), "TRAILING-STOP");
    }
}
