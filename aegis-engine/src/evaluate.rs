//! Trigger Evaluator (Pure State Machine)
//!
//! Compares the current price against the risk envelope and the stored
//! trailing-stop state and decides what the cycle must do for the market:
//! hold, start trailing, raise the trailing stop, or exit.
//!
//! Key invariants:
//! - The active stop is monotonic: it never moves down once raised.
//! - The highest seen price is monotonic: it only rises.
//! - `Exited` is terminal; re-arming happens by clearing the state, not
//!   by transitioning out of it.
//! - When stop-loss and take-profit could both fire, stop-loss wins
//!   (capital preservation first).

use rust_decimal::Decimal;

use aegis_domain::{ExitReason, Price, TrailingState};

use crate::envelope::RiskEnvelope;

// =============================================================================
// Decision
// =============================================================================

/// What the cycle must do for a market after evaluating its state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Decision {
    /// No state change, no order
    Hold,

    /// Favorable excursion passed the activation offset: start trailing
    BeginTrailing {
        /// Initial highest seen price (the current price)
        highest_price: Price,
        /// Initial active stop level
        active_stop: Decimal,
    },

    /// New favorable extreme while trailing: move the stop up
    RaiseStop {
        /// New highest seen price
        highest_price: Price,
        /// New active stop level (never below the previous one)
        active_stop: Decimal,
    },

    /// A protective exit must fire
    Exit {
        /// Why the exit fired
        reason: ExitReason,
    },
}

/// Evaluate the trailing-stop state machine for one market.
///
/// Armed transitions, checked in priority order against price `p`:
/// 1. `p ≤ stop_loss` → exit (stop-loss)
/// 2. `p ≥ take_profit` → exit (take-profit)
/// 3. `p ≥ entry + trailing_offset` → begin trailing with
///    `active_stop = max(stop_loss, p − trailing_offset)`
///
/// Trailing transitions:
/// 1. `p ≤ active_stop` → exit (trailing stop)
/// 2. `p > highest_price` → raise the stop to
///    `max(active_stop, p − trailing_offset)`
///
/// `Exited` always holds; the store clears the record once the balance
/// is gone, and an absent record evaluates as a fresh `Armed`.
pub fn evaluate(state: &TrailingState, envelope: &RiskEnvelope, price: Price) -> Decision {
    let p = price.as_decimal();

    match state {
        TrailingState::Armed => {
            if p <= envelope.stop_loss {
                return Decision::Exit { reason: ExitReason::StopLoss };
            }
            if p >= envelope.take_profit {
                return Decision::Exit { reason: ExitReason::TakeProfit };
            }
            if p >= envelope.trailing_activation() {
                let active_stop = (p - envelope.trailing_offset).max(envelope.stop_loss);
                return Decision::BeginTrailing { highest_price: price, active_stop };
            }
            Decision::Hold
        },

        TrailingState::Trailing { highest_price, active_stop } => {
            if p <= *active_stop {
                return Decision::Exit { reason: ExitReason::TrailingStop };
            }
            if p > highest_price.as_decimal() {
                // Monotonic: never lower an already-raised stop
                let raised = (p - envelope.trailing_offset).max(*active_stop);
                return Decision::RaiseStop { highest_price: price, active_stop: raised };
            }
            Decision::Hold
        },

        // Terminal: no further exits until the state is cleared and re-armed
        TrailingState::Exited { .. } => Decision::Hold,
    }
}

// =============================================================================
// Tests
// =============================================================================
