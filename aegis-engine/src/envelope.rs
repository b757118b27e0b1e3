//! Risk Envelope Calculation
//!
//! Converts a volatility measure and an estimated entry price into the
//! stop-loss / take-profit / trailing-activation levels for one position.
//! Deterministic, no I/O.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;

// =============================================================================
// Envelope Parameters
// =============================================================================

/// Volatility multipliers for envelope construction.
///
/// # Invariants
/// - All multipliers must be > 0, which guarantees
///   `stop_loss < entry < take_profit` for any positive volatility.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EnvelopeParams {
    /// Stop-loss distance in volatility units below entry
    pub stop_loss_mult: Decimal,
    /// Take-profit distance in volatility units above entry
    pub take_profit_mult: Decimal,
    /// Favorable excursion (in volatility units) that activates trailing
    pub trailing_mult: Decimal,
}

impl Default for EnvelopeParams {
    fn default() -> Self {
        Self {
            stop_loss_mult: Decimal::TWO,
            take_profit_mult: Decimal::from(3),
            trailing_mult: Decimal::new(15, 1), // 1.5
        }
    }
}

// =============================================================================
// Risk Envelope
// =============================================================================

/// Derived risk levels for one position in one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskEnvelope {
    /// Estimated entry price the levels are anchored to
    pub entry_estimate: Decimal,
    /// Exit level below entry (floored at zero)
    pub stop_loss: Decimal,
    /// Exit level above entry
    pub take_profit: Decimal,
    /// Distance above entry that activates trailing, and the trailing span
    pub trailing_offset: Decimal,
}

impl RiskEnvelope {
    /// Price at which the position transitions from Armed to Trailing.
    pub fn trailing_activation(&self) -> Decimal {
        self.entry_estimate + self.trailing_offset
    }
}

/// Build the risk envelope for one position.
///
/// ```text
/// stop_loss       = max(entry - stop_loss_mult × volatility, 0)
/// take_profit     = entry + take_profit_mult × volatility
/// trailing_offset = trailing_mult × volatility
/// ```
///
/// # Errors
///
/// Returns `EngineError::InvalidVolatility` when `volatility <= 0` — a
/// flat or corrupt history window cannot produce a usable envelope and
/// the market must be skipped for the cycle.
///
/// # Examples
///
/// ```
/// # use aegis_engine::envelope::{build_envelope, EnvelopeParams};
/// # use rust_decimal_macros::dec;
/// let envelope =
///     build_envelope(dec!(45000000), dec!(1000000), &EnvelopeParams::default()).unwrap();
/// assert_eq!(envelope.stop_loss, dec!(43000000));
/// assert_eq!(envelope.take_profit, dec!(48000000));
/// assert_eq!(envelope.trailing_offset, dec!(1500000));
/// ```
pub fn build_envelope(
    entry_estimate: Decimal,
    volatility: Decimal,
    params: &EnvelopeParams,
) -> Result<RiskEnvelope, EngineError> {
    if volatility <= Decimal::ZERO {
        return Err(EngineError::InvalidVolatility(volatility));
    }

    let stop_loss = (entry_estimate - params.stop_loss_mult * volatility).max(Decimal::ZERO);
    let take_profit = entry_estimate + params.take_profit_mult * volatility;
    let trailing_offset = params.trailing_mult * volatility;

    Ok(RiskEnvelope { entry_estimate, stop_loss, take_profit, trailing_offset })
}

// =============================================================================
// Tests
// =============================================================================
