//! Volatility Estimation (Pure Functions)
//!
//! Average True Range over a bounded candle window, plus the entry-price
//! estimate used to anchor the risk envelope. All functions are
//! deterministic and have no side effects; the caller fetches the history.

use rust_decimal::Decimal;

use aegis_domain::Candle;

use crate::error::EngineError;

/// True Range of one period given the previous close.
///
/// `max(high - low, |high - prev_close|, |low - prev_close|)` — the gap
/// terms matter when a period opens far from the previous close.
pub fn true_range(candle: &Candle, prev_close: Decimal) -> Decimal {
    let range = candle.high - candle.low;
    let gap_high = (candle.high - prev_close).abs();
    let gap_low = (candle.low - prev_close).abs();

    range.max(gap_high).max(gap_low)
}

/// Average True Range over the `window` most recent periods.
///
/// Candles must be ordered oldest → newest. The computation needs
/// `window + 1` periods because each True Range references the previous
/// close.
///
/// # Errors
///
/// Returns `EngineError::InsufficientHistory` when fewer than
/// `window + 1` candles are supplied. The caller skips the market for
/// this cycle rather than aborting the pass.
///
/// # Examples
///
/// ```
/// # use aegis_domain::Candle;
/// # use aegis_engine::volatility::average_true_range;
/// # use chrono::Utc;
/// # use rust_decimal_macros::dec;
/// let candles: Vec<Candle> = (0..15)
///     .map(|_| Candle::new(dec!(46000000), dec!(44000000), dec!(45000000), Utc::now()))
///     .collect();
///
/// // Every period spans exactly 2,000,000 with no gaps
/// let atr = average_true_range(&candles, 14).unwrap();
/// assert_eq!(atr, dec!(2000000));
/// ```
pub fn average_true_range(candles: &[Candle], window: usize) -> Result<Decimal, EngineError> {
    let required = window + 1;
    if candles.len() < required {
        return Err(EngineError::InsufficientHistory { required, got: candles.len() });
    }

    // Use exactly the last `window + 1` periods
    let recent = &candles[candles.len() - required..];

    let mut sum = Decimal::ZERO;
    for pair in recent.windows(2) {
        sum += true_range(&pair[1], pair[0].close);
    }

    Ok(sum / Decimal::from(window as u64))
}

/// Estimate the entry price as the midpoint of the recent price range.
///
/// Uses `min(low)` / `max(high)` over the last `lookback` candles.
/// This is a documented approximation: actual fill prices are not
/// tracked by any upstream component, so the recent range midpoint
/// stands in for the entry. Its accuracy directly affects stop/target
/// placement.
pub fn estimate_entry_price(candles: &[Candle], lookback: usize) -> Option<Decimal> {
    if candles.is_empty() || lookback == 0 {
        return None;
    }

    let start = candles.len().saturating_sub(lookback);
    let recent = &candles[start..];

    let low = recent.iter().map(|c| c.low).min()?;
    let high = recent.iter().map(|c| c.high).max()?;

    Some((low + high) / Decimal::TWO)
}

// =============================================================================
// Tests
// =============================================================================
