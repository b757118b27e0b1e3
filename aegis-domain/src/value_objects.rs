//! Value Objects for the Aegis Domain
//!
//! Immutable, validated domain primitives.
//! All value objects enforce invariants at construction time.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Domain errors for value object validation
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DomainError {
    /// Price must be positive
    #[error("Invalid price: {0}")]
    InvalidPrice(String),

    /// Quantity must be positive
    #[error("Invalid quantity: {0}")]
    InvalidQuantity(String),

    /// Market must be a valid quote-base code
    #[error("Invalid market: {0}")]
    InvalidMarket(String),
}

// =============================================================================
// Price
// =============================================================================

/// Price represents a positive decimal price in the quote currency
///
/// # Invariants
/// - Must be > 0
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Price(Decimal);

impl Price {
    /// Create a new Price with validation
    ///
    /// # Errors
    /// Returns `DomainError::InvalidPrice` if value <= 0
    pub fn new(value: Decimal) -> Result<Self, DomainError> {
        if value <= Decimal::ZERO {
            return Err(DomainError::InvalidPrice("Price must be positive".to_string()));
        }
        Ok(Self(value))
    }

    /// Get the underlying Decimal value
    pub fn as_decimal(&self) -> Decimal {
        self.0
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// Quantity
// =============================================================================

/// Quantity represents a positive decimal quantity of the base asset
///
/// # Invariants
/// - Must be > 0
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Quantity(Decimal);

impl Quantity {
    /// Create a new Quantity with validation
    ///
    /// # Errors
    /// Returns `DomainError::InvalidQuantity` if value <= 0
    pub fn new(value: Decimal) -> Result<Self, DomainError> {
        if value <= Decimal::ZERO {
            return Err(DomainError::InvalidQuantity("Quantity must be positive".to_string()));
        }
        Ok(Self(value))
    }

    /// Get the underlying Decimal value
    pub fn as_decimal(&self) -> Decimal {
        self.0
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// Market
// =============================================================================

/// Market represents a quote-base trading market (e.g. KRW-BTC)
///
/// The code format follows the venue convention `QUOTE-BASE`.
///
/// # Invariants
/// - Quote and base must be non-empty
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Market {
    quote: String,
    base: String,
}

impl Market {
    /// Create a Market from a market code string
    ///
    /// # Examples
    /// ```
    /// # use aegis_domain::value_objects::Market;
    /// let market = Market::from_code("KRW-BTC").unwrap();
    /// assert_eq!(market.quote(), "KRW");
    /// assert_eq!(market.base(), "BTC");
    /// ```
    ///
    /// # Errors
    /// Returns `DomainError::InvalidMarket` if the code is not `QUOTE-BASE`
    pub fn from_code(code: &str) -> Result<Self, DomainError> {
        match code.split_once('-') {
            Some((quote, base)) if !quote.is_empty() && !base.is_empty() => Ok(Self {
                quote: quote.to_string(),
                base: base.to_string(),
            }),
            _ => Err(DomainError::InvalidMarket(format!("Cannot parse market code: {}", code))),
        }
    }

    /// Create a Market from explicit quote and base currencies
    pub fn new(quote: &str, base: &str) -> Result<Self, DomainError> {
        if quote.is_empty() || base.is_empty() {
            return Err(DomainError::InvalidMarket(
                "Quote and base must be non-empty".to_string(),
            ));
        }
        Ok(Self { quote: quote.to_string(), base: base.to_string() })
    }

    /// Get the quote currency (e.g. "KRW")
    pub fn quote(&self) -> &str {
        &self.quote
    }

    /// Get the base currency (e.g. "BTC")
    pub fn base(&self) -> &str {
        &self.base
    }

    /// Get the market code (e.g. "KRW-BTC")
    pub fn code(&self) -> String {
        format!("{}-{}", self.quote, self.base)
    }
}

impl fmt::Display for Market {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

// =============================================================================
// Tests
// =============================================================================
