//! Aegis Domain Layer
//!
//! Pure domain types with zero I/O dependencies.
//! Contains validated value objects, market data types, and the
//! trailing-stop state model shared across the workspace.

#![warn(missing_docs)]
#![warn(clippy::all)]

// Public modules
pub mod market_data;
pub mod position;
pub mod value_objects;

// Re-export commonly used types
pub use market_data::{Balance, Candle};
pub use position::{ExitReason, Holding, TrailingState};
pub use value_objects::{DomainError, Market, Price, Quantity};
