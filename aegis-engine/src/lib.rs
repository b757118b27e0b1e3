//! Aegis Engine Layer
//!
//! Pure decision logic, deterministic, no I/O.
//! Computes the volatility measure, derives the per-position risk
//! envelope, and evaluates the trailing-stop state machine against the
//! current price. The orchestrator feeds it freshly fetched data and
//! applies whatever it decides.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod envelope;
pub mod error;
pub mod evaluate;
pub mod volatility;

pub use envelope::{build_envelope, EnvelopeParams, RiskEnvelope};
pub use error::EngineError;
pub use evaluate::{evaluate, Decision};
pub use volatility::{average_true_range, estimate_entry_price, true_range};
