//! Storage layer errors

use thiserror::Error;

/// Errors that can occur in the storage layer
#[derive(Debug, Error)]
pub enum StoreError {
    /// Lock was poisoned by a panicking writer
    #[error("State store lock poisoned: {0}")]
    LockPoisoned(String),
}
