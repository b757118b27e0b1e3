//! Repository trait definition (Port)
//!
//! Defines the storage interface for trailing-stop state.
//! The in-memory implementation is the default; the trait keeps the
//! monitor testable against alternative backings.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use aegis_domain::{Market, TrailingState};

use crate::error::StoreError;

/// Trailing state plus bookkeeping, as stored per market.
#[derive(Debug, Clone, PartialEq)]
pub struct TrailingStateRecord {
    /// The lifecycle state
    pub state: TrailingState,
    /// When the record was last written
    pub updated_at: DateTime<Utc>,
}

/// Repository for per-market trailing-stop state.
///
/// The market code is the only index. Absence of a key means the market
/// has never been observed (or was cleaned up after its position closed)
/// and evaluates as a fresh `Armed` record — absence is not an error.
#[async_trait]
pub trait TrailingStateRepository: Send + Sync {
    /// Look up the state for a market.
    async fn get(&self, market: &Market) -> Result<Option<TrailingStateRecord>, StoreError>;

    /// Insert or replace the state for a market.
    async fn put(&self, market: &Market, state: TrailingState) -> Result<(), StoreError>;

    /// Remove the state for a market (position gone; enables re-arm).
    async fn remove(&self, market: &Market) -> Result<(), StoreError>;

    /// Snapshot of every stored (market, state) pair.
    async fn all(&self) -> Result<Vec<(Market, TrailingStateRecord)>, StoreError>;
}
