//! In-memory store implementation
//!
//! The default backing for trailing-stop state. Thread-safe using
//! RwLock for concurrent per-symbol workers within a cycle.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::Utc;

use aegis_domain::{Market, TrailingState};

use crate::error::StoreError;
use crate::repository::{TrailingStateRecord, TrailingStateRepository};

/// In-memory keyed trailing-state store.
pub struct MemoryStateStore {
    states: RwLock<HashMap<Market, TrailingStateRecord>>,
}

impl MemoryStateStore {
    /// Create a new empty store
    pub fn new() -> Self {
        Self { states: RwLock::new(HashMap::new()) }
    }

    /// Get the number of stored states
    pub fn state_count(&self) -> usize {
        self.states.read().unwrap().len()
    }

    /// Clear all state (useful for test setup)
    pub fn clear(&self) {
        self.states.write().unwrap().clear();
    }
}

impl Default for MemoryStateStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TrailingStateRepository for MemoryStateStore {
    async fn get(&self, market: &Market) -> Result<Option<TrailingStateRecord>, StoreError> {
        let states =
            self.states.read().map_err(|e| StoreError::LockPoisoned(e.to_string()))?;
        Ok(states.get(market).cloned())
    }

    async fn put(&self, market: &Market, state: TrailingState) -> Result<(), StoreError> {
        let mut states =
            self.states.write().map_err(|e| StoreError::LockPoisoned(e.to_string()))?;
        states.insert(
            market.clone(),
            TrailingStateRecord { state, updated_at: Utc::now() },
        );
        Ok(())
    }

    async fn remove(&self, market: &Market) -> Result<(), StoreError> {
        let mut states =
            self.states.write().map_err(|e| StoreError::LockPoisoned(e.to_string()))?;
        states.remove(market);
        Ok(())
    }

    async fn all(&self) -> Result<Vec<(Market, TrailingStateRecord)>, StoreError> {
        let states =
            self.states.read().map_err(|e| StoreError::LockPoisoned(e.to_string()))?;
        Ok(states.iter().map(|(m, r)| (m.clone(), r.clone())).collect())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use aegis_domain::{ExitReason, Price};
    use rust_decimal_macros::dec;

    fn krw_btc() -> Market {
        Market::from_code("KRW-BTC").unwrap()
    }

    #[tokio::test]
    async fn test_absent_market_returns_none() {
        let store = MemoryStateStore::new();
        assert!(store.get(&krw_btc()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_put_and_get() {
        let store = MemoryStateStore::new();
        store.put(&krw_btc(), TrailingState::Armed).await.unwrap();

        let record = store.get(&krw_btc()).await.unwrap().unwrap();
        assert_eq!(record.state, TrailingState::Armed);
        assert_eq!(store.state_count(), 1);
    }

    #[tokio::test]
    async fn test_put_overwrites() {
        let store = MemoryStateStore::new();
        let market = krw_btc();

        store.put(&market, TrailingState::Armed).await.unwrap();
        store
            .put(
                &market,
                TrailingState::Trailing {
                    highest_price: Price::new(dec!(47000000)).unwrap(),
                    active_stop: dec!(45500000),
                },
            )
            .await
            .unwrap();

        let record = store.get(&market).await.unwrap().unwrap();
        assert!(matches!(record.state, TrailingState::Trailing { .. }));
        assert_eq!(store.state_count(), 1);
    }

    #[tokio::test]
    async fn test_remove_enables_rearm() {
        let store = MemoryStateStore::new();
        let market = krw_btc();

        store
            .put(
                &market,
                TrailingState::Exited { reason: ExitReason::StopLoss, at: Utc::now() },
            )
            .await
            .unwrap();
        store.remove(&market).await.unwrap();

        // Absent again: the next cycle treats the market as fresh Armed
        assert!(store.get(&market).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_remove_absent_is_noop() {
        let store = MemoryStateStore::new();
        assert!(store.remove(&krw_btc()).await.is_ok());
    }

    #[tokio::test]
    async fn test_all_snapshots_every_market() {
        let store = MemoryStateStore::new();
        store.put(&krw_btc(), TrailingState::Armed).await.unwrap();
        store
            .put(&Market::from_code("KRW-ETH").unwrap(), TrailingState::Armed)
            .await
            .unwrap();

        let all = store.all().await.unwrap();
        assert_eq!(all.len(), 2);
    }
}
