//! Stub implementations for testing.
//!
//! These implementations simulate the external collaborators without
//! making real API calls. Failure behavior is scriptable so tests can
//! exercise the retry and reconciliation paths.

use std::collections::{HashMap, VecDeque};
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;

use aegis_domain::{Balance, Candle, Market, Price, Quantity};

use crate::executor::ExecutionRecord;
use crate::ports::{
    AccountPort, AlertSink, ExitFill, LedgerError, LedgerPort, MarketDataPort, OrderError,
    OrderExecutionPort, ProviderError, Severity,
};

// =============================================================================
// Stub Market Data
// =============================================================================

/// Stub market data provider with injectable prices and history.
pub struct StubMarketData {
    prices: RwLock<HashMap<String, Decimal>>,
    history: RwLock<HashMap<String, Vec<Candle>>>,
    fail_next: RwLock<bool>,
}

impl StubMarketData {
    /// Create an empty provider.
    pub fn new() -> Self {
        Self {
            prices: RwLock::new(HashMap::new()),
            history: RwLock::new(HashMap::new()),
            fail_next: RwLock::new(false),
        }
    }

    /// Set the current price for a market.
    pub fn set_price(&self, market: &Market, price: Decimal) {
        self.prices.write().unwrap().insert(market.code(), price);
    }

    /// Set the candle history for a market (oldest → newest).
    pub fn set_history(&self, market: &Market, candles: Vec<Candle>) {
        self.history.write().unwrap().insert(market.code(), candles);
    }

    /// Install a flat history window: `periods` identical candles whose
    /// span yields the given true range around `close`.
    pub fn set_flat_history(&self, market: &Market, close: Decimal, span: Decimal, periods: usize) {
        let half = span / Decimal::TWO;
        let candles = (0..periods)
            .map(|_| Candle::new(close + half, close - half, close, Utc::now()))
            .collect();
        self.set_history(market, candles);
    }

    /// Fail the next fetch (price or history).
    pub fn set_fail_next(&self, fail: bool) {
        *self.fail_next.write().unwrap() = fail;
    }

    fn should_fail(&self) -> bool {
        let mut fail = self.fail_next.write().unwrap();
        std::mem::take(&mut *fail)
    }
}

impl Default for StubMarketData {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MarketDataPort for StubMarketData {
    async fn fetch_history(
        &self,
        market: &Market,
        periods: usize,
    ) -> Result<Vec<Candle>, ProviderError> {
        if self.should_fail() {
            return Err(ProviderError::Unavailable("simulated history failure".to_string()));
        }

        let history = self.history.read().unwrap();
        let candles = history.get(&market.code()).cloned().unwrap_or_default();
        let start = candles.len().saturating_sub(periods);
        Ok(candles[start..].to_vec())
    }

    async fn fetch_current_price(&self, market: &Market) -> Result<Price, ProviderError> {
        if self.should_fail() {
            return Err(ProviderError::Unavailable("simulated price failure".to_string()));
        }

        let prices = self.prices.read().unwrap();
        let value = prices
            .get(&market.code())
            .copied()
            .ok_or_else(|| ProviderError::Unavailable(format!("no price for {}", market)))?;

        Price::new(value).map_err(|e| ProviderError::Unavailable(e.to_string()))
    }
}

// =============================================================================
// Stub Account
// =============================================================================

/// Stub account provider with settable balances.
pub struct StubAccount {
    balances: RwLock<HashMap<String, Balance>>,
    fail_next: RwLock<bool>,
}

impl StubAccount {
    /// Create an empty account.
    pub fn new() -> Self {
        Self { balances: RwLock::new(HashMap::new()), fail_next: RwLock::new(false) }
    }

    /// Set a currency balance.
    pub fn set_balance(&self, currency: &str, total: Decimal, locked: Decimal) {
        self.balances.write().unwrap().insert(
            currency.to_string(),
            Balance { currency: currency.to_string(), total, locked },
        );
    }

    /// Remove a currency balance (position fully sold).
    pub fn remove_balance(&self, currency: &str) {
        self.balances.write().unwrap().remove(currency);
    }

    /// Fail the next listing.
    pub fn set_fail_next(&self, fail: bool) {
        *self.fail_next.write().unwrap() = fail;
    }
}

impl Default for StubAccount {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AccountPort for StubAccount {
    async fn list_balances(&self) -> Result<Vec<Balance>, ProviderError> {
        let mut fail = self.fail_next.write().unwrap();
        if std::mem::take(&mut *fail) {
            return Err(ProviderError::Unavailable("simulated balance failure".to_string()));
        }
        drop(fail);

        let mut balances: Vec<Balance> =
            self.balances.read().unwrap().values().cloned().collect();
        balances.sort_by(|a, b| a.currency.cmp(&b.currency));
        Ok(balances)
    }
}

// =============================================================================
// Stub Order Service
// =============================================================================

/// Behavior of one scripted submission attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderBehavior {
    /// Fill at the configured price
    Fill,
    /// Fail before acknowledgment (retryable)
    Unreachable,
    /// Venue rejects the order (terminal)
    Rejected,
    /// Acknowledge but never confirm (ambiguous)
    Ambiguous,
}

/// Stub order execution service with a scriptable behavior queue.
///
/// Unscripted submissions fill at the configured price.
pub struct StubOrderService {
    fill_price: RwLock<Decimal>,
    script: RwLock<VecDeque<OrderBehavior>>,
    submissions: RwLock<Vec<String>>,
    order_counter: RwLock<u64>,
}

impl StubOrderService {
    /// Create a stub filling at `fill_price`.
    pub fn new(fill_price: Decimal) -> Self {
        Self {
            fill_price: RwLock::new(fill_price),
            script: RwLock::new(VecDeque::new()),
            submissions: RwLock::new(Vec::new()),
            order_counter: RwLock::new(0),
        }
    }

    /// Script the behavior of upcoming submissions, in order.
    pub fn script(&self, behaviors: Vec<OrderBehavior>) {
        *self.script.write().unwrap() = behaviors.into();
    }

    /// Update the fill price.
    pub fn set_fill_price(&self, price: Decimal) {
        *self.fill_price.write().unwrap() = price;
    }

    /// Number of submissions attempted against this stub.
    pub fn submission_count(&self) -> usize {
        self.submissions.read().unwrap().len()
    }

    /// Client order ids of every submission, in order.
    pub fn client_order_ids(&self) -> Vec<String> {
        self.submissions.read().unwrap().clone()
    }

    fn next_order_id(&self) -> String {
        let mut counter = self.order_counter.write().unwrap();
        *counter += 1;
        format!("STUB-{}", *counter)
    }
}

#[async_trait]
impl OrderExecutionPort for StubOrderService {
    async fn submit_market_exit(
        &self,
        _market: &Market,
        quantity: Quantity,
        client_order_id: &str,
    ) -> Result<ExitFill, OrderError> {
        self.submissions.write().unwrap().push(client_order_id.to_string());

        let behavior =
            self.script.write().unwrap().pop_front().unwrap_or(OrderBehavior::Fill);

        match behavior {
            OrderBehavior::Fill => {
                let price = *self.fill_price.read().unwrap();
                Ok(ExitFill {
                    order_id: self.next_order_id(),
                    fill_price: Price::new(price)
                        .map_err(|e| OrderError::Rejected(e.to_string()))?,
                    fill_quantity: quantity.as_decimal(),
                    filled_at: Utc::now(),
                })
            },
            OrderBehavior::Unreachable => {
                Err(OrderError::Unreachable("simulated connection failure".to_string()))
            },
            OrderBehavior::Rejected => {
                Err(OrderError::Rejected("simulated venue rejection".to_string()))
            },
            OrderBehavior::Ambiguous => {
                Err(OrderError::Ambiguous("simulated confirmation timeout".to_string()))
            },
        }
    }
}

// =============================================================================
// Memory Ledger
// =============================================================================

/// In-memory ledger recording upserts and executions.
pub struct MemoryLedger {
    positions: RwLock<HashMap<String, (Decimal, Decimal)>>,
    executions: RwLock<Vec<ExecutionRecord>>,
    upsert_count: RwLock<u64>,
    fail_next: RwLock<u32>,
}

impl MemoryLedger {
    /// Create an empty ledger.
    pub fn new() -> Self {
        Self {
            positions: RwLock::new(HashMap::new()),
            executions: RwLock::new(Vec::new()),
            upsert_count: RwLock::new(0),
            fail_next: RwLock::new(0),
        }
    }

    /// Fail the next `count` ledger writes.
    pub fn fail_next_writes(&self, count: u32) {
        *self.fail_next.write().unwrap() = count;
    }

    /// Get the recorded (quantity, value) for a market.
    pub fn position(&self, market: &Market) -> Option<(Decimal, Decimal)> {
        self.positions.read().unwrap().get(&market.code()).copied()
    }

    /// All recorded executions.
    pub fn executions(&self) -> Vec<ExecutionRecord> {
        self.executions.read().unwrap().clone()
    }

    /// Total number of upsert calls (for idempotency assertions).
    pub fn upsert_count(&self) -> u64 {
        *self.upsert_count.read().unwrap()
    }

    fn check_failure(&self) -> Result<(), LedgerError> {
        let mut remaining = self.fail_next.write().unwrap();
        if *remaining > 0 {
            *remaining -= 1;
            return Err(LedgerError::Sync("simulated ledger failure".to_string()));
        }
        Ok(())
    }
}

impl Default for MemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LedgerPort for MemoryLedger {
    async fn upsert_position(
        &self,
        market: &Market,
        quantity: Decimal,
        value: Decimal,
    ) -> Result<(), LedgerError> {
        self.check_failure()?;
        *self.upsert_count.write().unwrap() += 1;
        self.positions.write().unwrap().insert(market.code(), (quantity, value));
        Ok(())
    }

    async fn record_execution(&self, record: &ExecutionRecord) -> Result<(), LedgerError> {
        self.check_failure()?;
        let mut executions = self.executions.write().unwrap();
        // Idempotent on the record id
        if !executions.iter().any(|r| r.id == record.id) {
            executions.push(record.clone());
        }
        Ok(())
    }
}

// =============================================================================
// Recording Alert Sink
// =============================================================================

/// Alert sink that records every notification for assertions.
pub struct RecordingAlertSink {
    alerts: RwLock<Vec<(Severity, String)>>,
}

impl RecordingAlertSink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self { alerts: RwLock::new(Vec::new()) }
    }

    /// All recorded alerts, in order.
    pub fn alerts(&self) -> Vec<(Severity, String)> {
        self.alerts.read().unwrap().clone()
    }

    /// Count alerts of a given severity.
    pub fn count(&self, severity: Severity) -> usize {
        self.alerts.read().unwrap().iter().filter(|(s, _)| *s == severity).count()
    }
}

impl Default for RecordingAlertSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AlertSink for RecordingAlertSink {
    async fn notify(&self, severity: Severity, message: &str, _fields: serde_json::Value) {
        self.alerts.write().unwrap().push((severity, message.to_string()));
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

    #[tokio::test]
    async fn test_stub_market_data_history_truncates_to_requested() {
        let data = StubMarketData::new();
        data.set_flat_history(&krw_btc(), dec!(45000000), dec!(2000000), 20);

        let candles = data.fetch_history(&krw_btc(), 15).await.unwrap();
        assert_eq!(candles.len(), 15);
    }

    #[tokio::test]
    async fn test_stub_market_data_short_history_returned_as_is() {
        let data = StubMarketData::new();
        data.set_flat_history(&krw_btc(), dec!(45000000), dec!(2000000), 10);

        let candles = data.fetch_history(&krw_btc(), 15).await.unwrap();
        assert_eq!(candles.len(), 10);
    }

    #[tokio::test]
    async fn test_stub_market_data_failure_resets() {
        let data = StubMarketData::new();
        data.set_price(&krw_btc(), dec!(45000000));
        data.set_fail_next(true);

        assert!(data.fetch_current_price(&krw_btc()).await.is_err());
        assert!(data.fetch_current_price(&krw_btc()).await.is_ok());
    }

    #[tokio::test]
    async fn test_stub_account_lists_sorted_balances() {
        let account = StubAccount::new();
        account.set_balance("KRW", dec!(1000000), dec!(0));
        account.set_balance("BTC", dec!(0.1), dec!(0));

        let balances = account.list_balances().await.unwrap();
        assert_eq!(balances.len(), 2);
        assert_eq!(balances[0].currency, "BTC");
        assert_eq!(balances[1].currency, "KRW");
    }

    #[tokio::test]
    async fn test_stub_order_service_default_fill() {
        let orders = StubOrderService::new(dec!(45000000));
        let fill = orders
            .submit_market_exit(&krw_btc(), Quantity::new(dec!(0.1)).unwrap(), "KRW-BTC-1")
            .await
            .unwrap();

        assert_eq!(fill.fill_price.as_decimal(), dec!(45000000));
        assert_eq!(fill.fill_quantity, dec!(0.1));
        assert_eq!(orders.submission_count(), 1);
    }

    #[tokio::test]
    async fn test_stub_order_service_script_order() {
        let orders = StubOrderService::new(dec!(45000000));
        orders.script(vec![OrderBehavior::Unreachable, OrderBehavior::Fill]);
        let quantity = Quantity::new(dec!(0.1)).unwrap();

        let first = orders.submit_market_exit(&krw_btc(), quantity, "id-1").await;
        assert!(matches!(first, Err(OrderError::Unreachable(_))));

        let second = orders.submit_market_exit(&krw_btc(), quantity, "id-1").await;
        assert!(second.is_ok());
    }

    #[tokio::test]
    async fn test_memory_ledger_upsert_overwrites() {
        let ledger = MemoryLedger::new();
        let market = krw_btc();

        ledger.upsert_position(&market, dec!(0.1), dec!(4500000)).await.unwrap();
        ledger.upsert_position(&market, dec!(0.2), dec!(9000000)).await.unwrap();

        assert_eq!(ledger.position(&market), Some((dec!(0.2), dec!(9000000))));
        assert_eq!(ledger.upsert_count(), 2);
    }

    #[tokio::test]
    async fn test_memory_ledger_scripted_failures_recover() {
        let ledger = MemoryLedger::new();
        ledger.fail_next_writes(1);

        let market = krw_btc();
        assert!(ledger.upsert_position(&market, dec!(0.1), dec!(1)).await.is_err());
        assert!(ledger.upsert_position(&market, dec!(0.1), dec!(1)).await.is_ok());
    }

    #[tokio::test]
    async fn test_recording_alert_sink_counts_by_severity() {
        let sink = RecordingAlertSink::new();
        sink.notify(Severity::Info, "summary", serde_json::json!({})).await;
        sink.notify(Severity::Critical, "ambiguous fill", serde_json::json!({})).await;

        assert_eq!(sink.count(Severity::Info), 1);
        assert_eq!(sink.count(Severity::Critical), 1);
        assert_eq!(sink.alerts().len(), 2);
    }
}
