//! Exit Executor: idempotent protective order submission.
//!
//! Turns one exit decision into at most one live order. Submission
//! failures before acknowledgment are retried with bounded exponential
//! backoff; an acknowledged-but-unconfirmed submission is *not* retried,
//! because a blind replay risks selling the position twice. The caller
//! commits or reverts the trailing-state transition based on the
//! three-outcome record this module returns.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

use aegis_domain::{ExitReason, Market, Price, Quantity};

use crate::error::{ExecError, ExecResult};
use crate::ports::{OrderError, OrderExecutionPort};

// =============================================================================
// Execution Record
// =============================================================================

/// Outcome of one exit attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionOutcome {
    /// Order filled; fill fields are populated
    Succeeded,
    /// Order was never submitted; the state transition must be reverted
    Failed,
    /// Order acknowledged but unconfirmed; state stays exited pending
    /// reconciliation against the actual account balance
    Unknown,
}

/// One exit attempt, consumed by the ledger-sync step and then discarded.
///
/// The ledger is the durable record, not this struct.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    /// Time-ordered record id
    pub id: Uuid,
    /// Market the exit was placed in
    pub market: Market,
    /// Why the exit fired
    pub reason: ExitReason,
    /// Quantity requested (after clamping)
    pub requested_quantity: Decimal,
    /// Actual fill price (Succeeded only)
    pub fill_price: Option<Price>,
    /// Actual filled quantity (Succeeded only)
    pub fill_quantity: Option<Decimal>,
    /// Venue order id (Succeeded only)
    pub order_id: Option<String>,
    /// How the attempt resolved
    pub outcome: ExecutionOutcome,
    /// When the attempt resolved
    pub executed_at: DateTime<Utc>,
}

// =============================================================================
// Exit Request
// =============================================================================

/// One exit decision handed to the executor.
#[derive(Debug, Clone)]
pub struct ExitRequest {
    /// Market to exit
    pub market: Market,
    /// Why the exit fired
    pub reason: ExitReason,
    /// Sellable (non-locked) balance of the base asset
    pub available: Decimal,
    /// Current market price, used for the notional floor check
    pub current_price: Price,
    /// Decision-cycle timestamp; combined with the market code it forms
    /// the idempotency key passed to the venue
    pub cycle_at: DateTime<Utc>,
}

// =============================================================================
// Retry Policy
// =============================================================================

/// Bounded retry policy for pre-acknowledgment submission failures.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum submission attempts
    pub max_attempts: u32,
    /// Base backoff; doubles per attempt (1s, 2s, 4s, ...)
    pub backoff_base: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 3, backoff_base: Duration::from_secs(1) }
    }
}

// =============================================================================
// Executor Config
// =============================================================================

/// Executor configuration.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Retry behavior for unreachable submissions
    pub retry: RetryPolicy,
    /// Minimum order notional accepted by the venue (quote currency)
    pub min_order_value: Decimal,
    /// Test mode caps order sizes instead of selling the full balance
    pub test_mode: bool,
    /// Maximum base-asset quantity per order in test mode
    pub test_order_cap: Decimal,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            min_order_value: Decimal::from(5000),
            test_mode: false,
            test_order_cap: Decimal::new(1, 3), // 0.001
        }
    }
}

// =============================================================================
// Exit Executor
// =============================================================================

/// Submits protective exits with at-most-one semantics per decision.
pub struct ExitExecutor<O: OrderExecutionPort> {
    /// Order execution port
    orders: Arc<O>,
    /// Configuration
    config: ExecutorConfig,
}

impl<O: OrderExecutionPort> ExitExecutor<O> {
    /// Create a new exit executor.
    pub fn new(orders: Arc<O>, config: ExecutorConfig) -> Self {
        Self { orders, config }
    }

    /// Execute one exit decision.
    ///
    /// Returns an `ExecutionRecord` whose outcome the caller uses to
    /// commit (`Succeeded`, `Unknown`) or revert (`Failed`) the
    /// trailing-state transition.
    ///
    /// # Errors
    ///
    /// Returns `ExecError::NoAvailableBalance` when nothing is sellable
    /// and `ExecError::BelowMinimumOrder` when the notional falls under
    /// the venue minimum. Both mean no submission was attempted; the
    /// caller reverts the transition so the next cycle re-evaluates.
    pub async fn execute(&self, request: ExitRequest) -> ExecResult<ExecutionRecord> {
        let quantity = self.order_quantity(&request)?;

        let notional = quantity.as_decimal() * request.current_price.as_decimal();
        if notional < self.config.min_order_value {
            return Err(ExecError::BelowMinimumOrder {
                market: request.market.code(),
                value: notional,
                minimum: self.config.min_order_value,
            });
        }

        // Idempotency key: one decision per (market, cycle), so a venue
        // that deduplicates client ids drops replays of the same decision.
        let client_order_id =
            format!("{}-{}", request.market.code(), request.cycle_at.timestamp());

        self.submit_with_retry(&request, quantity, &client_order_id).await
    }

    /// Determine the order quantity: full available balance, clamped in
    /// test mode.
    fn order_quantity(&self, request: &ExitRequest) -> ExecResult<Quantity> {
        if request.available <= Decimal::ZERO {
            return Err(ExecError::NoAvailableBalance { market: request.market.code() });
        }

        let mut quantity = request.available;
        if self.config.test_mode && quantity > self.config.test_order_cap {
            info!(
                market = %request.market,
                requested = %quantity,
                capped = %self.config.test_order_cap,
                "Test mode: capping order quantity"
            );
            quantity = self.config.test_order_cap;
        }

        Ok(Quantity::new(quantity)?)
    }

    /// Submit with bounded exponential backoff on pre-ack failures.
    async fn submit_with_retry(
        &self,
        request: &ExitRequest,
        quantity: Quantity,
        client_order_id: &str,
    ) -> ExecResult<ExecutionRecord> {
        let max_attempts = self.config.retry.max_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 0..max_attempts {
            if attempt > 0 {
                let delay = self.config.retry.backoff_base * (1 << (attempt - 1));
                warn!(
                    market = %request.market,
                    attempt = attempt + 1,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    "Retrying exit submission"
                );
                tokio::time::sleep(delay).await;
            }

            info!(
                market = %request.market,
                reason = %request.reason,
                quantity = %quantity,
                %client_order_id,
                "Submitting market exit"
            );

            match self.orders.submit_market_exit(&request.market, quantity, client_order_id).await
            {
                Ok(fill) => {
                    info!(
                        market = %request.market,
                        order_id = %fill.order_id,
                        fill_price = %fill.fill_price,
                        fill_quantity = %fill.fill_quantity,
                        "Exit order filled"
                    );
                    return Ok(self.record(request, quantity, ExecutionOutcome::Succeeded, Some(fill)));
                },

                Err(OrderError::Unreachable(msg)) => {
                    warn!(market = %request.market, error = %msg, "Submission unreachable");
                    last_error = msg;
                },

                Err(OrderError::Rejected(msg)) => {
                    error!(market = %request.market, error = %msg, "Order rejected by venue");
                    return Ok(self.record(request, quantity, ExecutionOutcome::Failed, None));
                },

                Err(OrderError::Ambiguous(msg)) => {
                    // The order may be live. A replay risks double-selling,
                    // so the outcome is surfaced for reconciliation instead.
                    error!(
                        market = %request.market,
                        error = %msg,
                        "Order result ambiguous; leaving for reconciliation"
                    );
                    return Ok(self.record(request, quantity, ExecutionOutcome::Unknown, None));
                },
            }
        }

        error!(
            market = %request.market,
            attempts = max_attempts,
            error = %last_error,
            "Exit submission failed after all attempts"
        );
        Ok(self.record(request, quantity, ExecutionOutcome::Failed, None))
    }

    fn record(
        &self,
        request: &ExitRequest,
        quantity: Quantity,
        outcome: ExecutionOutcome,
        fill: Option<crate::ports::ExitFill>,
    ) -> ExecutionRecord {
        ExecutionRecord {
            id: Uuid::now_v7(),
            market: request.market.clone(),
            reason: request.reason,
            requested_quantity: quantity.as_decimal(),
            fill_price: fill.as_ref().map(|f| f.fill_price),
            fill_quantity: fill.as_ref().map(|f| f.fill_quantity),
            order_id: fill.map(|f| f.order_id),
            outcome,
            executed_at: Utc::now(),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stub::{OrderBehavior, StubOrderService};
    use rust_decimal_macros::dec;

    fn krw_btc() -> Market {
        Market::from_code("KRW-BTC").unwrap()
    }

    fn request(available: Decimal) -> ExitRequest {
        ExitRequest {
            market: krw_btc(),
            reason: ExitReason::StopLoss,
            available,
            current_price: Price::new(dec!(45000000)).unwrap(),
            cycle_at: Utc::now(),
        }
    }

    fn fast_executor(orders: Arc<StubOrderService>, config: ExecutorConfig) -> ExitExecutor<StubOrderService> {
        let mut config = config;
        config.retry.backoff_base = Duration::from_millis(1);
        ExitExecutor::new(orders, config)
    }

    #[tokio::test]
    async fn test_successful_exit_produces_succeeded_record() {
        let orders = Arc::new(StubOrderService::new(dec!(45000000)));
        let executor = fast_executor(orders.clone(), ExecutorConfig::default());

        let record = executor.execute(request(dec!(0.1))).await.unwrap();

        assert_eq!(record.outcome, ExecutionOutcome::Succeeded);
        assert_eq!(record.requested_quantity, dec!(0.1));
        assert_eq!(record.fill_quantity, Some(dec!(0.1)));
        assert!(record.order_id.is_some());
        assert_eq!(orders.submission_count(), 1);
    }

    #[tokio::test]
    async fn test_unreachable_then_fill_yields_single_succeeded_record() {
        let orders = Arc::new(StubOrderService::new(dec!(45000000)));
        orders.script(vec![
            OrderBehavior::Unreachable,
            OrderBehavior::Fill,
        ]);
        let executor = fast_executor(orders.clone(), ExecutorConfig::default());

        let record = executor.execute(request(dec!(0.1))).await.unwrap();

        assert_eq!(record.outcome, ExecutionOutcome::Succeeded);
        assert_eq!(orders.submission_count(), 2);

        // Both attempts carried the same idempotency key
        let ids = orders.client_order_ids();
        assert_eq!(ids.len(), 2);
        assert_eq!(ids[0], ids[1]);
    }

    #[tokio::test]
    async fn test_exhausted_retries_produce_failed_record() {
        let orders = Arc::new(StubOrderService::new(dec!(45000000)));
        orders.script(vec![
            OrderBehavior::Unreachable,
            OrderBehavior::Unreachable,
            OrderBehavior::Unreachable,
        ]);
        let executor = fast_executor(orders.clone(), ExecutorConfig::default());

        let record = executor.execute(request(dec!(0.1))).await.unwrap();

        assert_eq!(record.outcome, ExecutionOutcome::Failed);
        assert!(record.order_id.is_none());
        assert_eq!(orders.submission_count(), 3);
    }

    #[tokio::test]
    async fn test_rejection_is_not_retried() {
        let orders = Arc::new(StubOrderService::new(dec!(45000000)));
        orders.script(vec![OrderBehavior::Rejected]);
        let executor = fast_executor(orders.clone(), ExecutorConfig::default());

        let record = executor.execute(request(dec!(0.1))).await.unwrap();

        assert_eq!(record.outcome, ExecutionOutcome::Failed);
        assert_eq!(orders.submission_count(), 1);
    }

    #[tokio::test]
    async fn test_ambiguous_result_is_unknown_and_not_retried() {
        let orders = Arc::new(StubOrderService::new(dec!(45000000)));
        orders.script(vec![OrderBehavior::Ambiguous]);
        let executor = fast_executor(orders.clone(), ExecutorConfig::default());

        let record = executor.execute(request(dec!(0.1))).await.unwrap();

        assert_eq!(record.outcome, ExecutionOutcome::Unknown);
        assert!(record.fill_price.is_none());
        assert_eq!(orders.submission_count(), 1);
    }

    #[tokio::test]
    async fn test_test_mode_caps_quantity() {
        let orders = Arc::new(StubOrderService::new(dec!(45000000)));
        let config = ExecutorConfig { test_mode: true, ..ExecutorConfig::default() };
        let executor = fast_executor(orders.clone(), config);

        let record = executor.execute(request(dec!(0.5))).await.unwrap();

        assert_eq!(record.requested_quantity, dec!(0.001));
    }

    #[tokio::test]
    async fn test_zero_available_balance_is_refused() {
        let orders = Arc::new(StubOrderService::new(dec!(45000000)));
        let executor = fast_executor(orders.clone(), ExecutorConfig::default());

        let result = executor.execute(request(dec!(0))).await;

        assert!(matches!(result, Err(ExecError::NoAvailableBalance { .. })));
        assert_eq!(orders.submission_count(), 0);
    }

    #[tokio::test]
    async fn test_below_minimum_order_is_refused() {
        let orders = Arc::new(StubOrderService::new(dec!(45000000)));
        let config = ExecutorConfig {
            min_order_value: dec!(5000),
            ..ExecutorConfig::default()
        };
        let executor = fast_executor(orders.clone(), config);

        // 0.0000001 × 45,000,000 = 4.5 KRW, far below the 5,000 floor
        let result = executor.execute(request(dec!(0.0000001))).await;

        assert!(matches!(result, Err(ExecError::BelowMinimumOrder { .. })));
        assert_eq!(orders.submission_count(), 0);
    }
}
