//! Monitoring Cycle Orchestrator
//!
//! One `run_cycle` invocation enumerates open positions fresh from
//! account balances, runs the volatility → envelope → trigger pipeline
//! per market on a bounded worker pool, fires protective exits through
//! the idempotent executor, and synchronizes the external ledger.
//!
//! Error policy: per-symbol failures (missing history, unusable
//! volatility, provider outages) skip the symbol, raise an alert, and
//! never abort the cycle. The in-process trailing-state store is the
//! source of truth for exit decisions; the ledger is eventually
//! consistent and re-synced every cycle plus on a coarser
//! reconciliation period.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::json;
use tokio::sync::{Mutex, RwLock, Semaphore};
use tokio::task::JoinSet;
use tokio::time::{timeout, Instant};
use tracing::{debug, error, info, warn};

use aegis_domain::{Balance, ExitReason, Holding, Market, TrailingState};
use aegis_engine::{
    average_true_range, build_envelope, estimate_entry_price, evaluate, Decision, RiskEnvelope,
};
use aegis_exec::{
    AccountPort, AlertSink, ExecutionOutcome, ExecutionRecord, ExitExecutor, ExitRequest,
    LedgerPort, MarketDataPort, MemoryLedger, OrderExecutionPort, ProviderError, Severity,
    StubAccount, StubMarketData, StubOrderService,
};
use aegis_store::{MemoryStateStore, TrailingStateRepository};

use crate::alerts::LogAlertSink;
use crate::config::Config;
use crate::error::{DaemonError, DaemonResult};

// =============================================================================
// Cycle Summary
// =============================================================================

/// Aggregate counters for one orchestration pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CycleSummary {
    /// Positions that completed evaluation
    pub positions_monitored: u32,
    /// Positions skipped by errors or the cycle deadline
    pub positions_skipped: u32,
    /// Protective exits confirmed filled this cycle
    pub orders_executed: u32,
    /// Warning/critical notifications raised this cycle
    pub alerts_raised: u32,
    /// Account value in quote currency at cycle start
    pub total_portfolio_value: Decimal,
}

/// Per-symbol outcome handed back from a worker task.
#[derive(Debug)]
struct SymbolReport {
    market: Market,
    monitored: bool,
    executed: bool,
    alerts: u32,
}

impl SymbolReport {
    fn skipped(market: Market, alerts: u32) -> Self {
        Self { market, monitored: false, executed: false, alerts }
    }
}

// =============================================================================
// Risk Monitor
// =============================================================================

/// The monitoring cycle orchestrator.
///
/// Holds the ports to every external collaborator and the trailing-state
/// store. `run_cycle(now)` is the single entry point; the scheduler (or a
/// test) decides when to invoke it and with what clock.
pub struct RiskMonitor<O: OrderExecutionPort + 'static> {
    market_data: Arc<dyn MarketDataPort>,
    account: Arc<dyn AccountPort>,
    executor: Arc<ExitExecutor<O>>,
    ledger: Arc<dyn LedgerPort>,
    alerts: Arc<dyn AlertSink>,
    store: Arc<dyn TrailingStateRepository>,
    config: Config,
    /// Rejects overlapping cycles
    cycle_guard: Mutex<()>,
    /// When the last full reconciliation ran
    last_reconcile: RwLock<Option<DateTime<Utc>>>,
}

impl RiskMonitor<StubOrderService> {
    /// Create a monitor wired to stub collaborators (testing/development).
    pub fn new_stub(config: Config) -> Arc<Self> {
        let orders = Arc::new(StubOrderService::new(Decimal::from(45_000_000)));
        let executor = Arc::new(ExitExecutor::new(orders, config.executor_config()));

        Arc::new(Self::new(
            Arc::new(StubMarketData::new()),
            Arc::new(StubAccount::new()),
            executor,
            Arc::new(MemoryLedger::new()),
            Arc::new(LogAlertSink),
            Arc::new(MemoryStateStore::new()),
            config,
        ))
    }
}

impl<O: OrderExecutionPort + 'static> RiskMonitor<O> {
    /// Create a new monitor.
    pub fn new(
        market_data: Arc<dyn MarketDataPort>,
        account: Arc<dyn AccountPort>,
        executor: Arc<ExitExecutor<O>>,
        ledger: Arc<dyn LedgerPort>,
        alerts: Arc<dyn AlertSink>,
        store: Arc<dyn TrailingStateRepository>,
        config: Config,
    ) -> Self {
        Self {
            market_data,
            account,
            executor,
            ledger,
            alerts,
            store,
            config,
            cycle_guard: Mutex::new(()),
            last_reconcile: RwLock::new(None),
        }
    }

    /// Run one monitoring cycle.
    ///
    /// `now` is the decision-cycle timestamp: it keys order idempotency,
    /// exit transitions, and the reconciliation cadence, so tests can
    /// inject a clock.
    ///
    /// # Errors
    ///
    /// Fails with `DaemonError::CycleInProgress` when invoked while a
    /// previous cycle is still running, and with a provider error when
    /// the account balances cannot be listed at all. Everything else is
    /// handled per symbol.
    pub async fn run_cycle(self: &Arc<Self>, now: DateTime<Utc>) -> DaemonResult<CycleSummary> {
        let _guard = self.cycle_guard.try_lock().map_err(|_| DaemonError::CycleInProgress)?;
        let deadline =
            Instant::now() + Duration::from_secs(self.config.monitor.cycle_timeout_secs);

        info!(cycle_at = %now, "Starting risk monitoring cycle");

        let balances = self.provider_call(self.account.list_balances()).await?;
        let (holdings, quote_cash, setup_failures) = self.build_holdings(&balances).await;

        let portfolio_value =
            quote_cash + holdings.iter().map(Holding::market_value).sum::<Decimal>();

        let mut summary = CycleSummary {
            positions_monitored: 0,
            positions_skipped: setup_failures,
            orders_executed: 0,
            alerts_raised: setup_failures,
            total_portfolio_value: portfolio_value,
        };

        if holdings.is_empty() && setup_failures == 0 {
            info!("No positions to monitor");
        }

        // Bounded worker pool: each symbol's evaluation, state update and
        // order submission run to completion inside one task. The cycle
        // deadline stops dispatching further symbols; it never cancels a
        // symbol mid-transition.
        let semaphore = Arc::new(Semaphore::new(self.config.monitor.max_concurrency));
        let mut workers: JoinSet<SymbolReport> = JoinSet::new();
        let mut deadline_skips = 0u32;

        for holding in holdings.clone() {
            let permit = match semaphore.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => break,
            };
            if Instant::now() >= deadline {
                deadline_skips += 1;
                continue;
            }

            let monitor = Arc::clone(self);
            workers.spawn(async move {
                let _permit = permit;
                monitor.process_holding(holding, portfolio_value, now).await
            });
        }

        if deadline_skips > 0 {
            warn!(skipped = deadline_skips, "Cycle deadline reached; positions not dispatched");
            self.alerts
                .notify(
                    Severity::Warning,
                    "Cycle deadline reached; positions skipped",
                    json!({ "skipped": deadline_skips }),
                )
                .await;
            summary.positions_skipped += deadline_skips;
            summary.alerts_raised += 1;
        }

        let mut executed_markets: HashSet<Market> = HashSet::new();
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(report) => {
                    if report.monitored {
                        summary.positions_monitored += 1;
                    } else {
                        summary.positions_skipped += 1;
                    }
                    if report.executed {
                        summary.orders_executed += 1;
                        executed_markets.insert(report.market);
                    }
                    summary.alerts_raised += report.alerts;
                },
                Err(e) => {
                    error!(error = %e, "Symbol worker panicked");
                    summary.positions_skipped += 1;
                },
            }
        }

        // Post-cycle ledger pass: idempotent upsert of every position that
        // produced no exit (executed ones were synced with fill data).
        for holding in &holdings {
            if executed_markets.contains(&holding.market) {
                continue;
            }
            if !self
                .ledger_upsert_with_retry(&holding.market, holding.total, holding.market_value())
                .await
            {
                summary.alerts_raised += 1;
            }
        }

        self.cleanup_departed_states(&balances).await;

        if self.reconcile_due(now).await {
            summary.alerts_raised += self.reconcile(now).await;
        }

        self.alerts
            .notify(
                Severity::Info,
                "Risk monitoring summary",
                json!({
                    "cycle_at": now.to_rfc3339(),
                    "positions_monitored": summary.positions_monitored,
                    "positions_skipped": summary.positions_skipped,
                    "orders_executed": summary.orders_executed,
                    "alerts_raised": summary.alerts_raised,
                    "portfolio_value": portfolio_value,
                }),
            )
            .await;

        info!(
            monitored = summary.positions_monitored,
            skipped = summary.positions_skipped,
            executed = summary.orders_executed,
            alerts = summary.alerts_raised,
            portfolio_value = %portfolio_value,
            "Cycle complete"
        );

        Ok(summary)
    }

    // =========================================================================
    // Position discovery
    // =========================================================================

    /// Build per-market holdings from raw balances, fetching current
    /// prices. Returns (holdings, quote cash, skipped-position count).
    async fn build_holdings(&self, balances: &[Balance]) -> (Vec<Holding>, Decimal, u32) {
        let mut holdings = Vec::new();
        let mut quote_cash = Decimal::ZERO;
        let mut failures = 0u32;

        for balance in balances {
            if balance.currency == self.config.quote_currency {
                quote_cash += balance.total;
                continue;
            }
            if balance.total <= Decimal::ZERO {
                continue;
            }

            let market = match Market::new(&self.config.quote_currency, &balance.currency) {
                Ok(market) => market,
                Err(e) => {
                    warn!(currency = %balance.currency, error = %e, "Unusable balance entry");
                    self.notify_warning(
                        "Unusable balance entry; position skipped",
                        json!({ "currency": balance.currency, "error": e.to_string() }),
                    )
                    .await;
                    failures += 1;
                    continue;
                },
            };

            match self.provider_call(self.market_data.fetch_current_price(&market)).await {
                Ok(price) => {
                    holdings.push(Holding::new(market, balance.total, balance.locked, price));
                },
                Err(e) => {
                    warn!(market = %market, error = %e, "Price unavailable; skipping position");
                    self.notify_warning(
                        "Price unavailable; position skipped",
                        json!({ "market": market.code(), "error": e.to_string() }),
                    )
                    .await;
                    failures += 1;
                },
            }
        }

        (holdings, quote_cash, failures)
    }

    // =========================================================================
    // Per-symbol pipeline
    // =========================================================================

    /// Volatility → envelope → trigger evaluation for one holding.
    async fn process_holding(
        &self,
        holding: Holding,
        portfolio_value: Decimal,
        now: DateTime<Utc>,
    ) -> SymbolReport {
        let market = holding.market.clone();
        let periods = self.config.risk.atr_window + 1;

        let candles =
            match self.provider_call(self.market_data.fetch_history(&market, periods)).await {
                Ok(candles) => candles,
                Err(e) => {
                    warn!(market = %market, error = %e, "History unavailable; skipping");
                    self.notify_warning(
                        "History unavailable; position skipped",
                        json!({ "market": market.code(), "error": e.to_string() }),
                    )
                    .await;
                    return SymbolReport::skipped(market, 1);
                },
            };

        let volatility = match average_true_range(&candles, self.config.risk.atr_window) {
            Ok(volatility) => volatility,
            Err(e) => {
                warn!(market = %market, error = %e, "Volatility unavailable; skipping");
                self.notify_warning(
                    "Volatility unavailable; position skipped",
                    json!({ "market": market.code(), "error": e.to_string() }),
                )
                .await;
                return SymbolReport::skipped(market, 1);
            },
        };

        let entry_estimate = estimate_entry_price(&candles, self.config.risk.entry_lookback)
            .unwrap_or_else(|| holding.current_price.as_decimal());

        let envelope =
            match build_envelope(entry_estimate, volatility, &self.config.envelope_params()) {
                Ok(envelope) => envelope,
                Err(e) => {
                    warn!(market = %market, error = %e, "Unusable envelope; skipping");
                    self.notify_warning(
                        "Unusable risk envelope; position skipped",
                        json!({ "market": market.code(), "error": e.to_string() }),
                    )
                    .await;
                    return SymbolReport::skipped(market, 1);
                },
            };

        let mut alerts = self
            .raise_informational_alerts(&holding, volatility, &envelope, portfolio_value)
            .await;

        let prior = match self.store.get(&market).await {
            Ok(prior) => prior,
            Err(e) => {
                error!(market = %market, error = %e, "State store unavailable; skipping");
                return SymbolReport::skipped(market, alerts);
            },
        };
        let state =
            prior.as_ref().map(|record| record.state.clone()).unwrap_or(TrailingState::Armed);

        debug!(
            market = %market,
            state = state.name(),
            price = %holding.current_price,
            stop_loss = %envelope.stop_loss,
            take_profit = %envelope.take_profit,
            "Evaluating position"
        );

        match evaluate(&state, &envelope, holding.current_price) {
            Decision::Hold => {
                if prior.is_none() {
                    // First observation arms the market
                    self.store_state(&market, TrailingState::Armed).await;
                }
                SymbolReport { market, monitored: true, executed: false, alerts }
            },

            Decision::BeginTrailing { highest_price, active_stop } => {
                info!(market = %market, %highest_price, %active_stop, "Trailing activated");
                self.store_state(&market, TrailingState::Trailing { highest_price, active_stop })
                    .await;
                SymbolReport { market, monitored: true, executed: false, alerts }
            },

            Decision::RaiseStop { highest_price, active_stop } => {
                debug!(market = %market, %highest_price, %active_stop, "Trailing stop raised");
                self.store_state(&market, TrailingState::Trailing { highest_price, active_stop })
                    .await;
                SymbolReport { market, monitored: true, executed: false, alerts }
            },

            Decision::Exit { reason } => {
                let prior_state = prior.map(|record| record.state);
                let (executed, exit_alerts) =
                    self.fire_exit(&holding, reason, prior_state, now).await;
                alerts += exit_alerts;
                SymbolReport { market, monitored: true, executed, alerts }
            },
        }
    }

    /// Purely informational risk conditions; none of them trigger exits.
    async fn raise_informational_alerts(
        &self,
        holding: &Holding,
        volatility: Decimal,
        envelope: &RiskEnvelope,
        portfolio_value: Decimal,
    ) -> u32 {
        let mut raised = 0u32;
        let price = holding.current_price.as_decimal();

        let volatility_pct = volatility / price * Decimal::ONE_HUNDRED;
        if volatility_pct > self.config.risk.high_volatility_pct {
            warn!(market = %holding.market, volatility_pct = %volatility_pct, "High volatility");
            self.notify_warning(
                "High volatility",
                json!({ "market": holding.market.code(), "volatility_pct": volatility_pct }),
            )
            .await;
            raised += 1;
        }

        if portfolio_value > Decimal::ZERO {
            let share_pct = holding.market_value() / portfolio_value * Decimal::ONE_HUNDRED;
            if share_pct > self.config.risk.concentration_pct {
                warn!(market = %holding.market, share_pct = %share_pct, "Concentrated position");
                self.notify_warning(
                    "Concentrated position",
                    json!({ "market": holding.market.code(), "share_pct": share_pct }),
                )
                .await;
                raised += 1;
            }

            let envelope_risk = (envelope.entry_estimate - envelope.stop_loss) * holding.total;
            let risk_cap = self.config.risk.position_risk_cap * portfolio_value;
            if envelope_risk > risk_cap {
                warn!(
                    market = %holding.market,
                    envelope_risk = %envelope_risk,
                    cap = %risk_cap,
                    "Position risk above cap"
                );
                self.notify_warning(
                    "Position risk above cap",
                    json!({
                        "market": holding.market.code(),
                        "envelope_risk": envelope_risk,
                        "cap": risk_cap,
                    }),
                )
                .await;
                raised += 1;
            }
        }

        raised
    }

    // =========================================================================
    // Exit handling
    // =========================================================================

    /// Fire one protective exit as a single unit: mark the transition,
    /// submit, then commit or revert on the outcome.
    async fn fire_exit(
        &self,
        holding: &Holding,
        reason: ExitReason,
        prior: Option<TrailingState>,
        now: DateTime<Utc>,
    ) -> (bool, u32) {
        let market = holding.market.clone();

        info!(market = %market, %reason, price = %holding.current_price, "Exit triggered");

        // Marking Exited first guarantees nothing can fire a second exit
        // for this market; the transition is reverted if nothing was
        // actually submitted.
        if let Err(e) = self.store.put(&market, TrailingState::Exited { reason, at: now }).await {
            error!(market = %market, error = %e, "Cannot record exit transition; order withheld");
            return (false, 0);
        }

        let request = ExitRequest {
            market: market.clone(),
            reason,
            available: holding.available(),
            current_price: holding.current_price,
            cycle_at: now,
        };

        match self.executor.execute(request).await {
            Ok(record) => match record.outcome {
                ExecutionOutcome::Succeeded => {
                    let alerts = self.sync_execution(holding, &record).await;
                    self.alerts
                        .notify(
                            Severity::Info,
                            "Protective exit executed",
                            json!({
                                "market": market.code(),
                                "reason": reason.to_string(),
                                "fill_price": record.fill_price,
                                "fill_quantity": record.fill_quantity,
                                "order_id": record.order_id,
                            }),
                        )
                        .await;
                    (true, alerts)
                },

                ExecutionOutcome::Failed => {
                    // No order went out: undo the transition so the next
                    // cycle retries the decision.
                    self.revert_transition(&market, prior).await;
                    self.notify_warning(
                        "Exit submission failed; decision retries next cycle",
                        json!({ "market": market.code(), "reason": reason.to_string() }),
                    )
                    .await;
                    (false, 1)
                },

                ExecutionOutcome::Unknown => {
                    // The order may be live. Keeping the Exited state risks
                    // a missed exit but prevents a duplicate sell; the
                    // alert hands reconciliation to the next cycle or a
                    // human.
                    self.alerts
                        .notify(
                            Severity::Critical,
                            "Exit result ambiguous; reconcile against account balance",
                            json!({
                                "market": market.code(),
                                "reason": reason.to_string(),
                                "requested_quantity": record.requested_quantity,
                            }),
                        )
                        .await;
                    (false, 1)
                },
            },

            Err(e) => {
                self.revert_transition(&market, prior).await;
                warn!(market = %market, error = %e, "Exit not attempted");
                self.notify_warning(
                    "Exit not attempted",
                    json!({ "market": market.code(), "error": e.to_string() }),
                )
                .await;
                (false, 1)
            },
        }
    }

    /// Restore the pre-exit state (or clear it if the market had none).
    async fn revert_transition(&self, market: &Market, prior: Option<TrailingState>) {
        let result = match prior {
            Some(state) => self.store.put(market, state).await,
            None => self.store.remove(market).await,
        };
        if let Err(e) = result {
            error!(market = %market, error = %e, "Failed to revert exit transition");
        }
    }

    /// Synchronously reflect a confirmed fill in the ledger.
    /// Returns the number of alerts raised by failed writes.
    async fn sync_execution(&self, holding: &Holding, record: &ExecutionRecord) -> u32 {
        let mut alerts = 0u32;

        if !self.ledger_record_with_retry(record).await {
            alerts += 1;
        }

        let filled = record.fill_quantity.unwrap_or(Decimal::ZERO);
        let remaining = (holding.total - filled).max(Decimal::ZERO);
        let price = record
            .fill_price
            .map(|p| p.as_decimal())
            .unwrap_or_else(|| holding.current_price.as_decimal());
        if !self
            .ledger_upsert_with_retry(&holding.market, remaining, remaining * price)
            .await
        {
            alerts += 1;
        }

        alerts
    }

    // =========================================================================
    // State store maintenance
    // =========================================================================

    async fn store_state(&self, market: &Market, state: TrailingState) {
        if let Err(e) = self.store.put(market, state).await {
            error!(market = %market, error = %e, "Failed to persist trailing state");
        }
    }

    /// Remove state for markets whose balance is gone. A market that
    /// reappears later starts as a fresh Armed record.
    async fn cleanup_departed_states(&self, balances: &[Balance]) {
        let held: HashSet<&str> = balances
            .iter()
            .filter(|b| b.total > Decimal::ZERO && b.currency != self.config.quote_currency)
            .map(|b| b.currency.as_str())
            .collect();

        let all = match self.store.all().await {
            Ok(all) => all,
            Err(e) => {
                error!(error = %e, "Cannot enumerate trailing states for cleanup");
                return;
            },
        };

        for (market, record) in all {
            if !held.contains(market.base()) {
                info!(market = %market, state = record.state.name(), "Position gone; clearing trailing state");
                if let Err(e) = self.store.remove(&market).await {
                    error!(market = %market, error = %e, "Failed to clear trailing state");
                }
            }
        }
    }

    // =========================================================================
    // Ledger synchronization
    // =========================================================================

    /// Upsert with one immediate retry; alerts and defers on failure.
    async fn ledger_upsert_with_retry(
        &self,
        market: &Market,
        quantity: Decimal,
        value: Decimal,
    ) -> bool {
        for attempt in 0..2u8 {
            match self.ledger.upsert_position(market, quantity, value).await {
                Ok(()) => return true,
                Err(e) if attempt == 0 => {
                    warn!(market = %market, error = %e, "Ledger upsert failed; retrying once");
                },
                Err(e) => {
                    error!(market = %market, error = %e, "Ledger upsert failed; deferred to next sync");
                    self.notify_warning(
                        "Ledger sync failed; deferred",
                        json!({ "market": market.code(), "error": e.to_string() }),
                    )
                    .await;
                },
            }
        }
        false
    }

    /// Record an execution with one immediate retry.
    async fn ledger_record_with_retry(&self, record: &ExecutionRecord) -> bool {
        for attempt in 0..2u8 {
            match self.ledger.record_execution(record).await {
                Ok(()) => return true,
                Err(e) if attempt == 0 => {
                    warn!(market = %record.market, error = %e, "Execution record failed; retrying once");
                },
                Err(e) => {
                    error!(market = %record.market, error = %e, "Execution record failed; deferred");
                    self.notify_warning(
                        "Execution record failed; deferred",
                        json!({ "market": record.market.code(), "error": e.to_string() }),
                    )
                    .await;
                },
            }
        }
        false
    }

    /// Whether the coarse reconciliation period has elapsed.
    async fn reconcile_due(&self, now: DateTime<Utc>) -> bool {
        let last = self.last_reconcile.read().await;
        match *last {
            None => true,
            Some(at) => {
                now.signed_duration_since(at).num_seconds()
                    >= self.config.monitor.reconcile_interval_secs as i64
            },
        }
    }

    /// Full reconciliation: refresh every position into the ledger from
    /// actual account state, independent of any exits. Returns the number
    /// of alerts raised.
    async fn reconcile(&self, now: DateTime<Utc>) -> u32 {
        info!("Running full ledger reconciliation");
        let mut failures = 0u32;

        let balances = match self.provider_call(self.account.list_balances()).await {
            Ok(balances) => balances,
            Err(e) => {
                warn!(error = %e, "Reconciliation aborted: balances unavailable");
                self.notify_warning(
                    "Reconciliation aborted: balances unavailable",
                    json!({ "error": e.to_string() }),
                )
                .await;
                return 1;
            },
        };

        let (holdings, _, setup_failures) = self.build_holdings(&balances).await;
        failures += setup_failures;

        for holding in &holdings {
            if !self
                .ledger_upsert_with_retry(&holding.market, holding.total, holding.market_value())
                .await
            {
                failures += 1;
            }
        }

        *self.last_reconcile.write().await = Some(now);

        self.alerts
            .notify(
                Severity::Info,
                "Portfolio reconciliation complete",
                json!({ "positions": holdings.len(), "at": now.to_rfc3339() }),
            )
            .await;

        failures
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    /// Wrap an external call with the per-call timeout.
    async fn provider_call<T, F>(&self, fut: F) -> Result<T, ProviderError>
    where
        F: Future<Output = Result<T, ProviderError>>,
    {
        let limit = Duration::from_secs(self.config.monitor.call_timeout_secs);
        match timeout(limit, fut).await {
            Ok(result) => result,
            Err(_) => Err(ProviderError::Unavailable("call timed out".to_string())),
        }
    }

    async fn notify_warning(&self, message: &str, fields: serde_json::Value) {
        self.alerts.notify(Severity::Warning, message, fields).await;
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use aegis_exec::RecordingAlertSink;
    use rust_decimal_macros::dec;

    struct Harness {
        monitor: Arc<RiskMonitor<StubOrderService>>,
        market_data: Arc<StubMarketData>,
        account: Arc<StubAccount>,
        orders: Arc<StubOrderService>,
        ledger: Arc<MemoryLedger>,
        alerts: Arc<RecordingAlertSink>,
        store: Arc<MemoryStateStore>,
    }

    fn harness(config: Config) -> Harness {
        let market_data = Arc::new(StubMarketData::new());
        let account = Arc::new(StubAccount::new());
        let orders = Arc::new(StubOrderService::new(dec!(45000000)));
        let ledger = Arc::new(MemoryLedger::new());
        let alerts = Arc::new(RecordingAlertSink::new());
        let store = Arc::new(MemoryStateStore::new());

        let executor = Arc::new(ExitExecutor::new(orders.clone(), config.executor_config()));
        let monitor = Arc::new(RiskMonitor::new(
            market_data.clone(),
            account.clone(),
            executor,
            ledger.clone(),
            alerts.clone(),
            store.clone(),
            config,
        ));

        Harness { monitor, market_data, account, orders, ledger, alerts, store }
    }

    fn krw_btc() -> Market {
        Market::from_code("KRW-BTC").unwrap()
    }

    /// One BTC position plus cash; flat history giving ATR 1,000,000 and
    /// entry estimate 45,000,000 (stop 43M, target 48M, activation 46.5M).
    fn seed_btc(h: &Harness, price: Decimal) {
        h.account.set_balance("KRW", dec!(10000000), dec!(0));
        h.account.set_balance("BTC", dec!(0.1), dec!(0));
        h.market_data.set_flat_history(&krw_btc(), dec!(45000000), dec!(1000000), 20);
        h.market_data.set_price(&krw_btc(), price);
    }

    async fn stored_state(h: &Harness) -> Option<TrailingState> {
        h.store.get(&krw_btc()).await.unwrap().map(|r| r.state)
    }

    #[tokio::test]
    async fn test_quiet_cycle_arms_and_syncs_ledger() {
        let h = harness(Config::test());
        seed_btc(&h, dec!(45500000));

        let summary = h.monitor.run_cycle(Utc::now()).await.unwrap();

        assert_eq!(summary.positions_monitored, 1);
        assert_eq!(summary.positions_skipped, 0);
        assert_eq!(summary.orders_executed, 0);
        assert_eq!(summary.total_portfolio_value, dec!(10000000) + dec!(0.1) * dec!(45500000));

        assert_eq!(stored_state(&h).await, Some(TrailingState::Armed));
        assert_eq!(h.orders.submission_count(), 0);
        assert_eq!(h.ledger.position(&krw_btc()), Some((dec!(0.1), dec!(4550000))));
    }

    #[tokio::test]
    async fn test_stop_loss_executes_and_exit_is_terminal() {
        let h = harness(Config::test());
        seed_btc(&h, dec!(42900000));
        h.orders.set_fill_price(dec!(42900000));

        let summary = h.monitor.run_cycle(Utc::now()).await.unwrap();

        assert_eq!(summary.orders_executed, 1);
        assert_eq!(h.orders.submission_count(), 1);
        assert!(matches!(
            stored_state(&h).await,
            Some(TrailingState::Exited { reason: ExitReason::StopLoss, .. })
        ));

        let executions = h.ledger.executions();
        assert_eq!(executions.len(), 1);
        assert_eq!(executions[0].outcome, ExecutionOutcome::Succeeded);
        assert_eq!(executions[0].reason, ExitReason::StopLoss);
        assert_eq!(executions[0].fill_quantity, Some(dec!(0.1)));

        // Balance still present next cycle (fill not yet settled):
        // the terminal state must block a second submission.
        let summary = h.monitor.run_cycle(Utc::now()).await.unwrap();
        assert_eq!(summary.orders_executed, 0);
        assert_eq!(h.orders.submission_count(), 1);
    }

    #[tokio::test]
    async fn test_take_profit_executes() {
        let h = harness(Config::test());
        seed_btc(&h, dec!(48000000));
        h.orders.set_fill_price(dec!(48000000));

        let summary = h.monitor.run_cycle(Utc::now()).await.unwrap();

        assert_eq!(summary.orders_executed, 1);
        assert!(matches!(
            stored_state(&h).await,
            Some(TrailingState::Exited { reason: ExitReason::TakeProfit, .. })
        ));
    }

    #[tokio::test]
    async fn test_begin_trailing_matches_worked_levels() {
        let h = harness(Config::test());
        seed_btc(&h, dec!(47000000));

        h.monitor.run_cycle(Utc::now()).await.unwrap();

        match stored_state(&h).await {
            Some(TrailingState::Trailing { highest_price, active_stop }) => {
                assert_eq!(highest_price.as_decimal(), dec!(47000000));
                assert_eq!(active_stop, dec!(45500000));
            },
            other => panic!("expected trailing state, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_short_history_skips_symbol_but_cycle_continues() {
        let h = harness(Config::test());
        seed_btc(&h, dec!(45500000));

        // ETH has only 10 periods when 15 are required
        let krw_eth = Market::from_code("KRW-ETH").unwrap();
        h.account.set_balance("ETH", dec!(2.0), dec!(0));
        h.market_data.set_flat_history(&krw_eth, dec!(3000000), dec!(100000), 10);
        h.market_data.set_price(&krw_eth, dec!(3000000));

        let summary = h.monitor.run_cycle(Utc::now()).await.unwrap();

        assert_eq!(summary.positions_monitored, 1);
        assert_eq!(summary.positions_skipped, 1);
        assert!(summary.alerts_raised >= 1);
        assert!(h
            .alerts
            .alerts()
            .iter()
            .any(|(s, m)| *s == Severity::Warning && m.contains("Volatility unavailable")));

        // The skipped market carries no trailing state and no order
        assert!(h.store.get(&krw_eth).await.unwrap().is_none());
        assert_eq!(h.orders.submission_count(), 0);
    }

    #[tokio::test]
    async fn test_failed_submission_reverts_state_and_retries_next_cycle() {
        let h = harness(Config::test());
        seed_btc(&h, dec!(42900000));
        h.orders.script(vec![
            aegis_exec::OrderBehavior::Unreachable,
            aegis_exec::OrderBehavior::Unreachable,
            aegis_exec::OrderBehavior::Unreachable,
        ]);

        let summary = h.monitor.run_cycle(Utc::now()).await.unwrap();

        assert_eq!(summary.orders_executed, 0);
        assert_eq!(h.orders.submission_count(), 3);
        // No phantom Exited state for an order that never happened
        assert_eq!(stored_state(&h).await, None);
        assert!(h.ledger.executions().is_empty());

        // Next cycle the decision fires again and fills
        h.orders.set_fill_price(dec!(42900000));
        let summary = h.monitor.run_cycle(Utc::now()).await.unwrap();
        assert_eq!(summary.orders_executed, 1);
        assert_eq!(h.ledger.executions().len(), 1);
    }

    #[tokio::test]
    async fn test_ambiguous_result_keeps_exited_and_raises_critical() {
        let h = harness(Config::test());
        seed_btc(&h, dec!(42900000));
        h.orders.script(vec![aegis_exec::OrderBehavior::Ambiguous]);

        let summary = h.monitor.run_cycle(Utc::now()).await.unwrap();

        assert_eq!(summary.orders_executed, 0);
        assert_eq!(h.orders.submission_count(), 1);
        assert_eq!(h.alerts.count(Severity::Critical), 1);
        assert!(matches!(stored_state(&h).await, Some(TrailingState::Exited { .. })));

        // No second submission while the ambiguity is unresolved
        h.monitor.run_cycle(Utc::now()).await.unwrap();
        assert_eq!(h.orders.submission_count(), 1);
    }

    #[tokio::test]
    async fn test_departed_balance_clears_state_and_rearms() {
        let h = harness(Config::test());
        seed_btc(&h, dec!(42900000));
        h.monitor.run_cycle(Utc::now()).await.unwrap();
        assert!(matches!(stored_state(&h).await, Some(TrailingState::Exited { .. })));

        // The fill settles: the balance disappears and the state clears
        h.account.remove_balance("BTC");
        h.monitor.run_cycle(Utc::now()).await.unwrap();
        assert_eq!(stored_state(&h).await, None);

        // A manually reopened position re-arms from scratch and is
        // protected again
        seed_btc(&h, dec!(42900000));
        let summary = h.monitor.run_cycle(Utc::now()).await.unwrap();
        assert_eq!(summary.orders_executed, 1);
        assert_eq!(h.orders.submission_count(), 2);
    }

    #[tokio::test]
    async fn test_informational_alerts_never_trigger_exits() {
        let h = harness(Config::test());
        // No cash: the single position is 100% of the portfolio.
        // Span 8,000,000 → ATR 8,000,000 ≈ 17.8% of price (high volatility).
        h.account.set_balance("BTC", dec!(0.1), dec!(0));
        h.market_data.set_flat_history(&krw_btc(), dec!(45000000), dec!(8000000), 20);
        h.market_data.set_price(&krw_btc(), dec!(45000000));

        let summary = h.monitor.run_cycle(Utc::now()).await.unwrap();

        // High volatility + concentration + risk cap, all informational
        assert_eq!(summary.alerts_raised, 3);
        assert_eq!(h.alerts.count(Severity::Warning), 3);
        assert_eq!(summary.orders_executed, 0);
        assert_eq!(h.orders.submission_count(), 0);
    }

    #[tokio::test]
    async fn test_ledger_failure_is_retried_once() {
        let h = harness(Config::test());
        seed_btc(&h, dec!(45500000));
        // Enough cash that no informational alert fires
        h.account.set_balance("KRW", dec!(100000000), dec!(0));
        h.ledger.fail_next_writes(1);

        let summary = h.monitor.run_cycle(Utc::now()).await.unwrap();

        // First write failed, immediate retry landed; no alert raised
        assert_eq!(h.ledger.position(&krw_btc()), Some((dec!(0.1), dec!(4550000))));
        assert_eq!(summary.alerts_raised, 0);
    }

    #[tokio::test]
    async fn test_reconciliation_runs_on_first_cycle_then_waits() {
        let h = harness(Config::test());
        seed_btc(&h, dec!(45500000));

        let reconciles = |h: &Harness| {
            h.alerts
                .alerts()
                .iter()
                .filter(|(_, m)| m.contains("reconciliation complete"))
                .count()
        };

        h.monitor.run_cycle(Utc::now()).await.unwrap();
        assert_eq!(reconciles(&h), 1);

        // Interval (4h) has not elapsed: no second reconciliation
        h.monitor.run_cycle(Utc::now()).await.unwrap();
        assert_eq!(reconciles(&h), 1);

        // Inject a clock 5 hours ahead: due again
        h.monitor.run_cycle(Utc::now() + chrono::Duration::hours(5)).await.unwrap();
        assert_eq!(reconciles(&h), 2);
    }

    #[tokio::test]
    async fn test_overlapping_cycle_is_rejected() {
        let h = harness(Config::test());
        seed_btc(&h, dec!(45500000));

        let _guard = h.monitor.cycle_guard.lock().await;
        let result = h.monitor.run_cycle(Utc::now()).await;

        assert!(matches!(result, Err(DaemonError::CycleInProgress)));
    }

    #[tokio::test]
    async fn test_balance_listing_failure_fails_cycle() {
        let h = harness(Config::test());
        h.account.set_fail_next(true);

        let result = h.monitor.run_cycle(Utc::now()).await;
        assert!(matches!(result, Err(DaemonError::Provider(_))));
    }
}
