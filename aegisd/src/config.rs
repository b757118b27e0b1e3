//! Daemon configuration.
//!
//! Loads configuration from environment variables with sensible defaults.
//! Every knob of the monitoring loop is surfaced here so deployments can
//! tune cadence, risk multipliers and alert thresholds without rebuilds.

use rust_decimal::Decimal;
use std::env;
use std::str::FromStr;
use std::time::Duration;

use aegis_engine::EnvelopeParams;
use aegis_exec::{ExecutorConfig, RetryPolicy};

use crate::error::{DaemonError, DaemonResult};

// =============================================================================
// Configuration
// =============================================================================

/// Daemon configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Environment (test, development, production)
    pub environment: Environment,

    /// Quote currency of the monitored account (e.g. "KRW")
    pub quote_currency: String,

    /// Risk envelope and alert parameters
    pub risk: RiskParams,

    /// Order execution parameters
    pub execution: ExecutionParams,

    /// Cycle cadence and timeout parameters
    pub monitor: MonitorParams,
}

/// Risk envelope and alert threshold parameters.
#[derive(Debug, Clone)]
pub struct RiskParams {
    /// ATR window length (periods)
    pub atr_window: usize,
    /// Candles used for the entry-price estimate
    pub entry_lookback: usize,
    /// Stop-loss distance in volatility units
    pub stop_loss_mult: Decimal,
    /// Take-profit distance in volatility units
    pub take_profit_mult: Decimal,
    /// Trailing activation offset in volatility units
    pub trailing_mult: Decimal,
    /// High-volatility alert threshold (% of current price)
    pub high_volatility_pct: Decimal,
    /// Concentration alert threshold (% of portfolio value)
    pub concentration_pct: Decimal,
    /// Per-position risk cap (fraction of portfolio value)
    pub position_risk_cap: Decimal,
}

/// Order execution parameters.
#[derive(Debug, Clone)]
pub struct ExecutionParams {
    /// Maximum submission attempts for unreachable failures
    pub max_retry_attempts: u32,
    /// Base retry backoff in milliseconds (doubles per attempt)
    pub retry_backoff_ms: u64,
    /// Minimum order notional accepted by the venue
    pub min_order_value: Decimal,
    /// Cap order sizes instead of selling the full balance
    pub test_mode: bool,
    /// Maximum base-asset quantity per order in test mode
    pub test_order_cap: Decimal,
}

/// Cycle cadence and timeout parameters.
#[derive(Debug, Clone)]
pub struct MonitorParams {
    /// Seconds between cycle starts
    pub cycle_interval_secs: u64,
    /// Hard per-cycle deadline in seconds
    pub cycle_timeout_secs: u64,
    /// Timeout for each external call in seconds
    pub call_timeout_secs: u64,
    /// Seconds between full ledger reconciliations
    pub reconcile_interval_secs: u64,
    /// Bounded worker-pool width for per-symbol evaluation
    pub max_concurrency: usize,
}

/// Environment type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    /// Test environment (uses stubs)
    Test,
    /// Development environment
    Development,
    /// Production environment
    Production,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> DaemonResult<Self> {
        // Load .env file if present (ignore errors)
        let _ = dotenvy::dotenv();

        let environment = Self::load_environment()?;
        let quote_currency =
            env::var("AEGIS_QUOTE_CURRENCY").unwrap_or_else(|_| "KRW".to_string());

        let config = Self {
            environment,
            quote_currency,
            risk: Self::load_risk_params()?,
            execution: Self::load_execution_params()?,
            monitor: Self::load_monitor_params()?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Create test configuration: full-size orders, tight timings.
    pub fn test() -> Self {
        Self {
            environment: Environment::Test,
            quote_currency: "KRW".to_string(),
            risk: RiskParams::default(),
            execution: ExecutionParams {
                max_retry_attempts: 3,
                retry_backoff_ms: 1,
                min_order_value: Decimal::from(5000),
                test_mode: false,
                test_order_cap: Decimal::new(1, 3),
            },
            monitor: MonitorParams {
                cycle_interval_secs: 1,
                cycle_timeout_secs: 30,
                call_timeout_secs: 5,
                reconcile_interval_secs: 14_400,
                max_concurrency: 4,
            },
        }
    }

    /// Envelope parameters for the engine.
    pub fn envelope_params(&self) -> EnvelopeParams {
        EnvelopeParams {
            stop_loss_mult: self.risk.stop_loss_mult,
            take_profit_mult: self.risk.take_profit_mult,
            trailing_mult: self.risk.trailing_mult,
        }
    }

    /// Executor configuration.
    pub fn executor_config(&self) -> ExecutorConfig {
        ExecutorConfig {
            retry: RetryPolicy {
                max_attempts: self.execution.max_retry_attempts,
                backoff_base: Duration::from_millis(self.execution.retry_backoff_ms),
            },
            min_order_value: self.execution.min_order_value,
            test_mode: self.execution.test_mode,
            test_order_cap: self.execution.test_order_cap,
        }
    }

    /// Reject configurations that would break envelope invariants.
    fn validate(&self) -> DaemonResult<()> {
        if self.risk.atr_window == 0 {
            return Err(DaemonError::Config("AEGIS_ATR_WINDOW must be >= 1".to_string()));
        }
        for (name, value) in [
            ("AEGIS_STOP_LOSS_MULT", self.risk.stop_loss_mult),
            ("AEGIS_TAKE_PROFIT_MULT", self.risk.take_profit_mult),
            ("AEGIS_TRAILING_MULT", self.risk.trailing_mult),
        ] {
            if value <= Decimal::ZERO {
                return Err(DaemonError::Config(format!("{} must be positive", name)));
            }
        }
        if self.monitor.max_concurrency == 0 {
            return Err(DaemonError::Config("AEGIS_MAX_CONCURRENCY must be >= 1".to_string()));
        }
        Ok(())
    }

    fn load_environment() -> DaemonResult<Environment> {
        let env_str = env::var("AEGIS_ENV").unwrap_or_else(|_| "development".to_string());

        match env_str.to_lowercase().as_str() {
            "test" => Ok(Environment::Test),
            "development" | "dev" => Ok(Environment::Development),
            "production" | "prod" => Ok(Environment::Production),
            other => Err(DaemonError::Config(format!(
                "Invalid AEGIS_ENV: {}. Expected: test, development, production",
                other
            ))),
        }
    }

    fn load_risk_params() -> DaemonResult<RiskParams> {
        Ok(RiskParams {
            atr_window: Self::load_usize_env("AEGIS_ATR_WINDOW", 14)?,
            entry_lookback: Self::load_usize_env("AEGIS_ENTRY_LOOKBACK", 3)?,
            stop_loss_mult: Self::load_decimal_env("AEGIS_STOP_LOSS_MULT", Decimal::TWO)?,
            take_profit_mult: Self::load_decimal_env("AEGIS_TAKE_PROFIT_MULT", Decimal::from(3))?,
            trailing_mult: Self::load_decimal_env("AEGIS_TRAILING_MULT", Decimal::new(15, 1))?,
            high_volatility_pct: Self::load_decimal_env(
                "AEGIS_HIGH_VOLATILITY_PCT",
                Decimal::from(8),
            )?,
            concentration_pct: Self::load_decimal_env(
                "AEGIS_CONCENTRATION_PCT",
                Decimal::from(10),
            )?,
            position_risk_cap: Self::load_decimal_env(
                "AEGIS_POSITION_RISK_CAP",
                Decimal::new(2, 2), // 2%
            )?,
        })
    }

    fn load_execution_params() -> DaemonResult<ExecutionParams> {
        // Default to capped orders: going live requires an explicit opt-out
        let test_mode = env::var("AEGIS_TEST_MODE")
            .map(|v| v.to_lowercase() == "true")
            .unwrap_or(true);

        Ok(ExecutionParams {
            max_retry_attempts: Self::load_u64_env("AEGIS_MAX_RETRY_ATTEMPTS", 3)? as u32,
            retry_backoff_ms: Self::load_u64_env("AEGIS_RETRY_BACKOFF_MS", 1000)?,
            min_order_value: Self::load_decimal_env(
                "AEGIS_MIN_ORDER_VALUE",
                Decimal::from(5000),
            )?,
            test_mode,
            test_order_cap: Self::load_decimal_env(
                "AEGIS_TEST_ORDER_CAP",
                Decimal::new(1, 3), // 0.001
            )?,
        })
    }

    fn load_monitor_params() -> DaemonResult<MonitorParams> {
        Ok(MonitorParams {
            cycle_interval_secs: Self::load_u64_env("AEGIS_CYCLE_INTERVAL_SECS", 3600)?,
            cycle_timeout_secs: Self::load_u64_env("AEGIS_CYCLE_TIMEOUT_SECS", 120)?,
            call_timeout_secs: Self::load_u64_env("AEGIS_CALL_TIMEOUT_SECS", 10)?,
            reconcile_interval_secs: Self::load_u64_env(
                "AEGIS_RECONCILE_INTERVAL_SECS",
                14_400, // 4 hours
            )?,
            max_concurrency: Self::load_usize_env("AEGIS_MAX_CONCURRENCY", 4)?,
        })
    }

    fn load_decimal_env(key: &str, default: Decimal) -> DaemonResult<Decimal> {
        match env::var(key) {
            Ok(val) => Decimal::from_str(&val)
                .map_err(|_| DaemonError::Config(format!("Invalid {} value: {}", key, val))),
            Err(_) => Ok(default),
        }
    }

    fn load_u64_env(key: &str, default: u64) -> DaemonResult<u64> {
        match env::var(key) {
            Ok(val) => val
                .parse::<u64>()
                .map_err(|_| DaemonError::Config(format!("Invalid {} value: {}", key, val))),
            Err(_) => Ok(default),
        }
    }

    fn load_usize_env(key: &str, default: usize) -> DaemonResult<usize> {
        match env::var(key) {
            Ok(val) => val
                .parse::<usize>()
                .map_err(|_| DaemonError::Config(format!("Invalid {} value: {}", key, val))),
            Err(_) => Ok(default),
        }
    }
}

impl Default for RiskParams {
    fn default() -> Self {
        Self {
            atr_window: 14,
            entry_lookback: 3,
            stop_loss_mult: Decimal::TWO,
            take_profit_mult: Decimal::from(3),
            trailing_mult: Decimal::new(15, 1), // 1.5
            high_volatility_pct: Decimal::from(8),
            concentration_pct: Decimal::from(10),
            position_risk_cap: Decimal::new(2, 2), // 2%
        }
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Test => write!(f, "test"),
            Environment::Development => write!(f, "development"),
            Environment::Production => write!(f, "production"),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_test_config() {
        let config = Config::test();

        assert_eq!(config.environment, Environment::Test);
        assert_eq!(config.quote_currency, "KRW");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_risk_defaults_match_envelope_multipliers() {
        let risk = RiskParams::default();

        assert_eq!(risk.atr_window, 14);
        assert_eq!(risk.stop_loss_mult, dec!(2));
        assert_eq!(risk.take_profit_mult, dec!(3));
        assert_eq!(risk.trailing_mult, dec!(1.5));
        assert_eq!(risk.high_volatility_pct, dec!(8));
        assert_eq!(risk.concentration_pct, dec!(10));
        assert_eq!(risk.position_risk_cap, dec!(0.02));
    }

    #[test]
    fn test_validate_rejects_zero_window() {
        let mut config = Config::test();
        config.risk.atr_window = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_non_positive_multiplier() {
        let mut config = Config::test();
        config.risk.stop_loss_mult = Decimal::ZERO;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_executor_config_carries_retry_policy() {
        let config = Config::test();
        let exec = config.executor_config();

        assert_eq!(exec.retry.max_attempts, 3);
        assert_eq!(exec.retry.backoff_base, Duration::from_millis(1));
        assert_eq!(exec.min_order_value, dec!(5000));
    }

    #[test]
    fn test_environment_display() {
        assert_eq!(Environment::Test.to_string(), "test");
        assert_eq!(Environment::Development.to_string(), "development");
        assert_eq!(Environment::Production.to_string(), "production");
    }
}
