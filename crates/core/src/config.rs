use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::time::Duration;

use crate::error::ConfigError;
use crate::types::{ExchangeId, PairId};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub polling: PollingConfig,
    #[serde(default)]
    pub rotation: RotationConfig,
    #[serde(default)]
    pub exchanges: BTreeMap<ExchangeId, ExchangeConfig>,
    #[serde(default)]
    pub pairs: Vec<PairConfig>,
}

/// Global timing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    /// How often each exchange queue is refilled.
    pub refill_interval_ms: u64,
    /// How often one queued pair is fetched per exchange.
    pub drain_interval_ms: u64,
    /// Upper bound on a single fetch.
    pub fetch_timeout_ms: u64,
    /// Quotes older than this are purged from aggregation.
    pub staleness_window_secs: u64,
    /// Period of the staleness sweep.
    pub sweep_interval_secs: u64,
    /// Minimum time between two notifications for one pair.
    pub debounce_window_secs: u64,
    /// Period of the snapshot archive.
    pub archive_interval_secs: u64,
    /// Maximum archived snapshots held in memory.
    pub archive_capacity: usize,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            refill_interval_ms: 5_000,
            drain_interval_ms: 1_000,
            fetch_timeout_ms: 5_000,
            staleness_window_secs: 3_600,
            sweep_interval_secs: 60,
            debounce_window_secs: 300,
            archive_interval_secs: 10,
            archive_capacity: 18_000,
        }
    }
}

impl PollingConfig {
    #[must_use]
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    #[must_use]
    pub fn staleness_window(&self) -> chrono::Duration {
        secs_to_chrono(self.staleness_window_secs)
    }

    #[must_use]
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    #[must_use]
    pub fn debounce_window(&self) -> chrono::Duration {
        secs_to_chrono(self.debounce_window_secs)
    }

    #[must_use]
    pub fn archive_interval(&self) -> Duration {
        Duration::from_secs(self.archive_interval_secs)
    }
}

/// Longest accepted window or second-based interval (one year).
pub const MAX_WINDOW_SECS: u64 = 365 * 24 * 3_600;

/// Longest accepted interval or timeout in milliseconds (one day).
pub const MAX_INTERVAL_MS: u64 = 24 * 3_600 * 1_000;

fn secs_to_chrono(secs: u64) -> chrono::Duration {
    i64::try_from(secs)
        .ok()
        .and_then(chrono::Duration::try_seconds)
        .unwrap_or(chrono::Duration::MAX)
}

/// Order in which withdrawal fees and conversions are applied during a rotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RotationOrdering {
    /// `(((a - fee_high) / rate_low) - fee_low) * rate_high`
    ///
    /// The default: its closed form is the documented minimum-investment
    /// formula. Pick [`Self::ConvertThenWithdraw`] to charge the quote fee
    /// after conversion instead.
    #[default]
    #[serde(alias = "a")]
    WithdrawThenConvert,
    /// `((a / rate_low) - fee_low) * rate_high - fee_high`
    #[serde(alias = "b")]
    ConvertThenWithdraw,
    /// `((a - fee_low) * rate_high - fee_high) / rate_low`
    #[serde(alias = "c")]
    LowFeeFirst,
    /// `((a * rate_high) - fee_high) / rate_low - fee_low`
    #[serde(alias = "d")]
    HighRateFirst,
}

impl std::str::FromStr for RotationOrdering {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "a" | "withdraw_then_convert" => Ok(Self::WithdrawThenConvert),
            "b" | "convert_then_withdraw" => Ok(Self::ConvertThenWithdraw),
            "c" | "low_fee_first" => Ok(Self::LowFeeFirst),
            "d" | "high_rate_first" => Ok(Self::HighRateFirst),
            other => Err(ConfigError::invalid(
                "rotation.ordering",
                format!("unknown ordering '{other}'"),
            )),
        }
    }
}

/// Settings for the rotation estimator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RotationConfig {
    pub ordering: RotationOrdering,
    /// Grid step of the reference scan solver.
    pub scan_step: Decimal,
    /// Iteration cap shared by the scan and bisection solvers.
    pub max_iterations: u32,
}

impl Default for RotationConfig {
    fn default() -> Self {
        Self {
            ordering: RotationOrdering::default(),
            scan_step: dec!(0.005),
            max_iterations: 1_000_000,
        }
    }
}

/// Per-exchange overrides.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExchangeConfig {
    pub enabled: bool,
    pub base_url: Option<String>,
    pub refill_interval_ms: Option<u64>,
    pub drain_interval_ms: Option<u64>,
    pub requests_per_minute: Option<u32>,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: None,
            refill_interval_ms: None,
            drain_interval_ms: None,
            requests_per_minute: None,
        }
    }
}

/// Resolved pacing for one exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExchangeSchedule {
    pub refill_interval: Duration,
    pub drain_interval: Duration,
    pub fetch_timeout: Duration,
}

/// One monitored trading pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairConfig {
    pub symbol: PairId,
    pub exchanges: Vec<ExchangeId>,
    /// Absolute spread, in quote-currency units, that triggers a notification.
    pub threshold: Decimal,
    /// Minimum gain targeted by the rotation estimator, in quote-currency units.
    #[serde(default = "default_min_gain")]
    pub min_gain: Decimal,
}

fn default_min_gain() -> Decimal {
    dec!(0.001)
}

impl AppConfig {
    /// Exchange overrides, or defaults when the exchange has no section.
    #[must_use]
    pub fn exchange(&self, id: ExchangeId) -> ExchangeConfig {
        self.exchanges.get(&id).cloned().unwrap_or_default()
    }

    /// Refill/drain/timeout for `id` with overrides applied.
    #[must_use]
    pub fn schedule_for(&self, id: ExchangeId) -> ExchangeSchedule {
        let overrides = self.exchange(id);
        ExchangeSchedule {
            refill_interval: Duration::from_millis(
                overrides
                    .refill_interval_ms
                    .unwrap_or(self.polling.refill_interval_ms),
            ),
            drain_interval: Duration::from_millis(
                overrides
                    .drain_interval_ms
                    .or_else(|| id.default_drain_interval_ms())
                    .unwrap_or(self.polling.drain_interval_ms),
            ),
            fetch_timeout: self.polling.fetch_timeout(),
        }
    }

    /// Exchanges referenced by at least one pair.
    #[must_use]
    pub fn active_exchanges(&self) -> BTreeSet<ExchangeId> {
        self.pairs
            .iter()
            .flat_map(|pair| pair.exchanges.iter().copied())
            .collect()
    }

    /// Pairs an exchange is configured to quote, in configuration order.
    #[must_use]
    pub fn pairs_for(&self, id: ExchangeId) -> Vec<PairId> {
        self.pairs
            .iter()
            .filter(|pair| pair.exchanges.contains(&id))
            .map(|pair| pair.symbol.clone())
            .collect()
    }

    /// Rejects configurations the engine cannot run with.
    ///
    /// # Errors
    ///
    /// Returns the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let polling = &self.polling;
        for (field, value) in [
            ("polling.refill_interval_ms", polling.refill_interval_ms),
            ("polling.drain_interval_ms", polling.drain_interval_ms),
            ("polling.fetch_timeout_ms", polling.fetch_timeout_ms),
            ("polling.staleness_window_secs", polling.staleness_window_secs),
            ("polling.sweep_interval_secs", polling.sweep_interval_secs),
            ("polling.archive_interval_secs", polling.archive_interval_secs),
        ] {
            if value == 0 {
                return Err(ConfigError::invalid(field, "must be positive"));
            }
        }

        for (field, value) in [
            ("polling.refill_interval_ms", polling.refill_interval_ms),
            ("polling.drain_interval_ms", polling.drain_interval_ms),
            ("polling.fetch_timeout_ms", polling.fetch_timeout_ms),
        ] {
            if value > MAX_INTERVAL_MS {
                return Err(ConfigError::invalid(
                    field,
                    format!("must not exceed {MAX_INTERVAL_MS}"),
                ));
            }
        }
        for (field, value) in [
            ("polling.staleness_window_secs", polling.staleness_window_secs),
            ("polling.sweep_interval_secs", polling.sweep_interval_secs),
            ("polling.debounce_window_secs", polling.debounce_window_secs),
            ("polling.archive_interval_secs", polling.archive_interval_secs),
        ] {
            if value > MAX_WINDOW_SECS {
                return Err(ConfigError::invalid(
                    field,
                    format!("must not exceed {MAX_WINDOW_SECS}"),
                ));
            }
        }

        if self.rotation.scan_step <= Decimal::ZERO {
            return Err(ConfigError::invalid("rotation.scan_step", "must be positive"));
        }
        if self.rotation.max_iterations == 0 {
            return Err(ConfigError::invalid("rotation.max_iterations", "must be positive"));
        }

        for (id, overrides) in &self.exchanges {
            if overrides.refill_interval_ms == Some(0) || overrides.drain_interval_ms == Some(0) {
                return Err(ConfigError::invalid(
                    format!("exchanges.{id}"),
                    "intervals must be positive",
                ));
            }
            let longest = overrides.refill_interval_ms.max(overrides.drain_interval_ms);
            if longest > Some(MAX_INTERVAL_MS) {
                return Err(ConfigError::invalid(
                    format!("exchanges.{id}"),
                    format!("intervals must not exceed {MAX_INTERVAL_MS}"),
                ));
            }
            if overrides.requests_per_minute == Some(0) {
                return Err(ConfigError::invalid(
                    format!("exchanges.{id}.requests_per_minute"),
                    "must be positive",
                ));
            }
        }

        if self.pairs.is_empty() {
            return Err(ConfigError::invalid("pairs", "at least one pair is required"));
        }

        let mut seen = HashSet::new();
        for pair in &self.pairs {
            if !seen.insert(pair.symbol.clone()) {
                return Err(ConfigError::DuplicatePair(pair.symbol.clone()));
            }
            if pair.exchanges.is_empty() {
                return Err(ConfigError::NoExchanges(pair.symbol.clone()));
            }
            if pair.symbol.split().is_none() {
                return Err(ConfigError::UnsplittablePair(pair.symbol.clone()));
            }
            if pair.threshold < Decimal::ZERO {
                return Err(ConfigError::invalid(
                    format!("pairs.{}.threshold", pair.symbol),
                    "must not be negative",
                ));
            }
            if pair.min_gain < Decimal::ZERO {
                return Err(ConfigError::invalid(
                    format!("pairs.{}.min_gain", pair.symbol),
                    "must not be negative",
                ));
            }
            if let Some(disabled) = pair
                .exchanges
                .iter()
                .find(|id| !self.exchange(**id).enabled)
            {
                return Err(ConfigError::invalid(
                    format!("pairs.{}.exchanges", pair.symbol),
                    format!("{disabled} is disabled"),
                ));
            }
        }

        Ok(())
    }
}
