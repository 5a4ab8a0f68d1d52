//! Per-pair aggregation of the latest quote from every exchange.
//!
//! The store is the single source of truth for current prices. For each
//! configured pair it holds at most one quote per configured exchange, the
//! all-time extremes with provenance, and the current low/high computed from
//! the quotes it still holds.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use spreadwatch_core::{AppConfig, ExchangeId, PairConfig, PairId, Quote};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;
use tracing::{debug, trace};

// =============================================================================
// Errors and Outcomes
// =============================================================================

/// Updates the store refuses outright.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    /// The pair is not part of the configuration.
    #[error("unknown pair: {0}")]
    UnknownPair(PairId),

    /// The exchange is not configured to quote this pair.
    #[error("{exchange} is not configured for {pair}")]
    UnconfiguredExchange { pair: PairId, exchange: ExchangeId },
}

/// What happened to an accepted update call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// The quote replaced the exchange's slot.
    Applied,
    /// A quote from a later-dispatched request is already held.
    Superseded,
    /// The quote was already older than the staleness window.
    Expired,
}

// =============================================================================
// Price Levels
// =============================================================================

/// An all-time extreme and where it was seen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Extreme {
    pub value: Decimal,
    pub observed_at: DateTime<Utc>,
    pub exchange: ExchangeId,
}

/// A current low or high among the held quotes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Level {
    pub value: Decimal,
    pub exchange: ExchangeId,
}

#[derive(Debug, Clone, Copy)]
struct HeldQuote {
    quote: Quote,
    dispatched_at: DateTime<Utc>,
}

/// A quote removed by the staleness sweep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StalePurge {
    pub pair: PairId,
    pub exchange: ExchangeId,
    pub observed_at: DateTime<Utc>,
}

// =============================================================================
// Trading Pair
// =============================================================================

/// Aggregated state of one pair across its exchanges.
#[derive(Debug, Clone)]
pub struct TradingPair {
    pair: PairId,
    exchanges: BTreeSet<ExchangeId>,
    threshold: Decimal,
    min_gain: Decimal,
    quotes: BTreeMap<ExchangeId, HeldQuote>,
    lowest_ever: Option<Extreme>,
    highest_ever: Option<Extreme>,
    current_low: Option<Level>,
    current_high: Option<Level>,
    pub(crate) threshold_active: bool,
    pub(crate) last_notified_at: Option<DateTime<Utc>>,
}

impl TradingPair {
    #[must_use]
    pub fn new(config: &PairConfig) -> Self {
        Self {
            pair: config.symbol.clone(),
            exchanges: config.exchanges.iter().copied().collect(),
            threshold: config.threshold,
            min_gain: config.min_gain,
            quotes: BTreeMap::new(),
            lowest_ever: None,
            highest_ever: None,
            current_low: None,
            current_high: None,
            threshold_active: false,
            last_notified_at: None,
        }
    }

    #[must_use]
    pub fn pair(&self) -> &PairId {
        &self.pair
    }

    #[must_use]
    pub fn threshold(&self) -> Decimal {
        self.threshold
    }

    #[must_use]
    pub fn min_gain(&self) -> Decimal {
        self.min_gain
    }

    #[must_use]
    pub fn quote_count(&self) -> usize {
        self.quotes.len()
    }

    #[must_use]
    pub fn quote(&self, exchange: ExchangeId) -> Option<&Quote> {
        self.quotes.get(&exchange).map(|held| &held.quote)
    }

    #[must_use]
    pub fn current_low(&self) -> Option<Level> {
        self.current_low
    }

    #[must_use]
    pub fn current_high(&self) -> Option<Level> {
        self.current_high
    }

    /// `current_high - current_low`; `None` while no quote is held.
    #[must_use]
    pub fn spread(&self) -> Option<Decimal> {
        match (self.current_high, self.current_low) {
            (Some(high), Some(low)) => Some(high.value - low.value),
            _ => None,
        }
    }

    fn apply(&mut self, exchange: ExchangeId, quote: Quote, dispatched_at: DateTime<Utc>) {
        self.quotes.insert(
            exchange,
            HeldQuote {
                quote,
                dispatched_at,
            },
        );

        let candidate = Extreme {
            value: quote.value,
            observed_at: quote.observed_at,
            exchange,
        };
        if self.highest_ever.map_or(true, |high| quote.value > high.value) {
            self.highest_ever = Some(candidate);
        }
        if self.lowest_ever.map_or(true, |low| quote.value < low.value) {
            self.lowest_ever = Some(candidate);
        }

        self.recompute();
    }

    /// Rebuilds current low/high from held quotes. Ties keep the first
    /// exchange in id order.
    fn recompute(&mut self) {
        let mut low: Option<Level> = None;
        let mut high: Option<Level> = None;

        for (exchange, held) in &self.quotes {
            let level = Level {
                value: held.quote.value,
                exchange: *exchange,
            };
            if low.map_or(true, |l| level.value < l.value) {
                low = Some(level);
            }
            if high.map_or(true, |h| level.value > h.value) {
                high = Some(level);
            }
        }

        self.current_low = low;
        self.current_high = high;
    }

    fn evict_older_than(&mut self, cutoff: DateTime<Utc>) -> Vec<(ExchangeId, DateTime<Utc>)> {
        let stale: Vec<(ExchangeId, DateTime<Utc>)> = self
            .quotes
            .iter()
            .filter(|(_, held)| held.quote.observed_at < cutoff)
            .map(|(exchange, held)| (*exchange, held.quote.observed_at))
            .collect();

        if !stale.is_empty() {
            for (exchange, _) in &stale {
                self.quotes.remove(exchange);
            }
            self.recompute();
            self.threshold_active = self.threshold_active
                && self.quotes.len() >= 2
                && self.spread().is_some_and(|spread| spread >= self.threshold);
        }
        stale
    }

    /// Read-only snapshot.
    #[must_use]
    pub fn view(&self) -> TradingPairView {
        TradingPairView {
            pair: self.pair.clone(),
            exchanges: self.exchanges.iter().copied().collect(),
            quotes: self
                .quotes
                .iter()
                .map(|(exchange, held)| (*exchange, held.quote))
                .collect(),
            lowest_ever: self.lowest_ever,
            highest_ever: self.highest_ever,
            current_low: self.current_low,
            current_high: self.current_high,
            spread: self.spread(),
            threshold: self.threshold,
            min_gain: self.min_gain,
            threshold_active: self.threshold_active,
            last_notified_at: self.last_notified_at,
        }
    }
}

/// Snapshot of a [`TradingPair`] handed to readers outside the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradingPairView {
    pub pair: PairId,
    pub exchanges: Vec<ExchangeId>,
    pub quotes: BTreeMap<ExchangeId, Quote>,
    pub lowest_ever: Option<Extreme>,
    pub highest_ever: Option<Extreme>,
    pub current_low: Option<Level>,
    pub current_high: Option<Level>,
    /// `None` means "no data".
    pub spread: Option<Decimal>,
    pub threshold: Decimal,
    pub min_gain: Decimal,
    pub threshold_active: bool,
    pub last_notified_at: Option<DateTime<Utc>>,
}

// =============================================================================
// Ticker Store
// =============================================================================

/// All configured pairs, keyed by symbol.
#[derive(Debug, Clone)]
pub struct TickerStore {
    pairs: BTreeMap<PairId, TradingPair>,
    staleness_window: Duration,
}

impl TickerStore {
    #[must_use]
    pub fn new(staleness_window: Duration) -> Self {
        Self {
            pairs: BTreeMap::new(),
            staleness_window,
        }
    }

    /// Creates a store holding every pair in the configuration.
    #[must_use]
    pub fn from_config(config: &AppConfig) -> Self {
        let mut store = Self::new(config.polling.staleness_window());
        for pair in &config.pairs {
            store.insert_pair(pair);
        }
        store
    }

    /// Adds (or resets) a pair.
    pub fn insert_pair(&mut self, config: &PairConfig) {
        self.pairs
            .insert(config.symbol.clone(), TradingPair::new(config));
    }

    #[must_use]
    pub fn staleness_window(&self) -> Duration {
        self.staleness_window
    }

    /// Stores `quote` as `exchange`'s latest for `pair`.
    ///
    /// Quotes dispatched before the one already held for the same slot are
    /// ignored, as are quotes already older than the staleness window.
    ///
    /// # Errors
    ///
    /// Returns an error if the pair is unknown or the exchange is not
    /// configured for it.
    pub fn update(
        &mut self,
        pair: &PairId,
        exchange: ExchangeId,
        quote: Quote,
        dispatched_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<UpdateOutcome, StoreError> {
        let window = self.staleness_window;
        let entry = self
            .pairs
            .get_mut(pair)
            .ok_or_else(|| StoreError::UnknownPair(pair.clone()))?;

        if !entry.exchanges.contains(&exchange) {
            return Err(StoreError::UnconfiguredExchange {
                pair: pair.clone(),
                exchange,
            });
        }

        let expired = now
            .checked_sub_signed(window)
            .is_some_and(|cutoff| quote.observed_at < cutoff);
        if expired {
            debug!(pair = %pair, exchange = %exchange, observed_at = %quote.observed_at, "Dropping expired quote");
            return Ok(UpdateOutcome::Expired);
        }

        if let Some(held) = entry.quotes.get(&exchange) {
            if dispatched_at < held.dispatched_at {
                debug!(
                    pair = %pair,
                    exchange = %exchange,
                    dispatched_at = %dispatched_at,
                    held_dispatched_at = %held.dispatched_at,
                    "Ignoring out-of-order quote"
                );
                return Ok(UpdateOutcome::Superseded);
            }
        }

        entry.apply(exchange, quote, dispatched_at);
        trace!(
            pair = %pair,
            exchange = %exchange,
            value = %quote.value,
            spread = ?entry.spread(),
            "Quote applied"
        );
        Ok(UpdateOutcome::Applied)
    }

    #[must_use]
    pub fn get(&self, pair: &PairId) -> Option<TradingPairView> {
        self.pairs.get(pair).map(TradingPair::view)
    }

    #[must_use]
    pub fn pair(&self, pair: &PairId) -> Option<&TradingPair> {
        self.pairs.get(pair)
    }

    pub(crate) fn pair_mut(&mut self, pair: &PairId) -> Option<&mut TradingPair> {
        self.pairs.get_mut(pair)
    }

    /// Snapshots of every pair, in symbol order.
    #[must_use]
    pub fn views(&self) -> Vec<TradingPairView> {
        self.pairs.values().map(TradingPair::view).collect()
    }

    pub fn pair_ids(&self) -> impl Iterator<Item = &PairId> {
        self.pairs.keys()
    }

    /// Current quotes of every pair that holds at least one.
    #[must_use]
    pub fn quotes(&self) -> BTreeMap<PairId, BTreeMap<ExchangeId, Quote>> {
        self.pairs
            .iter()
            .filter(|(_, entry)| !entry.quotes.is_empty())
            .map(|(pair, entry)| {
                let quotes = entry
                    .quotes
                    .iter()
                    .map(|(exchange, held)| (*exchange, held.quote))
                    .collect();
                (pair.clone(), quotes)
            })
            .collect()
    }

    /// Drops every quote observed before `now - staleness_window`.
    /// A window reaching past the earliest representable time purges nothing.
    pub fn evict_stale(&mut self, now: DateTime<Utc>) -> Vec<StalePurge> {
        let Some(cutoff) = now.checked_sub_signed(self.staleness_window) else {
            return Vec::new();
        };
        let mut purged = Vec::new();

        for (pair, entry) in &mut self.pairs {
            for (exchange, observed_at) in entry.evict_older_than(cutoff) {
                purged.push(StalePurge {
                    pair: pair.clone(),
                    exchange,
                    observed_at,
                });
            }
        }
        purged
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn pair_config(exchanges: &[ExchangeId]) -> PairConfig {
        PairConfig {
            symbol: PairId::new("ETHBTC"),
            exchanges: exchanges.to_vec(),
            threshold: dec!(0.0003),
            min_gain: dec!(0.001),
        }
    }

    fn store() -> TickerStore {
        let mut store = TickerStore::new(Duration::hours(1));
        store.insert_pair(&pair_config(&[
            ExchangeId::Kraken,
            ExchangeId::Bittrex,
            ExchangeId::Bitfinex,
        ]));
        store
    }

    fn quote(value: Decimal, at: DateTime<Utc>) -> Quote {
        Quote::new(value, Decimal::ZERO, at)
    }

    fn ethbtc() -> PairId {
        PairId::new("ETHBTC")
    }

    #[test]
    fn test_empty_pair_has_no_spread() {
        let store = store();
        let view = store.get(&ethbtc()).unwrap();
        assert!(view.spread.is_none());
        assert!(view.current_low.is_none());
        assert!(view.quotes.is_empty());
    }

    #[test]
    fn test_three_exchange_aggregation() {
        let mut store = store();
        let now = Utc::now();
        for (exchange, value) in [
            (ExchangeId::Kraken, dec!(0.0310)),
            (ExchangeId::Bittrex, dec!(0.0312)),
            (ExchangeId::Bitfinex, dec!(0.0305)),
        ] {
            let outcome = store
                .update(&ethbtc(), exchange, quote(value, now), now, now)
                .unwrap();
            assert_eq!(outcome, UpdateOutcome::Applied);
        }

        let view = store.get(&ethbtc()).unwrap();
        assert_eq!(
            view.current_low,
            Some(Level {
                value: dec!(0.0305),
                exchange: ExchangeId::Bitfinex
            })
        );
        assert_eq!(
            view.current_high,
            Some(Level {
                value: dec!(0.0312),
                exchange: ExchangeId::Bittrex
            })
        );
        assert_eq!(view.spread, Some(dec!(0.0007)));
    }

    #[test]
    fn test_single_exchange_spread_is_zero() {
        let mut store = store();
        let now = Utc::now();
        store
            .update(&ethbtc(), ExchangeId::Kraken, quote(dec!(0.031), now), now, now)
            .unwrap();
        assert_eq!(store.get(&ethbtc()).unwrap().spread, Some(Decimal::ZERO));
    }

    #[test]
    fn test_low_high_follow_replacement() {
        let mut store = store();
        let now = Utc::now();
        store
            .update(&ethbtc(), ExchangeId::Kraken, quote(dec!(0.0300), now), now, now)
            .unwrap();
        store
            .update(&ethbtc(), ExchangeId::Bittrex, quote(dec!(0.0320), now), now, now)
            .unwrap();

        // Kraken moves above Bittrex: low and high swap exchanges.
        let later = now + Duration::seconds(5);
        store
            .update(&ethbtc(), ExchangeId::Kraken, quote(dec!(0.0330), later), later, later)
            .unwrap();

        let view = store.get(&ethbtc()).unwrap();
        assert_eq!(view.current_low.unwrap().exchange, ExchangeId::Bittrex);
        assert_eq!(view.current_high.unwrap().exchange, ExchangeId::Kraken);
        assert_eq!(view.spread, Some(dec!(0.0010)));
    }

    #[test]
    fn test_extrema_are_monotonic() {
        let mut store = store();
        let start = Utc::now();
        let values = [
            dec!(0.0310),
            dec!(0.0290),
            dec!(0.0330),
            dec!(0.0300),
            dec!(0.0330),
            dec!(0.0280),
        ];

        let mut last_high = None;
        let mut last_low = None;
        for (i, value) in values.into_iter().enumerate() {
            let at = start + Duration::seconds(i as i64);
            store
                .update(&ethbtc(), ExchangeId::Kraken, quote(value, at), at, at)
                .unwrap();
            let view = store.get(&ethbtc()).unwrap();
            let high = view.highest_ever.unwrap();
            let low = view.lowest_ever.unwrap();
            if let Some(prev) = last_high {
                assert!(high.value >= prev);
            }
            if let Some(prev) = last_low {
                assert!(low.value <= prev);
            }
            last_high = Some(high.value);
            last_low = Some(low.value);
        }

        let view = store.get(&ethbtc()).unwrap();
        let high = view.highest_ever.unwrap();
        assert_eq!(high.value, dec!(0.0330));
        // Equal value later does not replace the provenance.
        assert_eq!(high.observed_at, start + Duration::seconds(2));
        assert_eq!(view.lowest_ever.unwrap().value, dec!(0.0280));
    }

    #[test]
    fn test_extrema_survive_eviction() {
        let mut store = store();
        let then = Utc::now() - Duration::minutes(90);
        store
            .update(&ethbtc(), ExchangeId::Kraken, quote(dec!(0.05), then), then, then)
            .unwrap();

        let purged = store.evict_stale(Utc::now());
        assert_eq!(purged.len(), 1);

        let view = store.get(&ethbtc()).unwrap();
        assert!(view.spread.is_none());
        assert_eq!(view.highest_ever.unwrap().value, dec!(0.05));
    }

    #[test]
    fn test_sweep_excludes_stale_quotes() {
        let mut store = store();
        let now = Utc::now();
        let old = now - Duration::minutes(59);
        store
            .update(&ethbtc(), ExchangeId::Kraken, quote(dec!(0.0400), old), old, now)
            .unwrap();
        store
            .update(&ethbtc(), ExchangeId::Bittrex, quote(dec!(0.0310), now), now, now)
            .unwrap();
        assert_eq!(store.get(&ethbtc()).unwrap().spread, Some(dec!(0.0090)));

        // Two minutes later the Kraken quote is past the window.
        let sweep_at = now + Duration::minutes(2);
        let purged = store.evict_stale(sweep_at);
        assert_eq!(
            purged,
            vec![StalePurge {
                pair: ethbtc(),
                exchange: ExchangeId::Kraken,
                observed_at: old,
            }]
        );

        let view = store.get(&ethbtc()).unwrap();
        assert_eq!(view.spread, Some(Decimal::ZERO));
        assert_eq!(view.current_high.unwrap().exchange, ExchangeId::Bittrex);
        assert!(!view.quotes.contains_key(&ExchangeId::Kraken));
    }

    #[test]
    fn test_out_of_order_update_is_rejected() {
        let mut store = store();
        let now = Utc::now();
        let earlier = now - Duration::seconds(3);

        store
            .update(&ethbtc(), ExchangeId::Kraken, quote(dec!(0.0312), now), now, now)
            .unwrap();
        let outcome = store
            .update(&ethbtc(), ExchangeId::Kraken, quote(dec!(0.0290), earlier), earlier, now)
            .unwrap();

        assert_eq!(outcome, UpdateOutcome::Superseded);
        let view = store.get(&ethbtc()).unwrap();
        assert_eq!(view.quotes[&ExchangeId::Kraken].value, dec!(0.0312));
        assert_eq!(view.lowest_ever.unwrap().value, dec!(0.0312));
    }

    #[test]
    fn test_expired_quote_is_not_stored() {
        let mut store = store();
        let now = Utc::now();
        let ancient = now - Duration::hours(2);
        let outcome = store
            .update(&ethbtc(), ExchangeId::Kraken, quote(dec!(0.03), ancient), now, now)
            .unwrap();
        assert_eq!(outcome, UpdateOutcome::Expired);
        assert!(store.get(&ethbtc()).unwrap().quotes.is_empty());
    }

    #[test]
    fn test_unbounded_window_keeps_quotes_without_panicking() {
        let mut store = TickerStore::new(Duration::MAX);
        store.insert_pair(&pair_config(&[ExchangeId::Kraken, ExchangeId::Bittrex]));
        let now = Utc::now();
        let old = now - Duration::days(400);

        let outcome = store
            .update(&ethbtc(), ExchangeId::Kraken, quote(dec!(0.0310), old), now, now)
            .unwrap();
        assert_eq!(outcome, UpdateOutcome::Applied);

        assert!(store.evict_stale(now).is_empty());
        assert_eq!(store.get(&ethbtc()).unwrap().quotes.len(), 1);
    }

    #[test]
    fn test_unknown_pair_and_exchange() {
        let mut store = store();
        let now = Utc::now();
        let err = store
            .update(&PairId::new("LTCBTC"), ExchangeId::Kraken, quote(dec!(1), now), now, now)
            .unwrap_err();
        assert_eq!(err, StoreError::UnknownPair(PairId::new("LTCBTC")));

        let err = store
            .update(&ethbtc(), ExchangeId::Coinbase, quote(dec!(1), now), now, now)
            .unwrap_err();
        assert!(matches!(err, StoreError::UnconfiguredExchange { .. }));
    }

    #[test]
    fn test_low_high_match_held_quotes_over_sequence() {
        let mut store = store();
        let exchanges = [ExchangeId::Kraken, ExchangeId::Bittrex, ExchangeId::Bitfinex];
        let start = Utc::now();
        let mut seed: u64 = 7;

        for step in 0..200_i64 {
            seed = seed.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1);
            let exchange = exchanges[(seed >> 33) as usize % exchanges.len()];
            let value = Decimal::new(300 + (seed >> 40) as i64 % 50, 4);
            let at = start + Duration::seconds(step);
            store
                .update(&ethbtc(), exchange, quote(value, at), at, at)
                .unwrap();

            let view = store.get(&ethbtc()).unwrap();
            let min = view.quotes.values().map(|q| q.value).min().unwrap();
            let max = view.quotes.values().map(|q| q.value).max().unwrap();
            let low = view.current_low.unwrap();
            let high = view.current_high.unwrap();
            assert_eq!(low.value, min);
            assert_eq!(high.value, max);
            assert!(high.value >= low.value);
            assert_eq!(view.quotes[&low.exchange].value, min);
            assert_eq!(view.quotes[&high.exchange].value, max);
        }
    }

    #[test]
    fn test_quotes_snapshot_skips_empty_pairs() {
        let mut store = store();
        let mut ltc = pair_config(&[ExchangeId::Kraken]);
        ltc.symbol = PairId::new("LTCBTC");
        store.insert_pair(&ltc);

        let now = Utc::now();
        store
            .update(&ethbtc(), ExchangeId::Kraken, quote(dec!(0.031), now), now, now)
            .unwrap();

        let quotes = store.quotes();
        assert_eq!(quotes.len(), 1);
        assert!(quotes.contains_key(&ethbtc()));
        assert_eq!(store.views().len(), 2);
    }
}
