//! Threshold detection with per-pair notification debounce.

use chrono::{DateTime, Duration, Utc};
use spreadwatch_core::{PollingConfig, SpreadNotification};
use tracing::{info, trace};

use crate::ticker_store::TradingPair;

/// Decides when a pair's spread is worth surfacing.
#[derive(Debug, Clone, Copy)]
pub struct SpreadEvaluator {
    debounce_window: Duration,
}

impl SpreadEvaluator {
    #[must_use]
    pub fn new(debounce_window: Duration) -> Self {
        Self { debounce_window }
    }

    #[must_use]
    pub fn from_config(config: &PollingConfig) -> Self {
        Self::new(config.debounce_window())
    }

    #[must_use]
    pub fn debounce_window(&self) -> Duration {
        self.debounce_window
    }

    /// Re-evaluates `pair` after an update.
    ///
    /// Emits a notification when the spread between two distinct exchanges
    /// reaches the pair's threshold and the previous notification for the
    /// pair is at least one debounce window old.
    pub fn evaluate(&self, pair: &mut TradingPair, now: DateTime<Utc>) -> Option<SpreadNotification> {
        let (high, low) = match (pair.current_high(), pair.current_low()) {
            (Some(high), Some(low)) if pair.quote_count() >= 2 => (high, low),
            _ => {
                pair.threshold_active = false;
                return None;
            }
        };

        let spread = high.value - low.value;
        pair.threshold_active = spread >= pair.threshold();
        if !pair.threshold_active {
            return None;
        }

        if let Some(last) = pair.last_notified_at {
            if now - last < self.debounce_window {
                trace!(
                    pair = %pair.pair(),
                    spread = %spread,
                    last_notified_at = %last,
                    "Spread above threshold, notification debounced"
                );
                return None;
            }
        }

        pair.last_notified_at = Some(now);
        let notification = SpreadNotification {
            pair: pair.pair().clone(),
            high_exchange: high.exchange,
            low_exchange: low.exchange,
            spread,
            timestamp: now,
        };

        info!(
            pair = %notification.pair,
            high_exchange = %notification.high_exchange,
            low_exchange = %notification.low_exchange,
            spread = %notification.spread,
            threshold = %pair.threshold(),
            "Spread threshold crossed"
        );
        Some(notification)
    }
}

impl Default for SpreadEvaluator {
    fn default() -> Self {
        Self::from_config(&PollingConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ticker_store::TickerStore;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use spreadwatch_core::{ExchangeId, PairConfig, PairId, Quote};

    fn ethbtc() -> PairId {
        PairId::new("ETHBTC")
    }

    fn store(threshold: Decimal) -> TickerStore {
        let mut store = TickerStore::new(Duration::hours(1));
        store.insert_pair(&PairConfig {
            symbol: ethbtc(),
            exchanges: vec![ExchangeId::Kraken, ExchangeId::Bittrex, ExchangeId::Bitfinex],
            threshold,
            min_gain: dec!(0.001),
        });
        store
    }

    fn push(store: &mut TickerStore, exchange: ExchangeId, value: Decimal, at: DateTime<Utc>) {
        store
            .update(&ethbtc(), exchange, Quote::new(value, Decimal::ZERO, at), at, at)
            .unwrap();
    }

    fn evaluate(
        evaluator: &SpreadEvaluator,
        store: &mut TickerStore,
        now: DateTime<Utc>,
    ) -> Option<SpreadNotification> {
        evaluator.evaluate(store.pair_mut(&ethbtc()).unwrap(), now)
    }

    #[test]
    fn test_below_threshold_does_not_fire() {
        let evaluator = SpreadEvaluator::new(Duration::minutes(5));
        let mut store = store(dec!(0.001));
        let now = Utc::now();
        push(&mut store, ExchangeId::Kraken, dec!(0.0310), now);
        push(&mut store, ExchangeId::Bittrex, dec!(0.0312), now);

        assert!(evaluate(&evaluator, &mut store, now).is_none());
        assert!(!store.get(&ethbtc()).unwrap().threshold_active);
    }

    #[test]
    fn test_single_exchange_never_fires() {
        let evaluator = SpreadEvaluator::new(Duration::minutes(5));
        let mut store = store(Decimal::ZERO);
        let now = Utc::now();
        push(&mut store, ExchangeId::Kraken, dec!(0.0310), now);

        assert!(evaluate(&evaluator, &mut store, now).is_none());
    }

    #[test]
    fn test_fires_once_per_debounce_window() {
        let evaluator = SpreadEvaluator::new(Duration::minutes(5));
        let mut store = store(dec!(0.0003));
        let start = Utc::now();

        push(&mut store, ExchangeId::Kraken, dec!(0.0310), start);
        assert!(evaluate(&evaluator, &mut store, start).is_none());
        push(&mut store, ExchangeId::Bittrex, dec!(0.0312), start);
        assert!(evaluate(&evaluator, &mut store, start).is_none());
        push(&mut store, ExchangeId::Bitfinex, dec!(0.0305), start);
        let first = evaluate(&evaluator, &mut store, start).unwrap();
        assert_eq!(first.spread, dec!(0.0007));

        let view = store.get(&ethbtc()).unwrap();
        assert!(view.threshold_active);
        assert_eq!(view.last_notified_at, Some(start));

        // Updates inside the window keep the spread above threshold but stay quiet.
        for minute in 1..5 {
            let at = start + Duration::minutes(minute);
            push(&mut store, ExchangeId::Bittrex, dec!(0.0312), at);
            assert!(evaluate(&evaluator, &mut store, at).is_none());
        }

        let after = start + Duration::minutes(5);
        push(&mut store, ExchangeId::Bittrex, dec!(0.0312), after);
        let second = evaluate(&evaluator, &mut store, after).unwrap();
        assert_eq!(second.timestamp - first.timestamp, Duration::minutes(5));
        assert_eq!(second.high_exchange, ExchangeId::Bittrex);
        assert_eq!(second.low_exchange, ExchangeId::Bitfinex);
        assert_eq!(second.spread, dec!(0.0007));
    }

    #[test]
    fn test_notifications_never_closer_than_window() {
        let evaluator = SpreadEvaluator::new(Duration::seconds(30));
        let mut store = store(dec!(0.0001));
        let start = Utc::now();
        push(&mut store, ExchangeId::Kraken, dec!(0.0300), start);

        let mut fired = Vec::new();
        for second in 0..300 {
            let at = start + Duration::seconds(second);
            let value = if second % 2 == 0 { dec!(0.0310) } else { dec!(0.0302) };
            push(&mut store, ExchangeId::Bittrex, value, at);
            if let Some(n) = evaluate(&evaluator, &mut store, at) {
                fired.push(n.timestamp);
            }
        }

        assert!(fired.len() >= 2);
        for pair in fired.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::seconds(30));
        }
    }

    #[test]
    fn test_dropping_below_threshold_clears_active_flag() {
        let evaluator = SpreadEvaluator::new(Duration::minutes(5));
        let mut store = store(dec!(0.0003));
        let now = Utc::now();
        push(&mut store, ExchangeId::Kraken, dec!(0.0305), now);
        push(&mut store, ExchangeId::Bittrex, dec!(0.0312), now);
        assert!(evaluate(&evaluator, &mut store, now).is_some());

        let later = now + Duration::seconds(1);
        push(&mut store, ExchangeId::Bittrex, dec!(0.0306), later);
        assert!(evaluate(&evaluator, &mut store, later).is_none());
        assert!(!store.get(&ethbtc()).unwrap().threshold_active);
    }
}
