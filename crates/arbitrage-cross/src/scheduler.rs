//! Per-exchange polling with a de-duplicated work queue.
//!
//! Each exchange gets its own [`PollScheduler`] task. A refill tick enqueues
//! every pair configured for the exchange that is not already queued; a drain
//! tick pops one pair and fetches it. Because the drain awaits its fetch, an
//! exchange never has more than one request in flight and never more than one
//! queued entry per pair.
//!
//! Failed fetches are logged and dropped. The next refill puts the pair back,
//! so the retry rate of a failing pair is bounded by the refill period.

use chrono::Utc;
use spreadwatch_core::{
    AppConfig, ExchangeAdapter, ExchangeError, ExchangeId, ExchangeSchedule, PairId, QuoteUpdate,
};
use std::collections::{BTreeSet, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, trace, warn};

// =============================================================================
// Poll Queue
// =============================================================================

/// FIFO of pairs waiting to be fetched from one exchange.
#[derive(Debug, Clone)]
pub struct PollQueue {
    exchange: ExchangeId,
    entries: VecDeque<PairId>,
    queued: HashSet<PairId>,
}

impl PollQueue {
    #[must_use]
    pub fn new(exchange: ExchangeId) -> Self {
        Self {
            exchange,
            entries: VecDeque::new(),
            queued: HashSet::new(),
        }
    }

    #[must_use]
    pub fn exchange(&self) -> ExchangeId {
        self.exchange
    }

    /// Enqueues every pair not already waiting. Returns how many were added.
    pub fn refill(&mut self, pairs: &[PairId]) -> usize {
        let mut added = 0;
        for pair in pairs {
            if self.queued.insert(pair.clone()) {
                self.entries.push_back(pair.clone());
                added += 1;
            }
        }
        added
    }

    pub fn pop(&mut self) -> Option<PairId> {
        let pair = self.entries.pop_front()?;
        self.queued.remove(&pair);
        Some(pair)
    }

    #[must_use]
    pub fn contains(&self, pair: &PairId) -> bool {
        self.queued.contains(pair)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// =============================================================================
// Scheduler
// =============================================================================

/// What one drain tick did.
#[derive(Debug)]
pub enum DrainOutcome {
    /// Nothing was queued.
    Idle,
    /// A quote was fetched and handed to the engine.
    Delivered(PairId),
    /// The fetch failed; the entry was dropped.
    Failed { pair: PairId, error: ExchangeError },
    /// The engine is gone.
    Closed,
}

/// Polls one exchange for its configured pairs.
pub struct PollScheduler {
    adapter: Arc<dyn ExchangeAdapter>,
    pairs: Vec<PairId>,
    schedule: ExchangeSchedule,
    queue: PollQueue,
    updates: mpsc::Sender<QuoteUpdate>,
}

impl std::fmt::Debug for PollScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PollScheduler")
            .field("exchange", &self.adapter.id())
            .field("pairs", &self.pairs)
            .field("schedule", &self.schedule)
            .field("queued", &self.queue.len())
            .finish_non_exhaustive()
    }
}

impl PollScheduler {
    #[must_use]
    pub fn new(
        adapter: Arc<dyn ExchangeAdapter>,
        pairs: Vec<PairId>,
        schedule: ExchangeSchedule,
        updates: mpsc::Sender<QuoteUpdate>,
    ) -> Self {
        let queue = PollQueue::new(adapter.id());
        Self {
            adapter,
            pairs,
            schedule,
            queue,
            updates,
        }
    }

    /// One scheduler per adapter with at least one configured pair it
    /// supports. Configured pairs the venue does not list are skipped with a
    /// warning.
    #[must_use]
    pub fn for_config(
        config: &AppConfig,
        adapters: &[Arc<dyn ExchangeAdapter>],
        updates: &mpsc::Sender<QuoteUpdate>,
    ) -> Vec<Self> {
        let mut schedulers = Vec::new();

        for adapter in adapters {
            let exchange = adapter.id();
            let supported: BTreeSet<PairId> = adapter.supported_pairs().into_iter().collect();

            let (pairs, unsupported): (Vec<PairId>, Vec<PairId>) = config
                .pairs_for(exchange)
                .into_iter()
                .partition(|pair| supported.contains(pair));

            for pair in &unsupported {
                warn!(exchange = %exchange, pair = %pair, "Pair not listed on exchange, not polling");
            }
            if pairs.is_empty() {
                continue;
            }

            schedulers.push(Self::new(
                Arc::clone(adapter),
                pairs,
                config.schedule_for(exchange),
                updates.clone(),
            ));
        }
        schedulers
    }

    #[must_use]
    pub fn exchange(&self) -> ExchangeId {
        self.adapter.id()
    }

    #[must_use]
    pub fn pairs(&self) -> &[PairId] {
        &self.pairs
    }

    #[must_use]
    pub fn queue(&self) -> &PollQueue {
        &self.queue
    }

    /// Enqueues every configured pair not already waiting.
    pub fn refill_queue(&mut self) -> usize {
        let added = self.queue.refill(&self.pairs);
        trace!(
            exchange = %self.exchange(),
            added,
            queued = self.queue.len(),
            "Poll queue refilled"
        );
        added
    }

    /// Pops the head entry and fetches it under the fetch timeout.
    pub async fn drain_one(&mut self) -> DrainOutcome {
        let Some(pair) = self.queue.pop() else {
            return DrainOutcome::Idle;
        };
        let exchange = self.exchange();

        let dispatched_at = Utc::now();
        let fetched = match tokio::time::timeout(
            self.schedule.fetch_timeout,
            self.adapter.fetch_quote(&pair),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(ExchangeError::Timeout(format!(
                "no response within {}ms",
                self.schedule.fetch_timeout.as_millis()
            ))),
        };

        match fetched {
            Ok(quote) => {
                debug!(
                    exchange = %exchange,
                    pair = %pair,
                    value = %quote.value,
                    volume = %quote.volume,
                    "Quote fetched"
                );
                let update = QuoteUpdate {
                    pair: pair.clone(),
                    exchange,
                    quote,
                    dispatched_at,
                };
                if self.updates.send(update).await.is_err() {
                    return DrainOutcome::Closed;
                }
                DrainOutcome::Delivered(pair)
            }
            Err(error) => {
                warn!(
                    exchange = %exchange,
                    pair = %pair,
                    error = %error,
                    transient = error.is_transient(),
                    "Quote fetch failed"
                );
                DrainOutcome::Failed { pair, error }
            }
        }
    }

    /// Runs refill and drain ticks until `stop` is set or the engine's quote
    /// channel closes.
    pub async fn run(mut self, stop: Arc<AtomicBool>) {
        let exchange = self.exchange();
        let mut refill = tokio::time::interval(self.schedule.refill_interval);
        refill.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut drain = tokio::time::interval(self.schedule.drain_interval);
        drain.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            exchange = %exchange,
            pairs = self.pairs.len(),
            refill_ms = self.schedule.refill_interval.as_millis() as u64,
            drain_ms = self.schedule.drain_interval.as_millis() as u64,
            "Poll scheduler started"
        );

        loop {
            if stop.load(Ordering::Relaxed) {
                break;
            }

            tokio::select! {
                _ = refill.tick() => {
                    self.refill_queue();
                }
                _ = drain.tick() => {
                    if matches!(self.drain_one().await, DrainOutcome::Closed) {
                        info!(exchange = %exchange, "Quote channel closed");
                        break;
                    }
                }
            }
        }

        info!(exchange = %exchange, "Poll scheduler stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use spreadwatch_core::{AssetId, Credentials, ExchangeResult, PairConfig, Quote};
    use std::collections::BTreeMap;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    /// Quotes a fixed price for listed pairs, fails for `failing`, and can be
    /// slowed down to exercise the fetch timeout.
    struct MockAdapter {
        id: ExchangeId,
        listed: Vec<PairId>,
        failing: Option<PairId>,
        delay: Duration,
        calls: AtomicUsize,
    }

    impl MockAdapter {
        fn new(id: ExchangeId, listed: &[&str]) -> Self {
            Self {
                id,
                listed: listed.iter().map(|s| PairId::new(s)).collect(),
                failing: None,
                delay: Duration::ZERO,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ExchangeAdapter for MockAdapter {
        fn id(&self) -> ExchangeId {
            self.id
        }

        fn supported_pairs(&self) -> Vec<PairId> {
            self.listed.clone()
        }

        async fn fetch_quote(&self, pair: &PairId) -> ExchangeResult<Quote> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if self.failing.as_ref() == Some(pair) {
                return Err(ExchangeError::Network("connection reset".into()));
            }
            Ok(Quote::new(dec!(0.0310), dec!(12), Utc::now()))
        }

        fn withdrawal_fee(&self, _asset: &AssetId) -> Option<Decimal> {
            None
        }

        async fn fetch_balance(
            &self,
            _credentials: &Credentials,
        ) -> ExchangeResult<BTreeMap<AssetId, Decimal>> {
            Ok(BTreeMap::new())
        }
    }

    fn schedule(timeout: Duration) -> ExchangeSchedule {
        ExchangeSchedule {
            refill_interval: Duration::from_millis(50),
            drain_interval: Duration::from_millis(10),
            fetch_timeout: timeout,
        }
    }

    fn pairs(symbols: &[&str]) -> Vec<PairId> {
        symbols.iter().map(|s| PairId::new(s)).collect()
    }

    #[test]
    fn test_queue_refill_skips_queued_pairs() {
        let mut queue = PollQueue::new(ExchangeId::Kraken);
        let all = pairs(&["ETHBTC", "LTCBTC"]);

        assert_eq!(queue.refill(&all), 2);
        assert_eq!(queue.refill(&all), 0);
        assert_eq!(queue.len(), 2);

        assert_eq!(queue.pop(), Some(PairId::new("ETHBTC")));
        assert!(!queue.contains(&PairId::new("ETHBTC")));
        assert_eq!(queue.refill(&all), 1);
        assert_eq!(queue.len(), 2);

        // FIFO: LTCBTC was waiting first.
        assert_eq!(queue.pop(), Some(PairId::new("LTCBTC")));
        assert_eq!(queue.pop(), Some(PairId::new("ETHBTC")));
        assert_eq!(queue.pop(), None);
    }

    #[tokio::test]
    async fn test_drain_one_delivers_stamped_update() {
        let (tx, mut rx) = mpsc::channel(8);
        let adapter = Arc::new(MockAdapter::new(ExchangeId::Kraken, &["ETHBTC"]));
        let mut scheduler = PollScheduler::new(
            adapter,
            pairs(&["ETHBTC"]),
            schedule(Duration::from_secs(1)),
            tx,
        );

        assert!(matches!(scheduler.drain_one().await, DrainOutcome::Idle));

        let before = Utc::now();
        scheduler.refill_queue();
        let outcome = scheduler.drain_one().await;
        assert!(matches!(outcome, DrainOutcome::Delivered(ref p) if p.as_str() == "ETHBTC"));

        let update = rx.recv().await.unwrap();
        assert_eq!(update.exchange, ExchangeId::Kraken);
        assert_eq!(update.pair, PairId::new("ETHBTC"));
        assert_eq!(update.quote.value, dec!(0.0310));
        assert!(update.dispatched_at >= before);
        assert!(scheduler.queue().is_empty());
    }

    #[tokio::test]
    async fn test_failed_fetch_drops_entry_until_next_refill() {
        let (tx, mut rx) = mpsc::channel(8);
        let mut adapter = MockAdapter::new(ExchangeId::Bittrex, &["ETHBTC", "LTCBTC"]);
        adapter.failing = Some(PairId::new("ETHBTC"));
        let mut scheduler = PollScheduler::new(
            Arc::new(adapter),
            pairs(&["ETHBTC", "LTCBTC"]),
            schedule(Duration::from_secs(1)),
            tx,
        );

        scheduler.refill_queue();
        let outcome = scheduler.drain_one().await;
        assert!(matches!(
            outcome,
            DrainOutcome::Failed { ref pair, error: ExchangeError::Network(_) } if pair.as_str() == "ETHBTC"
        ));
        assert!(!scheduler.queue().contains(&PairId::new("ETHBTC")));

        // The other pair is unaffected.
        assert!(matches!(scheduler.drain_one().await, DrainOutcome::Delivered(_)));
        assert_eq!(rx.recv().await.unwrap().pair, PairId::new("LTCBTC"));

        assert_eq!(scheduler.refill_queue(), 2);
    }

    #[tokio::test]
    async fn test_slow_fetch_times_out() {
        let (tx, _rx) = mpsc::channel(8);
        let mut adapter = MockAdapter::new(ExchangeId::Poloniex, &["ETHBTC"]);
        adapter.delay = Duration::from_millis(500);
        let mut scheduler = PollScheduler::new(
            Arc::new(adapter),
            pairs(&["ETHBTC"]),
            schedule(Duration::from_millis(20)),
            tx,
        );

        scheduler.refill_queue();
        let outcome = scheduler.drain_one().await;
        assert!(matches!(
            outcome,
            DrainOutcome::Failed {
                error: ExchangeError::Timeout(_),
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_closed_channel_reported() {
        let (tx, rx) = mpsc::channel(8);
        drop(rx);
        let adapter = Arc::new(MockAdapter::new(ExchangeId::Kraken, &["ETHBTC"]));
        let mut scheduler = PollScheduler::new(
            adapter,
            pairs(&["ETHBTC"]),
            schedule(Duration::from_secs(1)),
            tx,
        );

        scheduler.refill_queue();
        assert!(matches!(scheduler.drain_one().await, DrainOutcome::Closed));
    }

    #[tokio::test]
    async fn test_run_polls_until_stopped() {
        let (tx, mut rx) = mpsc::channel(64);
        let adapter = Arc::new(MockAdapter::new(ExchangeId::Kraken, &["ETHBTC", "LTCBTC"]));
        let counter = Arc::clone(&adapter);
        let scheduler = PollScheduler::new(
            adapter,
            pairs(&["ETHBTC", "LTCBTC"]),
            schedule(Duration::from_secs(1)),
            tx,
        );

        let stop = Arc::new(AtomicBool::new(false));
        let task = tokio::spawn(scheduler.run(Arc::clone(&stop)));

        let first = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        let second = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_ne!(first.pair, second.pair);

        stop.store(true, Ordering::SeqCst);
        let joined = tokio::time::timeout(Duration::from_secs(2), task).await;
        assert!(joined.is_ok(), "scheduler should stop");
        assert!(counter.calls.load(Ordering::SeqCst) >= 2);
    }

    #[test]
    fn test_for_config_skips_unlisted_pairs() {
        let mut config = AppConfig::default();
        config.pairs = vec![
            PairConfig {
                symbol: PairId::new("ETHBTC"),
                exchanges: vec![ExchangeId::Kraken, ExchangeId::Coinbase],
                threshold: dec!(0.0003),
                min_gain: dec!(0.001),
            },
            PairConfig {
                symbol: PairId::new("XMRBTC"),
                exchanges: vec![ExchangeId::Kraken, ExchangeId::Coinbase],
                threshold: dec!(0.0001),
                min_gain: dec!(0.001),
            },
        ];
        let adapters: Vec<Arc<dyn ExchangeAdapter>> = vec![
            Arc::new(MockAdapter::new(ExchangeId::Kraken, &["ETHBTC", "XMRBTC"])),
            Arc::new(MockAdapter::new(ExchangeId::Coinbase, &["BTCUSD"])),
        ];
        let (tx, _rx) = mpsc::channel(8);

        let schedulers = PollScheduler::for_config(&config, &adapters, &tx);

        assert_eq!(schedulers.len(), 1);
        assert_eq!(schedulers[0].exchange(), ExchangeId::Kraken);
        assert_eq!(schedulers[0].pairs().len(), 2);
    }
}
