//! The aggregation actor and its handle.
//!
//! [`Engine`] owns the ticker store, spread evaluator, rotation estimator,
//! fee schedule and snapshot archive. Quote updates from the poll schedulers
//! and commands from handles arrive on channels and are processed one at a
//! time, so store mutations never race. Alerts, rotation estimates and stale
//! purges are published on a broadcast channel.

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use spreadwatch_core::{AppConfig, ExchangeId, PairId, QuoteUpdate, SpreadNotification};
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::archive::{ChartPoint, Snapshot, SnapshotArchive};
use crate::fees::FeeSchedule;
use crate::rotation::{
    GainPoint, RotationError, RotationEstimator, RotationRequest, RotationResult, Solver,
    DEFAULT_CURVE_POINTS, DEFAULT_CURVE_STEP,
};
use crate::spread::SpreadEvaluator;
use crate::ticker_store::{StalePurge, TickerStore, TradingPairView, UpdateOutcome};

const COMMAND_CAPACITY: usize = 32;
const QUOTE_CAPACITY: usize = 1024;
const EVENT_CAPACITY: usize = 256;

// =============================================================================
// Commands and Events
// =============================================================================

#[derive(Debug)]
pub enum EngineCommand {
    Snapshot(oneshot::Sender<Vec<TradingPairView>>),
    PairView {
        pair: PairId,
        reply: oneshot::Sender<Option<TradingPairView>>,
    },
    ChartData {
        pairs: Vec<PairId>,
        reply: oneshot::Sender<BTreeMap<PairId, Vec<ChartPoint>>>,
    },
    SetArchiving(bool),
    ClearArchive,
    Estimate {
        pair: PairId,
        solver: Solver,
        reply: oneshot::Sender<Option<Result<RotationResult, RotationError>>>,
    },
    GainCurve {
        pair: PairId,
        reply: oneshot::Sender<Option<Result<Vec<GainPoint>, RotationError>>>,
    },
    Shutdown,
}

/// Published to every subscriber.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    SpreadAlert(SpreadNotification),
    /// Estimate computed right after an alert. An `Err` means "not
    /// profitable" or missing inputs.
    RotationEstimated {
        pair: PairId,
        high_exchange: ExchangeId,
        low_exchange: ExchangeId,
        #[serde(with = "estimate_serde")]
        estimate: Result<RotationResult, RotationError>,
    },
    StalePurged(StalePurge),
}

mod estimate_serde {
    use super::{RotationError, RotationResult};
    use serde::{Serialize, Serializer};

    #[derive(Serialize)]
    #[serde(rename_all = "snake_case")]
    enum Repr<'a> {
        Ok(&'a RotationResult),
        NotProfitable(String),
    }

    pub fn serialize<S: Serializer>(
        estimate: &Result<RotationResult, RotationError>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match estimate {
            Ok(result) => Repr::Ok(result).serialize(serializer),
            Err(err) => Repr::NotProfitable(err.to_string()).serialize(serializer),
        }
    }
}

// =============================================================================
// Engine Actor
// =============================================================================

pub struct Engine {
    store: TickerStore,
    evaluator: SpreadEvaluator,
    estimator: RotationEstimator,
    fees: FeeSchedule,
    archive: SnapshotArchive,
    sweep_interval: Duration,
    archive_interval: Duration,
    commands: mpsc::Receiver<EngineCommand>,
    quotes: mpsc::Receiver<QuoteUpdate>,
    events: broadcast::Sender<EngineEvent>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("pairs", &self.store.pair_ids().count())
            .field("archived", &self.archive.len())
            .field("fees", &self.fees.len())
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// Builds the actor and a handle connected to it.
    #[must_use]
    pub fn new(config: &AppConfig, fees: FeeSchedule) -> (Self, EngineHandle) {
        let (command_tx, commands) = mpsc::channel(COMMAND_CAPACITY);
        let (quote_tx, quotes) = mpsc::channel(QUOTE_CAPACITY);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        let engine = Self {
            store: TickerStore::from_config(config),
            evaluator: SpreadEvaluator::from_config(&config.polling),
            estimator: RotationEstimator::from_config(&config.rotation),
            fees,
            archive: SnapshotArchive::new(config.polling.archive_capacity),
            sweep_interval: config.polling.sweep_interval(),
            archive_interval: config.polling.archive_interval(),
            commands,
            quotes,
            events: events.clone(),
        };
        let handle = EngineHandle {
            commands: command_tx,
            quotes: quote_tx,
            events,
        };
        (engine, handle)
    }

    #[must_use]
    pub fn store(&self) -> &TickerStore {
        &self.store
    }

    #[must_use]
    pub fn archive(&self) -> &SnapshotArchive {
        &self.archive
    }

    fn publish(&self, event: EngineEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    /// Applies one polled quote, then evaluates the pair and estimates a
    /// rotation if an alert fires.
    pub fn handle_quote(&mut self, update: QuoteUpdate, now: DateTime<Utc>) {
        let outcome = self.store.update(
            &update.pair,
            update.exchange,
            update.quote,
            update.dispatched_at,
            now,
        );
        match outcome {
            Ok(UpdateOutcome::Applied) => {}
            Ok(skipped) => {
                debug!(
                    pair = %update.pair,
                    exchange = %update.exchange,
                    outcome = ?skipped,
                    "Quote not applied"
                );
                return;
            }
            Err(e) => {
                warn!(pair = %update.pair, exchange = %update.exchange, error = %e, "Quote rejected");
                return;
            }
        }

        let Some(pair) = self.store.pair_mut(&update.pair) else {
            return;
        };
        let Some(notification) = self.evaluator.evaluate(pair, now) else {
            return;
        };
        let view = pair.view();

        self.publish(EngineEvent::SpreadAlert(notification.clone()));

        let estimate = RotationRequest::from_view(&view, &self.fees)
            .and_then(|request| self.estimator.estimate(&request));
        match &estimate {
            Ok(result) => info!(
                pair = %result.pair,
                min_investment = %result.min_investment,
                expected_gain = %result.expected_gain,
                "Rotation estimated"
            ),
            Err(e) => info!(pair = %notification.pair, reason = %e, "Rotation not profitable"),
        }

        self.publish(EngineEvent::RotationEstimated {
            pair: notification.pair,
            high_exchange: notification.high_exchange,
            low_exchange: notification.low_exchange,
            estimate,
        });
    }

    /// Removes stale quotes and announces each purge.
    pub fn sweep(&mut self, now: DateTime<Utc>) -> usize {
        let purged = self.store.evict_stale(now);
        let count = purged.len();
        for purge in purged {
            info!(
                pair = %purge.pair,
                exchange = %purge.exchange,
                observed_at = %purge.observed_at,
                "Stale quote purged"
            );
            self.publish(EngineEvent::StalePurged(purge));
        }
        count
    }

    /// Archives the current quotes of every pair.
    pub fn archive_tick(&mut self, now: DateTime<Utc>) {
        self.archive.record(Snapshot {
            time: now,
            pairs: self.store.quotes(),
        });
    }

    fn estimate_for(
        &self,
        pair: &PairId,
        solver: Solver,
    ) -> Option<Result<RotationResult, RotationError>> {
        let view = self.store.get(pair)?;
        Some(
            RotationRequest::from_view(&view, &self.fees)
                .and_then(|request| self.estimator.estimate_with(&request, solver)),
        )
    }

    fn gain_curve_for(&self, pair: &PairId) -> Option<Result<Vec<GainPoint>, RotationError>> {
        let view = self.store.get(pair)?;
        Some(RotationRequest::from_view(&view, &self.fees).and_then(|request| {
            self.estimator
                .gain_curve(&request, DEFAULT_CURVE_STEP, DEFAULT_CURVE_POINTS)
        }))
    }

    /// Returns false once the engine should stop.
    fn handle_command(&mut self, command: EngineCommand) -> bool {
        match command {
            EngineCommand::Snapshot(reply) => {
                let _ = reply.send(self.store.views());
            }
            EngineCommand::PairView { pair, reply } => {
                let _ = reply.send(self.store.get(&pair));
            }
            EngineCommand::ChartData { pairs, reply } => {
                let _ = reply.send(self.archive.chart_series(&pairs));
            }
            EngineCommand::SetArchiving(enabled) => {
                info!(enabled, "Archiving toggled");
                self.archive.set_enabled(enabled);
            }
            EngineCommand::ClearArchive => {
                self.archive.clear();
                info!(remaining = self.archive.len(), "Archive cleared");
            }
            EngineCommand::Estimate {
                pair,
                solver,
                reply,
            } => {
                let _ = reply.send(self.estimate_for(&pair, solver));
            }
            EngineCommand::GainCurve { pair, reply } => {
                let _ = reply.send(self.gain_curve_for(&pair));
            }
            EngineCommand::Shutdown => {
                info!("Engine shutting down");
                return false;
            }
        }
        true
    }

    /// Processes quotes, commands and periodic sweeps until shutdown or
    /// until every handle is dropped.
    pub async fn run(mut self) {
        let mut sweep = tokio::time::interval_at(
            Instant::now() + self.sweep_interval,
            self.sweep_interval,
        );
        sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut archive = tokio::time::interval_at(
            Instant::now() + self.archive_interval,
            self.archive_interval,
        );
        archive.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            pairs = self.store.pair_ids().count(),
            fees = self.fees.len(),
            "Engine started"
        );

        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(command) => {
                        if !self.handle_command(command) {
                            break;
                        }
                    }
                    None => break,
                },
                Some(update) = self.quotes.recv() => {
                    self.handle_quote(update, Utc::now());
                }
                _ = sweep.tick() => {
                    self.sweep(Utc::now());
                }
                _ = archive.tick() => {
                    self.archive_tick(Utc::now());
                }
            }
        }

        info!("Engine stopped");
    }
}

// =============================================================================
// Handle
// =============================================================================

/// Cloneable access to a running [`Engine`].
#[derive(Clone)]
pub struct EngineHandle {
    commands: mpsc::Sender<EngineCommand>,
    quotes: mpsc::Sender<QuoteUpdate>,
    events: broadcast::Sender<EngineEvent>,
}

impl EngineHandle {
    /// Sender the poll schedulers push quotes into.
    #[must_use]
    pub fn quote_sender(&self) -> mpsc::Sender<QuoteUpdate> {
        self.quotes.clone()
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    /// Views of every configured pair.
    ///
    /// # Errors
    /// Returns an error if the engine has stopped.
    pub async fn snapshot(&self) -> Result<Vec<TradingPairView>> {
        let (tx, rx) = oneshot::channel();
        self.commands.send(EngineCommand::Snapshot(tx)).await?;
        Ok(rx.await?)
    }

    /// # Errors
    /// Returns an error if the engine has stopped.
    pub async fn pair_view(&self, pair: &PairId) -> Result<Option<TradingPairView>> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(EngineCommand::PairView {
                pair: pair.clone(),
                reply: tx,
            })
            .await?;
        Ok(rx.await?)
    }

    /// # Errors
    /// Returns an error if the engine has stopped.
    pub async fn chart_data(&self, pairs: Vec<PairId>) -> Result<BTreeMap<PairId, Vec<ChartPoint>>> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(EngineCommand::ChartData { pairs, reply: tx })
            .await?;
        Ok(rx.await?)
    }

    /// # Errors
    /// Returns an error if the engine has stopped.
    pub async fn set_archiving(&self, enabled: bool) -> Result<()> {
        self.commands
            .send(EngineCommand::SetArchiving(enabled))
            .await?;
        Ok(())
    }

    /// # Errors
    /// Returns an error if the engine has stopped.
    pub async fn clear_archive(&self) -> Result<()> {
        self.commands.send(EngineCommand::ClearArchive).await?;
        Ok(())
    }

    /// Estimates a rotation from the pair's current spread.
    ///
    /// # Errors
    /// Returns an error if the engine has stopped, the pair is unknown, or
    /// the estimate fails (the [`RotationError`] can be downcast).
    pub async fn estimate(&self, pair: &PairId, solver: Solver) -> Result<RotationResult> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(EngineCommand::Estimate {
                pair: pair.clone(),
                solver,
                reply: tx,
            })
            .await?;
        let estimate = rx.await?.ok_or_else(|| anyhow!("unknown pair {pair}"))?;
        Ok(estimate?)
    }

    /// # Errors
    /// Returns an error if the engine has stopped, the pair is unknown, or
    /// its spread cannot be rotated.
    pub async fn gain_curve(&self, pair: &PairId) -> Result<Vec<GainPoint>> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(EngineCommand::GainCurve {
                pair: pair.clone(),
                reply: tx,
            })
            .await?;
        let curve = rx.await?.ok_or_else(|| anyhow!("unknown pair {pair}"))?;
        Ok(curve?)
    }

    /// Asks the engine to stop.
    ///
    /// # Errors
    /// Returns an error if the engine has already stopped.
    pub async fn shutdown(&self) -> Result<()> {
        self.commands.send(EngineCommand::Shutdown).await?;
        Ok(())
    }
}
