//! Cross-exchange spread aggregation and rotation estimation.
//!
//! Quotes for the same pair arrive from several exchanges. This crate merges
//! them, detects when the spread between the cheapest and the dearest
//! exchange crosses a threshold, and estimates the smallest round trip that
//! would turn that spread into a profit after withdrawal fees:
//!
//! ```text
//! ETHBTC  KRAKEN   0.0310
//!         BITTREX  0.0312   <- high
//!         BITFINEX 0.0305   <- low
//!
//! spread 0.0007 >= threshold 0.0003  -> alert
//! rotation: min investment 0.0794 BTC for a 0.001 BTC gain
//! ```
//!
//! # Modules
//!
//! - [`scheduler`]: per-exchange poll queues feeding the engine
//! - [`ticker_store`]: latest quote per exchange, extrema, current spread
//! - [`spread`]: threshold detection with per-pair debounce
//! - [`rotation`]: minimum investment solvers
//! - [`fees`]: withdrawal fee schedule
//! - [`archive`]: in-memory snapshot history for charts
//! - [`engine`]: the actor tying it together
//!
//! # Example
//!
//! ```ignore
//! use spreadwatch_arbitrage_cross::{Engine, FeeSchedule, PollScheduler};
//!
//! let fees = FeeSchedule::from_adapters(&adapters, &config.pairs);
//! let (engine, handle) = Engine::new(&config, fees);
//! tokio::spawn(engine.run());
//!
//! for scheduler in PollScheduler::for_config(&config, &adapters, &handle.quote_sender()) {
//!     tokio::spawn(scheduler.run(Arc::clone(&stop)));
//! }
//!
//! let mut events = handle.subscribe();
//! while let Ok(event) = events.recv().await {
//!     println!("{event:?}");
//! }
//! ```

pub mod archive;
pub mod engine;
pub mod fees;
pub mod rotation;
pub mod scheduler;
pub mod spread;
pub mod ticker_store;

pub use archive::{ChartPoint, Snapshot, SnapshotArchive};
pub use engine::{Engine, EngineCommand, EngineEvent, EngineHandle};
pub use fees::{FeeEntry, FeeSchedule};
pub use rotation::{
    gain, round_trip, GainPoint, NoSolutionReason, RotationError, RotationEstimator,
    RotationRequest, RotationResult, Solver, DEFAULT_CURVE_POINTS, DEFAULT_CURVE_STEP,
};
pub use scheduler::{DrainOutcome, PollQueue, PollScheduler};
pub use spread::SpreadEvaluator;
pub use ticker_store::{
    Extreme, Level, StalePurge, StoreError, TickerStore, TradingPair, TradingPairView,
    UpdateOutcome,
};
