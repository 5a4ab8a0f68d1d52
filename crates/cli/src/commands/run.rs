//! Long-running monitor: poll every configured exchange, log spread alerts
//! and the rotation estimate that follows each one.
//!
//! ```bash
//! # Run until Ctrl+C
//! spreadwatch run --config config/Config.toml
//!
//! # Run for two hours, then print the final spreads
//! spreadwatch run --duration 2h
//! ```

use anyhow::{anyhow, Result};
use clap::Args;
use spreadwatch_arbitrage_cross::{Engine, EngineEvent, FeeSchedule, PollScheduler};
use spreadwatch_core::{AppConfig, ConfigLoader, DEFAULT_CONFIG_PATH};
use spreadwatch_exchange_rest::RestExchange;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast::error::RecvError;

/// Arguments for the run command.
#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Config file path
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    pub config: String,

    /// How long to run (e.g. "30m", "2h", "1d")
    ///
    /// If not specified, runs until Ctrl+C.
    #[arg(long)]
    pub duration: Option<String>,
}

/// Parses a duration such as `500ms`, `30s`, `15m`, `2h` or `1d`.
///
/// # Errors
/// Returns an error for an empty string, a missing or unknown unit, or zero.
pub fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim().to_lowercase();
    if s.is_empty() {
        return Err(anyhow!("Duration string cannot be empty"));
    }

    let (num_str, unit) = match s.strip_suffix("ms") {
        Some(num) => (num, "ms"),
        None => {
            let split_idx = s
                .chars()
                .position(|c| !c.is_ascii_digit())
                .ok_or_else(|| anyhow!("Duration must have a unit (ms, s, m, h, d)"))?;
            (&s[..split_idx], &s[split_idx..])
        }
    };

    if num_str.is_empty() {
        return Err(anyhow!("Duration must start with a number"));
    }
    let value: u64 = num_str
        .parse()
        .map_err(|_| anyhow!("Invalid number in duration: {num_str}"))?;
    if value == 0 {
        return Err(anyhow!("Duration cannot be zero"));
    }

    let duration = match unit {
        "ms" => Duration::from_millis(value),
        "s" => Duration::from_secs(value),
        "m" => Duration::from_secs(value * 60),
        "h" => Duration::from_secs(value * 3600),
        "d" => Duration::from_secs(value * 86400),
        _ => return Err(anyhow!("Unknown duration unit: {unit}. Use ms, s, m, h, or d")),
    };
    Ok(duration)
}

struct ConfigSummary<'a> {
    config: &'a AppConfig,
    duration: Option<&'a str>,
}

impl ConfigSummary<'_> {
    fn log(&self) {
        let polling = &self.config.polling;
        tracing::info!("========================================");
        tracing::info!("  SPREADWATCH CONFIG                    ");
        tracing::info!("========================================");
        tracing::info!("Pairs:");
        for pair in &self.config.pairs {
            let exchanges: Vec<&str> = pair.exchanges.iter().map(|id| id.as_str()).collect();
            tracing::info!(
                "  {:<10} threshold {:<10} min gain {:<8} [{}]",
                pair.symbol.as_str(),
                pair.threshold,
                pair.min_gain,
                exchanges.join(", ")
            );
        }
        tracing::info!("----------------------------------------");
        tracing::info!("Timing:");
        tracing::info!("  Refill:              {}ms", polling.refill_interval_ms);
        tracing::info!("  Drain:               {}ms", polling.drain_interval_ms);
        tracing::info!("  Fetch Timeout:       {}ms", polling.fetch_timeout_ms);
        tracing::info!("  Staleness Window:    {}s", polling.staleness_window_secs);
        tracing::info!("  Debounce Window:     {}s", polling.debounce_window_secs);
        tracing::info!("  Rotation Ordering:   {:?}", self.config.rotation.ordering);
        match self.duration {
            Some(dur) => tracing::info!("  Duration:            {}", dur),
            None => tracing::info!("  Duration:            indefinite"),
        }
        tracing::info!("========================================");
    }
}

#[derive(Debug, Default)]
struct RunStats {
    alerts: u64,
    rotations: u64,
    not_profitable: u64,
    stale_purges: u64,
    lagged: u64,
}

impl RunStats {
    fn record(&mut self, event: &EngineEvent) {
        match event {
            EngineEvent::SpreadAlert(alert) => {
                self.alerts += 1;
                tracing::info!("ALERT {}", alert.message());
            }
            EngineEvent::RotationEstimated {
                pair,
                high_exchange,
                low_exchange,
                estimate,
            } => match estimate {
                Ok(result) => {
                    self.rotations += 1;
                    tracing::info!(
                        "ROTATION {} {} -> {}: invest {} for gain {}",
                        pair,
                        high_exchange,
                        low_exchange,
                        result.min_investment.round_dp(8),
                        result.expected_gain.round_dp(8)
                    );
                }
                Err(e) => {
                    self.not_profitable += 1;
                    tracing::info!("ROTATION {} not profitable: {}", pair, e);
                }
            },
            EngineEvent::StalePurged(_) => self.stale_purges += 1,
        }
    }

    fn log_summary(&self, elapsed: Duration) {
        tracing::info!("========================================");
        tracing::info!("         SESSION SUMMARY                ");
        tracing::info!("========================================");
        tracing::info!("Runtime:              {:.1} minutes", elapsed.as_secs_f64() / 60.0);
        tracing::info!("Spread Alerts:        {}", self.alerts);
        tracing::info!("Rotations:");
        tracing::info!("  Profitable:         {}", self.rotations);
        tracing::info!("  Not Profitable:     {}", self.not_profitable);
        tracing::info!("Stale Purges:         {}", self.stale_purges);
        if self.lagged > 0 {
            tracing::info!("Missed Events:        {}", self.lagged);
        }
        tracing::info!("========================================");
    }
}

/// Runs the polling engine until Ctrl+C or the requested duration elapses.
///
/// # Errors
///
/// Returns an error if:
/// - The configuration cannot be loaded or is invalid
/// - Duration parsing fails
/// - An HTTP client cannot be built
pub async fn run_monitor(args: RunArgs) -> Result<()> {
    let run_duration = args.duration.as_deref().map(parse_duration).transpose()?;
    let config = ConfigLoader::load(&args.config)?;

    ConfigSummary {
        config: &config,
        duration: args.duration.as_deref(),
    }
    .log();

    let adapters = RestExchange::for_config(&config)?;
    let fees = FeeSchedule::from_adapters(&adapters, &config.pairs);
    tracing::info!(entries = fees.len(), "Withdrawal fee schedule loaded");

    let (engine, handle) = Engine::new(&config, fees);
    let mut events = handle.subscribe();
    let engine_task = tokio::spawn(engine.run());

    let stop = Arc::new(AtomicBool::new(false));
    let schedulers: Vec<_> = PollScheduler::for_config(&config, &adapters, &handle.quote_sender())
        .into_iter()
        .map(|scheduler| tokio::spawn(scheduler.run(Arc::clone(&stop))))
        .collect();
    if schedulers.is_empty() {
        tracing::warn!("No exchange lists any configured pair; nothing to poll");
    }

    let stop_on_signal = Arc::clone(&stop);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
            stop_on_signal.store(true, Ordering::SeqCst);
        }
    });

    tracing::info!("Monitoring spreads, press Ctrl+C to stop");
    let start_time = Instant::now();
    let mut stats = RunStats::default();

    while !stop.load(Ordering::SeqCst) {
        if let Some(max_duration) = run_duration {
            if start_time.elapsed() >= max_duration {
                tracing::info!("Duration limit reached, stopping...");
                break;
            }
        }

        tokio::select! {
            received = events.recv() => match received {
                Ok(event) => stats.record(&event),
                Err(RecvError::Lagged(missed)) => {
                    stats.lagged += missed;
                    tracing::warn!(missed, "Event subscriber lagged");
                }
                Err(RecvError::Closed) => break,
            },
            () = tokio::time::sleep(Duration::from_millis(500)) => {}
        }
    }

    stop.store(true, Ordering::SeqCst);
    for scheduler in schedulers {
        if tokio::time::timeout(Duration::from_secs(10), scheduler).await.is_err() {
            tracing::warn!("Poll scheduler did not stop in time");
        }
    }

    let views = handle.snapshot().await?;
    handle.shutdown().await?;
    engine_task.await?;

    tracing::info!("Final spreads:");
    for view in views {
        match (view.spread, view.current_low, view.current_high) {
            (Some(spread), Some(low), Some(high)) => tracing::info!(
                "  {:<10} spread {:<12} low {} {} / high {} {}",
                view.pair.as_str(),
                spread,
                low.exchange,
                low.value,
                high.exchange,
                high.value
            ),
            _ => tracing::info!("  {:<10} no data", view.pair.as_str()),
        }
    }

    stats.log_summary(start_time.elapsed());
    tracing::info!("Spreadwatch stopped");
    Ok(())
}
