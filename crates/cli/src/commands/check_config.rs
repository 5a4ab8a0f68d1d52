//! Validates a configuration file and reports what the engine would poll.

use anyhow::Result;
use clap::Args;
use spreadwatch_core::{AppConfig, ConfigLoader, ExchangeId, PairId, DEFAULT_CONFIG_PATH};
use spreadwatch_exchange_rest::VenueProfile;

/// Arguments for the check-config command.
#[derive(Args, Debug, Clone)]
pub struct CheckConfigArgs {
    /// Config file path
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    pub config: String,
}

/// Problems that do not stop the engine but limit what it can do.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Finding {
    /// The exchange has no ticker mapping for the pair and will skip it.
    UnsupportedPair { exchange: ExchangeId, pair: PairId },
    /// Rotations that withdraw this asset from the exchange cannot be estimated.
    MissingFee { exchange: ExchangeId, asset: String },
}

fn findings(config: &AppConfig) -> Vec<Finding> {
    let mut found = Vec::new();
    for pair in &config.pairs {
        for &exchange in &pair.exchanges {
            let profile = VenueProfile::for_exchange(exchange);
            if profile.venue_symbol(&pair.symbol).is_none() {
                found.push(Finding::UnsupportedPair {
                    exchange,
                    pair: pair.symbol.clone(),
                });
                continue;
            }
            if let Some((base, quote)) = pair.symbol.split() {
                for asset in [base, quote] {
                    if profile.withdrawal_fee(&asset).is_none() {
                        found.push(Finding::MissingFee {
                            exchange,
                            asset: asset.as_str().to_string(),
                        });
                    }
                }
            }
        }
    }
    found.dedup();
    found
}

/// Loads the configuration and prints a summary of pairs and schedules.
///
/// # Errors
/// Returns an error if the configuration cannot be loaded or is invalid.
pub fn run_check_config(args: &CheckConfigArgs) -> Result<()> {
    let config = ConfigLoader::load(&args.config)?;

    println!("\n=== Configuration: {} ===\n", args.config);
    println!(
        "{:<10} {:>12} {:>10}  {}",
        "Pair", "Threshold", "Min Gain", "Exchanges"
    );
    println!("{}", "=".repeat(70));
    for pair in &config.pairs {
        let exchanges: Vec<&str> = pair.exchanges.iter().map(|id| id.as_str()).collect();
        println!(
            "{:<10} {:>12} {:>10}  {}",
            pair.symbol.as_str(),
            pair.threshold,
            pair.min_gain,
            exchanges.join(", ")
        );
    }

    println!(
        "\n{:<12} {:>12} {:>12} {:>12} {:>8}",
        "Exchange", "Refill (ms)", "Drain (ms)", "Timeout (ms)", "Pairs"
    );
    println!("{}", "=".repeat(60));
    for id in config.active_exchanges() {
        let schedule = config.schedule_for(id);
        println!(
            "{:<12} {:>12} {:>12} {:>12} {:>8}",
            id.as_str(),
            schedule.refill_interval.as_millis(),
            schedule.drain_interval.as_millis(),
            schedule.fetch_timeout.as_millis(),
            config.pairs_for(id).len()
        );
    }

    let found = findings(&config);
    if found.is_empty() {
        println!("\nConfiguration OK.");
    } else {
        println!("\nWarnings:");
        for finding in &found {
            match finding {
                Finding::UnsupportedPair { exchange, pair } => {
                    println!("  - {exchange} does not quote {pair}; it will be skipped");
                }
                Finding::MissingFee { exchange, asset } => {
                    println!("  - {exchange} has no {asset} withdrawal fee; rotations through it fail");
                }
            }
        }
    }
    println!();

    Ok(())
}
