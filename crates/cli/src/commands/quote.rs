//! One-shot ticker fetch from a single exchange.

use anyhow::Result;
use clap::Args;
use spreadwatch_core::{ConfigLoader, ExchangeAdapter, ExchangeId, PairId};
use spreadwatch_exchange_rest::{RestExchange, RestExchangeConfig};

/// Arguments for the quote command.
#[derive(Args, Debug, Clone)]
pub struct QuoteArgs {
    /// Exchange to query (KRAKEN, BITTREX, BITFINEX, POLONIEX, COINBASE)
    #[arg(short, long)]
    pub exchange: ExchangeId,

    /// Pair symbol, e.g. ETHBTC
    #[arg(short, long)]
    pub pair: String,

    /// Config file whose exchange overrides (base URL, rate limit) apply
    #[arg(short, long)]
    pub config: Option<String>,

    /// Print JSON instead of a table
    #[arg(long)]
    pub json: bool,
}

/// Fetches and prints the latest quote.
///
/// # Errors
/// Returns an error if the config cannot be loaded or the fetch fails.
pub async fn run_quote(args: QuoteArgs) -> Result<()> {
    let rest_config = match &args.config {
        Some(path) => RestExchangeConfig::from_app_config(&ConfigLoader::load(path)?, args.exchange),
        None => RestExchangeConfig::default(),
    };
    let exchange = RestExchange::new(args.exchange, rest_config)?;
    let pair = PairId::new(&args.pair);

    tracing::debug!(exchange = %args.exchange, pair = %pair, url = exchange.base_url(), "Fetching quote");
    let quote = exchange.fetch_quote(&pair).await?;

    if args.json {
        let output = serde_json::json!({
            "exchange": args.exchange,
            "pair": pair,
            "quote": quote,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!("\n=== {} {} ===\n", args.exchange, pair);
    println!("{:<15} {:>20}", "Last", quote.value);
    println!("{:<15} {:>20}", "Volume", quote.volume);
    println!(
        "{:<15} {:>20}",
        "Observed",
        quote.observed_at.format("%Y-%m-%d %H:%M:%S")
    );
    println!();

    Ok(())
}
