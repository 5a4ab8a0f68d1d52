//! Signed balance fetch.
//!
//! Keys are read from the environment by default so they stay out of shell
//! history:
//!
//! ```bash
//! export SPREADWATCH_API_KEY=...
//! export SPREADWATCH_API_SECRET=...
//! spreadwatch balance --exchange KRAKEN
//! ```

use anyhow::Result;
use clap::Args;
use rust_decimal::Decimal;
use spreadwatch_core::{ConfigLoader, Credentials, ExchangeAdapter, ExchangeId};
use spreadwatch_exchange_rest::{RestExchange, RestExchangeConfig};

/// Arguments for the balance command.
#[derive(Args, Clone)]
pub struct BalanceArgs {
    /// Exchange to query
    #[arg(short, long)]
    pub exchange: ExchangeId,

    /// API key
    #[arg(long, env = "SPREADWATCH_API_KEY", hide_env_values = true)]
    pub api_key: String,

    /// API secret
    #[arg(long, env = "SPREADWATCH_API_SECRET", hide_env_values = true)]
    pub api_secret: String,

    /// Config file whose exchange overrides apply
    #[arg(short, long)]
    pub config: Option<String>,

    /// Include assets with a zero balance
    #[arg(long)]
    pub all: bool,
}

impl std::fmt::Debug for BalanceArgs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BalanceArgs")
            .field("exchange", &self.exchange)
            .field("config", &self.config)
            .field("all", &self.all)
            .finish_non_exhaustive()
    }
}

/// Fetches and prints account balances.
///
/// # Errors
/// Returns an error if the venue has no private API, the credentials are
/// rejected, or the request fails.
pub async fn run_balance(args: BalanceArgs) -> Result<()> {
    let rest_config = match &args.config {
        Some(path) => RestExchangeConfig::from_app_config(&ConfigLoader::load(path)?, args.exchange),
        None => RestExchangeConfig::default(),
    };
    let exchange = RestExchange::new(args.exchange, rest_config)?;
    let credentials = Credentials::new(args.api_key, args.api_secret);

    let balances = exchange.fetch_balance(&credentials).await?;
    let rows: Vec<_> = balances
        .iter()
        .filter(|(_, amount)| args.all || !amount.is_zero())
        .collect();

    println!("\n=== {} Balances ===\n", args.exchange);
    if rows.is_empty() {
        println!("No non-zero balances.");
        println!();
        return Ok(());
    }

    println!("{:<10} {:>24}", "Asset", "Available");
    println!("{}", "=".repeat(35));
    for (asset, amount) in &rows {
        println!("{:<10} {:>24}", asset.as_str(), amount.normalize());
    }
    let non_zero = rows.iter().filter(|(_, amount)| **amount > Decimal::ZERO).count();
    println!("{}", "-".repeat(35));
    println!("{:<10} {:>24}", "Assets", non_zero);
    println!();

    Ok(())
}
