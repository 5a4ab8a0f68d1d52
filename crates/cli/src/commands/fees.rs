//! Withdrawal fee table for the supported exchanges.

use anyhow::Result;
use clap::Args;
use rust_decimal::Decimal;
use serde::Serialize;
use spreadwatch_core::ExchangeId;
use spreadwatch_exchange_rest::VenueProfile;

/// Arguments for the fees command.
#[derive(Args, Debug, Clone)]
pub struct FeesArgs {
    /// Only show this exchange
    #[arg(short, long)]
    pub exchange: Option<ExchangeId>,

    /// Only show this asset, e.g. BTC
    #[arg(short, long)]
    pub asset: Option<String>,

    /// Print JSON instead of a table
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
struct FeeRow {
    exchange: ExchangeId,
    asset: &'static str,
    fee: Decimal,
}

fn fee_rows(exchange: Option<ExchangeId>, asset: Option<&str>) -> Vec<FeeRow> {
    ExchangeId::ALL
        .into_iter()
        .filter(|id| exchange.map_or(true, |wanted| wanted == *id))
        .flat_map(|id| {
            VenueProfile::for_exchange(id)
                .withdrawal_fees
                .iter()
                .map(move |(code, fee)| FeeRow {
                    exchange: id,
                    asset: *code,
                    fee: *fee,
                })
        })
        .filter(|row| asset.map_or(true, |wanted| row.asset.eq_ignore_ascii_case(wanted)))
        .collect()
}

/// Prints the withdrawal fee table.
///
/// # Errors
/// Returns an error only if JSON encoding fails.
pub fn run_fees(args: &FeesArgs) -> Result<()> {
    let rows = fee_rows(args.exchange, args.asset.as_deref());

    if args.json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    if rows.is_empty() {
        println!("No withdrawal fees match the given filters.");
        return Ok(());
    }

    println!("\n=== Withdrawal Fees ===\n");
    println!("{:<12} {:<8} {:>14}", "Exchange", "Asset", "Fee");
    println!("{}", "=".repeat(36));
    for row in &rows {
        println!("{:<12} {:<8} {:>14}", row.exchange.as_str(), row.asset, row.fee);
    }
    println!();

    Ok(())
}
