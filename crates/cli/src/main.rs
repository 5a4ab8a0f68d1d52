use clap::{Parser, Subcommand};

mod commands;

use commands::{BalanceArgs, CheckConfigArgs, FeesArgs, QuoteArgs, RotationArgs, RunArgs};

#[derive(Parser)]
#[command(name = "spreadwatch")]
#[command(about = "Cross-exchange ticker spreads and rotation estimates", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll every configured exchange and report spread alerts
    Run(RunArgs),
    /// Estimate the minimum investment for one rotation
    Rotation(RotationArgs),
    /// Fetch the latest quote for a pair from one exchange
    Quote(QuoteArgs),
    /// Show withdrawal fees per exchange and asset
    Fees(FeesArgs),
    /// Fetch account balances using API credentials
    Balance(BalanceArgs),
    /// Validate a configuration file
    CheckConfig(CheckConfigArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    match cli.command {
        Commands::Run(args) => commands::run_monitor(args).await?,
        Commands::Rotation(args) => commands::run_rotation(&args)?,
        Commands::Quote(args) => commands::run_quote(args).await?,
        Commands::Fees(args) => commands::run_fees(&args)?,
        Commands::Balance(args) => commands::run_balance(args).await?,
        Commands::CheckConfig(args) => commands::run_check_config(&args)?,
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_run_with_duration() {
        let cli = Cli::parse_from(["spreadwatch", "run", "--duration", "30m"]);
        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.duration.as_deref(), Some("30m"));
                assert_eq!(args.config, spreadwatch_core::DEFAULT_CONFIG_PATH);
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn test_parse_quote_exchange_name() {
        let cli = Cli::parse_from(["spreadwatch", "quote", "-e", "KRAKEN", "-p", "ETHBTC"]);
        match cli.command {
            Commands::Quote(args) => {
                assert_eq!(args.exchange, spreadwatch_core::ExchangeId::Kraken);
                assert_eq!(args.pair, "ETHBTC");
            }
            _ => panic!("expected quote"),
        }
    }
}
