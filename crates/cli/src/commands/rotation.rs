//! One-off rotation estimate from command-line rates and fees.

use anyhow::Result;
use clap::Args;
use rust_decimal::Decimal;
use spreadwatch_arbitrage_cross::{
    RotationEstimator, RotationRequest, Solver, DEFAULT_CURVE_POINTS, DEFAULT_CURVE_STEP,
};
use spreadwatch_core::{PairId, RotationOrdering};

/// Arguments for the rotation command.
#[derive(Args, Debug, Clone)]
pub struct RotationArgs {
    /// Pair symbol, e.g. ETHBTC
    #[arg(long, default_value = "ETHBTC")]
    pub pair: String,

    /// Rate on the exchange quoting the pair highest
    #[arg(long)]
    pub rate_high: Decimal,

    /// Rate on the exchange quoting the pair lowest
    #[arg(long)]
    pub rate_low: Decimal,

    /// Quote-asset withdrawal fee on the high exchange
    #[arg(long)]
    pub fee_high: Decimal,

    /// Base-asset withdrawal fee on the low exchange
    #[arg(long)]
    pub fee_low: Decimal,

    /// Target gain in quote-asset units
    #[arg(long, default_value = "0.001")]
    pub min_gain: Decimal,

    /// Fee ordering: a, b, c, d or the snake_case name
    #[arg(long, default_value = "withdraw_then_convert")]
    pub ordering: RotationOrdering,

    /// closed_form, scan or bisection
    #[arg(long, default_value = "closed_form")]
    pub solver: Solver,

    /// Also print the gain curve sampled from zero
    #[arg(long)]
    pub curve: bool,

    /// Print JSON instead of a table
    #[arg(long)]
    pub json: bool,
}

impl RotationArgs {
    fn request(&self) -> RotationRequest {
        RotationRequest {
            pair: PairId::new(&self.pair),
            fee_high: self.fee_high,
            fee_low: self.fee_low,
            rate_high: self.rate_high,
            rate_low: self.rate_low,
            min_gain: self.min_gain,
        }
    }
}

/// Solves one rotation and prints the result.
///
/// # Errors
/// Returns an error when the rotation has no solution or JSON encoding fails.
pub fn run_rotation(args: &RotationArgs) -> Result<()> {
    let request = args.request();
    let estimator = RotationEstimator::default().with_ordering(args.ordering);
    let result = estimator.estimate_with(&request, args.solver)?;
    let curve = if args.curve {
        Some(estimator.gain_curve(&request, DEFAULT_CURVE_STEP, DEFAULT_CURVE_POINTS)?)
    } else {
        None
    };

    if args.json {
        let output = serde_json::json!({
            "request": request,
            "result": result,
            "curve": curve,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!("\n=== Rotation {} ===\n", request.pair);
    println!("{:<25} {:>20}", "Rate (high)", request.rate_high);
    println!("{:<25} {:>20}", "Rate (low)", request.rate_low);
    println!("{:<25} {:>20}", "Fee (high, quote)", request.fee_high);
    println!("{:<25} {:>20}", "Fee (low, base)", request.fee_low);
    println!("{:<25} {:>20}", "Target Gain", request.min_gain);
    println!("{}", "-".repeat(46));
    println!("{:<25} {:>20?}", "Ordering", result.ordering);
    println!("{:<25} {:>20?}", "Solver", result.solver);
    println!("{:<25} {:>20}", "Min Investment", result.min_investment.round_dp(12));
    println!("{:<25} {:>20}", "Expected Gain", result.expected_gain.round_dp(12));

    if let Some(points) = curve {
        println!("\n{:>20} {:>20}", "Investment", "Gain");
        println!("{}", "=".repeat(41));
        for point in &points {
            println!("{:>20} {:>20}", point.investment, point.gain.round_dp(12));
        }
    }
    println!();

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Harness {
        #[command(flatten)]
        args: RotationArgs,
    }

    #[test]
    fn test_rotation_args_parse_ordering_and_solver() {
        let harness = Harness::parse_from([
            "rotation",
            "--rate-high",
            "0.0312",
            "--rate-low",
            "0.0305",
            "--fee-high",
            "0.0005",
            "--fee-low",
            "0.01",
            "--ordering",
            "b",
            "--solver",
            "scan",
        ]);
        assert_eq!(harness.args.ordering, RotationOrdering::ConvertThenWithdraw);
        assert_eq!(harness.args.solver, Solver::Scan);
        assert_eq!(harness.args.min_gain, Decimal::new(1, 3));
        assert_eq!(harness.args.request().pair, PairId::new("ETHBTC"));
    }

    #[test]
    fn test_rotation_args_reject_unknown_solver() {
        let parsed = Harness::try_parse_from([
            "rotation",
            "--rate-high",
            "1",
            "--rate-low",
            "1",
            "--fee-high",
            "0",
            "--fee-low",
            "0",
            "--solver",
            "newton",
        ]);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_run_rotation_reports_unprofitable() {
        let harness = Harness::parse_from([
            "rotation",
            "--rate-high",
            "0.0305",
            "--rate-low",
            "0.0312",
            "--fee-high",
            "0.0005",
            "--fee-low",
            "0.01",
        ]);
        assert!(run_rotation(&harness.args).is_err());
    }
}
