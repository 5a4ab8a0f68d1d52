//! Break-even estimation for a round trip across two exchanges.
//!
//! A rotation commits `a` units of the quote asset on the high exchange,
//! moves it to the low exchange, buys the base asset there, moves that back
//! and sells it at the high rate. Both moves pay a flat withdrawal fee. The
//! estimator finds the smallest `a` whose round trip gains at least the
//! pair's `min_gain`.
//!
//! Every supported ordering of fee and conversion steps is affine in `a`:
//!
//! ```text
//! result(a) = m * a + c        with m = rate_high / rate_low
//! gain(a)   = (m - 1) * a + c
//! ```
//!
//! so the minimum investment has a closed form whenever `m > 1`. The grid
//! scan and bisection solvers exist as bounded cross-checks and for callers
//! that want to reproduce the historic stepping behaviour.

use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use spreadwatch_core::{AssetId, ExchangeId, PairId, RotationConfig, RotationOrdering};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tracing::debug;

use crate::fees::FeeSchedule;
use crate::ticker_store::TradingPairView;

// =============================================================================
// Constants
// =============================================================================

/// Grid step of the gain curve.
pub const DEFAULT_CURVE_STEP: Decimal = dec!(0.01);

/// Upper bound on points produced by [`RotationEstimator::gain_curve`].
pub const DEFAULT_CURVE_POINTS: usize = 10_000;

/// Decimal places the closed-form investment is rounded up to.
const CLOSED_FORM_DP: u32 = 12;

/// Bisection stops once the bracket is this narrow.
const BISECTION_TOLERANCE: Decimal = dec!(0.000000000001);

/// Doublings allowed while searching for an upper bracket.
const MAX_DOUBLINGS: u32 = 64;

// =============================================================================
// Errors
// =============================================================================

/// Why a rotation cannot reach its minimum gain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoSolutionReason {
    /// A rate is zero or negative.
    NonPositiveRate,
    /// The high rate does not exceed the low rate.
    InvertedRates,
    /// Gain never reached the target within the iteration cap.
    IterationCapReached,
    /// Intermediate values left the representable range.
    Overflow,
}

impl fmt::Display for NoSolutionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::NonPositiveRate => "rates must be positive",
            Self::InvertedRates => "high rate does not exceed low rate",
            Self::IterationCapReached => "minimum gain not reached within the iteration cap",
            Self::Overflow => "arithmetic overflow",
        };
        f.write_str(text)
    }
}

/// Errors produced while estimating a rotation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RotationError {
    /// No investment reaches the minimum gain ("not profitable").
    #[error("no opportunity for {pair}: {reason}")]
    NoSolution {
        pair: PairId,
        reason: NoSolutionReason,
    },

    /// The pair has no two-exchange spread to rotate over.
    #[error("no spread between two exchanges for {0}")]
    UndefinedSpread(PairId),

    /// An exchange has no withdrawal fee for an asset the rotation moves.
    #[error("no withdrawal fee for {asset} on {exchange}")]
    MissingFee {
        exchange: ExchangeId,
        asset: AssetId,
    },
}

// =============================================================================
// Request and Result
// =============================================================================

/// Inputs of one estimate. Stateless and cheap to build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RotationRequest {
    pub pair: PairId,
    /// Withdrawal fee for the quote asset on the high exchange.
    pub fee_high: Decimal,
    /// Withdrawal fee for the base asset on the low exchange.
    pub fee_low: Decimal,
    pub rate_high: Decimal,
    pub rate_low: Decimal,
    pub min_gain: Decimal,
}

impl RotationRequest {
    /// Builds a request from a pair's current spread and the fee table.
    pub fn from_view(view: &TradingPairView, fees: &FeeSchedule) -> Result<Self, RotationError> {
        let (high, low) = match (view.current_high, view.current_low) {
            (Some(high), Some(low)) if high.exchange != low.exchange => (high, low),
            _ => return Err(RotationError::UndefinedSpread(view.pair.clone())),
        };

        let (fee_high, fee_low) = fees.rotation_fees(&view.pair, high.exchange, low.exchange)?;

        Ok(Self {
            pair: view.pair.clone(),
            fee_high,
            fee_low,
            rate_high: high.value,
            rate_low: low.value,
            min_gain: view.min_gain,
        })
    }

    fn check_rates(&self) -> Result<(), RotationError> {
        if self.rate_high <= Decimal::ZERO || self.rate_low <= Decimal::ZERO {
            return Err(self.no_solution(NoSolutionReason::NonPositiveRate));
        }
        if self.rate_high <= self.rate_low {
            return Err(self.no_solution(NoSolutionReason::InvertedRates));
        }
        Ok(())
    }

    fn no_solution(&self, reason: NoSolutionReason) -> RotationError {
        RotationError::NoSolution {
            pair: self.pair.clone(),
            reason,
        }
    }
}

/// Algorithm used to find the minimum investment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Solver {
    #[default]
    ClosedForm,
    Scan,
    Bisection,
}

/// Returned when a solver name is not recognised.
#[derive(Debug, Error)]
#[error("unknown solver '{0}' (expected closed_form, scan or bisection)")]
pub struct UnknownSolver(String);

impl FromStr for Solver {
    type Err = UnknownSolver;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "closed_form" | "closed" => Ok(Self::ClosedForm),
            "scan" => Ok(Self::Scan),
            "bisection" | "bisect" => Ok(Self::Bisection),
            other => Err(UnknownSolver(other.to_string())),
        }
    }
}

/// Minimum investment and the gain it realizes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RotationResult {
    pub pair: PairId,
    pub min_investment: Decimal,
    pub expected_gain: Decimal,
    pub ordering: RotationOrdering,
    pub solver: Solver,
}

/// One sample of the gain curve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GainPoint {
    pub investment: Decimal,
    pub gain: Decimal,
}

// =============================================================================
// Round Trip Formulas
// =============================================================================

/// Amount returned by a round trip of `a` under `ordering`.
///
/// `None` when a division by zero or an overflow occurs.
#[must_use]
pub fn round_trip(ordering: RotationOrdering, a: Decimal, req: &RotationRequest) -> Option<Decimal> {
    let (fee_high, fee_low) = (req.fee_high, req.fee_low);
    let (rate_high, rate_low) = (req.rate_high, req.rate_low);

    match ordering {
        RotationOrdering::WithdrawThenConvert => a
            .checked_sub(fee_high)?
            .checked_div(rate_low)?
            .checked_sub(fee_low)?
            .checked_mul(rate_high),
        RotationOrdering::ConvertThenWithdraw => a
            .checked_div(rate_low)?
            .checked_sub(fee_low)?
            .checked_mul(rate_high)?
            .checked_sub(fee_high),
        RotationOrdering::LowFeeFirst => a
            .checked_sub(fee_low)?
            .checked_mul(rate_high)?
            .checked_sub(fee_high)?
            .checked_div(rate_low),
        RotationOrdering::HighRateFirst => a
            .checked_mul(rate_high)?
            .checked_sub(fee_high)?
            .checked_div(rate_low)?
            .checked_sub(fee_low),
    }
}

/// `round_trip(a) - a`.
#[must_use]
pub fn gain(ordering: RotationOrdering, a: Decimal, req: &RotationRequest) -> Option<Decimal> {
    round_trip(ordering, a, req)?.checked_sub(a)
}

// =============================================================================
// Estimator
// =============================================================================

/// Finds the minimum investment for a rotation.
#[derive(Debug, Clone)]
pub struct RotationEstimator {
    ordering: RotationOrdering,
    scan_step: Decimal,
    max_iterations: u32,
}

impl Default for RotationEstimator {
    fn default() -> Self {
        Self::from_config(&RotationConfig::default())
    }
}

impl RotationEstimator {
    #[must_use]
    pub fn from_config(config: &RotationConfig) -> Self {
        Self {
            ordering: config.ordering,
            scan_step: config.scan_step,
            max_iterations: config.max_iterations,
        }
    }

    #[must_use]
    pub fn with_ordering(mut self, ordering: RotationOrdering) -> Self {
        self.ordering = ordering;
        self
    }

    #[must_use]
    pub fn with_scan_step(mut self, step: Decimal) -> Self {
        self.scan_step = step;
        self
    }

    #[must_use]
    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    #[must_use]
    pub fn ordering(&self) -> RotationOrdering {
        self.ordering
    }

    #[must_use]
    pub fn scan_step(&self) -> Decimal {
        self.scan_step
    }

    /// Estimates with the closed-form solver.
    pub fn estimate(&self, req: &RotationRequest) -> Result<RotationResult, RotationError> {
        self.estimate_with(req, Solver::ClosedForm)
    }

    pub fn estimate_with(
        &self,
        req: &RotationRequest,
        solver: Solver,
    ) -> Result<RotationResult, RotationError> {
        req.check_rates()?;

        let (min_investment, expected_gain) = match solver {
            Solver::ClosedForm => self.closed_form(req)?,
            Solver::Scan => self.scan(req)?,
            Solver::Bisection => self.bisect(req)?,
        };

        debug!(
            pair = %req.pair,
            solver = ?solver,
            ordering = ?self.ordering,
            min_investment = %min_investment,
            expected_gain = %expected_gain,
            "Rotation estimated"
        );

        Ok(RotationResult {
            pair: req.pair.clone(),
            min_investment,
            expected_gain,
            ordering: self.ordering,
            solver,
        })
    }

    fn gain_at(&self, a: Decimal, req: &RotationRequest) -> Result<Decimal, RotationError> {
        gain(self.ordering, a, req).ok_or_else(|| req.no_solution(NoSolutionReason::Overflow))
    }

    /// Solves `gain(a) = min_gain` exactly, floored at zero and rounded up so
    /// the returned investment always meets the target.
    fn closed_form(&self, req: &RotationRequest) -> Result<(Decimal, Decimal), RotationError> {
        let intercept = self.gain_at(Decimal::ZERO, req)?;
        let slope = self
            .gain_at(Decimal::ONE, req)?
            .checked_sub(intercept)
            .ok_or_else(|| req.no_solution(NoSolutionReason::Overflow))?;

        if slope <= Decimal::ZERO {
            return Err(req.no_solution(NoSolutionReason::InvertedRates));
        }

        let raw = req
            .min_gain
            .checked_sub(intercept)
            .and_then(|needed| needed.checked_div(slope))
            .ok_or_else(|| req.no_solution(NoSolutionReason::Overflow))?;

        let mut investment = raw
            .max(Decimal::ZERO)
            .round_dp_with_strategy(CLOSED_FORM_DP, RoundingStrategy::AwayFromZero);
        let mut realized = self.gain_at(investment, req)?;

        // The slope is itself rounded at 28 digits, so nudge by one unit if needed.
        if realized < req.min_gain {
            investment += Decimal::new(1, CLOSED_FORM_DP);
            realized = self.gain_at(investment, req)?;
        }

        Ok((investment, realized))
    }

    /// Steps from `rate_high - rate_low` by the scan step and returns the
    /// first grid value reaching the target.
    fn scan(&self, req: &RotationRequest) -> Result<(Decimal, Decimal), RotationError> {
        let mut investment = req.rate_high - req.rate_low;

        for _ in 0..self.max_iterations {
            let realized = self.gain_at(investment, req)?;
            if realized >= req.min_gain {
                return Ok((investment, realized));
            }
            investment = investment
                .checked_add(self.scan_step)
                .ok_or_else(|| req.no_solution(NoSolutionReason::Overflow))?;
        }

        Err(req.no_solution(NoSolutionReason::IterationCapReached))
    }

    /// Brackets the target by doubling, then bisects to a 1e-12 bracket.
    fn bisect(&self, req: &RotationRequest) -> Result<(Decimal, Decimal), RotationError> {
        let at_zero = self.gain_at(Decimal::ZERO, req)?;
        if at_zero >= req.min_gain {
            return Ok((Decimal::ZERO, at_zero));
        }

        let mut hi = Decimal::ONE;
        let mut doublings = 0;
        while self.gain_at(hi, req)? < req.min_gain {
            doublings += 1;
            if doublings > MAX_DOUBLINGS {
                return Err(req.no_solution(NoSolutionReason::IterationCapReached));
            }
            hi = hi
                .checked_mul(Decimal::TWO)
                .ok_or_else(|| req.no_solution(NoSolutionReason::Overflow))?;
        }

        let mut lo = Decimal::ZERO;
        let mut iterations = 0;
        while hi - lo > BISECTION_TOLERANCE && iterations < self.max_iterations {
            let mid = (lo + hi) / Decimal::TWO;
            if self.gain_at(mid, req)? >= req.min_gain {
                hi = mid;
            } else {
                lo = mid;
            }
            iterations += 1;
        }

        Ok((hi, self.gain_at(hi, req)?))
    }

    /// Samples `gain(a)` from zero in steps of `step` until the target is
    /// reached or `max_points` samples exist. The satisfying point, if any,
    /// is the last one.
    pub fn gain_curve(
        &self,
        req: &RotationRequest,
        step: Decimal,
        max_points: usize,
    ) -> Result<Vec<GainPoint>, RotationError> {
        if req.rate_high <= Decimal::ZERO || req.rate_low <= Decimal::ZERO {
            return Err(req.no_solution(NoSolutionReason::NonPositiveRate));
        }

        let mut points = Vec::new();
        let mut investment = Decimal::ZERO;
        while points.len() < max_points {
            let realized = self.gain_at(investment, req)?;
            points.push(GainPoint {
                investment,
                gain: realized,
            });
            if realized >= req.min_gain {
                break;
            }
            investment = investment
                .checked_add(step)
                .ok_or_else(|| req.no_solution(NoSolutionReason::Overflow))?;
        }
        Ok(points)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ticker_store::Level;
    use std::collections::BTreeMap;

    fn p5_request() -> RotationRequest {
        RotationRequest {
            pair: PairId::new("DASHBTC"),
            fee_high: dec!(0.0005),
            fee_low: dec!(0.005),
            rate_high: dec!(0.0209),
            rate_low: dec!(0.0207),
            min_gain: dec!(0.002),
        }
    }

    const ORDERINGS: [RotationOrdering; 4] = [
        RotationOrdering::WithdrawThenConvert,
        RotationOrdering::ConvertThenWithdraw,
        RotationOrdering::LowFeeFirst,
        RotationOrdering::HighRateFirst,
    ];

    #[test]
    fn test_round_trip_formulas() {
        let req = p5_request();
        let a = dec!(1);

        // (((1 - 0.0005) / 0.0207) - 0.005) * 0.0209
        let expected = ((a - req.fee_high) / req.rate_low - req.fee_low) * req.rate_high;
        assert_eq!(
            round_trip(RotationOrdering::WithdrawThenConvert, a, &req),
            Some(expected)
        );

        let expected = (a / req.rate_low - req.fee_low) * req.rate_high - req.fee_high;
        assert_eq!(
            round_trip(RotationOrdering::ConvertThenWithdraw, a, &req),
            Some(expected)
        );

        let expected = ((a - req.fee_low) * req.rate_high - req.fee_high) / req.rate_low;
        assert_eq!(round_trip(RotationOrdering::LowFeeFirst, a, &req), Some(expected));

        let expected = (a * req.rate_high - req.fee_high) / req.rate_low - req.fee_low;
        assert_eq!(round_trip(RotationOrdering::HighRateFirst, a, &req), Some(expected));
    }

    #[test]
    fn test_round_trip_zero_rate_is_none() {
        let mut req = p5_request();
        req.rate_low = Decimal::ZERO;
        assert!(round_trip(RotationOrdering::WithdrawThenConvert, dec!(1), &req).is_none());
    }

    #[test]
    fn test_closed_form_matches_scan_within_one_step() {
        let estimator = RotationEstimator::default();
        let req = p5_request();

        let closed = estimator.estimate(&req).unwrap();
        let scanned = estimator.estimate_with(&req, Solver::Scan).unwrap();

        assert!(closed.expected_gain >= req.min_gain);
        assert!(scanned.expected_gain >= req.min_gain);
        assert!(scanned.min_investment >= closed.min_investment);
        assert!(scanned.min_investment - closed.min_investment <= estimator.scan_step());

        // 0.00260933 / 0.00966183 is just above 0.27; the grid from 0.0002 lands on 0.2702.
        assert!(closed.min_investment > dec!(0.27) && closed.min_investment < dec!(0.2701));
        assert_eq!(scanned.min_investment, dec!(0.2702));
        assert_eq!(closed.solver, Solver::ClosedForm);
        assert_eq!(closed.ordering, RotationOrdering::WithdrawThenConvert);
    }

    #[test]
    fn test_closed_form_is_minimal() {
        let estimator = RotationEstimator::default();
        let req = p5_request();
        let closed = estimator.estimate(&req).unwrap();

        let below = closed.min_investment - dec!(0.000001);
        let gain_below = gain(estimator.ordering(), below, &req).unwrap();
        assert!(gain_below < req.min_gain);
    }

    #[test]
    fn test_bisection_agrees_with_closed_form() {
        let estimator = RotationEstimator::default();
        let req = p5_request();

        let closed = estimator.estimate(&req).unwrap();
        let bisected = estimator.estimate_with(&req, Solver::Bisection).unwrap();

        assert!(bisected.expected_gain >= req.min_gain);
        assert!((bisected.min_investment - closed.min_investment).abs() <= dec!(0.000000001));
    }

    #[test]
    fn test_every_ordering_solves_p5() {
        let req = p5_request();
        for ordering in ORDERINGS {
            let estimator = RotationEstimator::default().with_ordering(ordering);
            for solver in [Solver::ClosedForm, Solver::Scan, Solver::Bisection] {
                let result = estimator.estimate_with(&req, solver).unwrap();
                assert!(
                    result.expected_gain >= req.min_gain,
                    "{ordering:?}/{solver:?} fell short"
                );
                assert!(result.min_investment >= Decimal::ZERO);
            }
        }
    }

    #[test]
    fn test_inverted_rates_report_no_opportunity() {
        let estimator = RotationEstimator::default();
        let req = RotationRequest {
            rate_high: dec!(0.02),
            rate_low: dec!(0.021),
            ..p5_request()
        };

        for solver in [Solver::ClosedForm, Solver::Scan, Solver::Bisection] {
            let err = estimator.estimate_with(&req, solver).unwrap_err();
            assert_eq!(
                err,
                RotationError::NoSolution {
                    pair: req.pair.clone(),
                    reason: NoSolutionReason::InvertedRates,
                }
            );
        }
    }

    #[test]
    fn test_equal_rates_report_no_opportunity() {
        let req = RotationRequest {
            rate_high: dec!(0.0207),
            ..p5_request()
        };
        let err = RotationEstimator::default().estimate(&req).unwrap_err();
        assert!(matches!(
            err,
            RotationError::NoSolution {
                reason: NoSolutionReason::InvertedRates,
                ..
            }
        ));
    }

    #[test]
    fn test_non_positive_rate_rejected() {
        let req = RotationRequest {
            rate_low: Decimal::ZERO,
            ..p5_request()
        };
        let err = RotationEstimator::default().estimate(&req).unwrap_err();
        assert!(matches!(
            err,
            RotationError::NoSolution {
                reason: NoSolutionReason::NonPositiveRate,
                ..
            }
        ));
    }

    #[test]
    fn test_scan_stops_at_iteration_cap() {
        // A tiny spread with large fees needs an investment far past the capped grid.
        let req = RotationRequest {
            rate_high: dec!(0.020701),
            fee_low: dec!(5),
            ..p5_request()
        };
        let estimator = RotationEstimator::default().with_max_iterations(1_000);

        let err = estimator.estimate_with(&req, Solver::Scan).unwrap_err();
        assert!(matches!(
            err,
            RotationError::NoSolution {
                reason: NoSolutionReason::IterationCapReached,
                ..
            }
        ));

        // The closed form still answers.
        let closed = estimator.estimate(&req).unwrap();
        assert!(closed.expected_gain >= req.min_gain);
    }

    #[test]
    fn test_zero_fees_with_zero_target_need_no_investment() {
        let req = RotationRequest {
            fee_high: Decimal::ZERO,
            fee_low: Decimal::ZERO,
            min_gain: Decimal::ZERO,
            ..p5_request()
        };
        let result = RotationEstimator::default().estimate(&req).unwrap();
        assert_eq!(result.min_investment, Decimal::ZERO);
        assert_eq!(result.expected_gain, Decimal::ZERO);
    }

    #[test]
    fn test_gain_curve_ends_at_first_satisfying_point() {
        let estimator = RotationEstimator::default();
        let req = p5_request();

        let curve = estimator
            .gain_curve(&req, DEFAULT_CURVE_STEP, DEFAULT_CURVE_POINTS)
            .unwrap();

        assert_eq!(curve[0].investment, Decimal::ZERO);
        let last = curve.last().unwrap();
        assert!(last.gain >= req.min_gain);
        assert!(curve[..curve.len() - 1].iter().all(|p| p.gain < req.min_gain));
        // First multiple of 0.01 above ~0.27007.
        assert_eq!(last.investment, dec!(0.28));
    }

    #[test]
    fn test_gain_curve_is_capped_for_inverted_rates() {
        let req = RotationRequest {
            rate_high: dec!(0.02),
            rate_low: dec!(0.021),
            ..p5_request()
        };
        let curve = RotationEstimator::default()
            .gain_curve(&req, DEFAULT_CURVE_STEP, 50)
            .unwrap();
        assert_eq!(curve.len(), 50);
        assert!(curve.windows(2).all(|w| w[1].gain < w[0].gain));
    }

    #[test]
    fn test_request_from_view() {
        let now = chrono::Utc::now();
        let view = TradingPairView {
            pair: PairId::new("ETHBTC"),
            exchanges: vec![ExchangeId::Bittrex, ExchangeId::Bitfinex],
            quotes: BTreeMap::new(),
            lowest_ever: None,
            highest_ever: None,
            current_low: Some(Level {
                value: dec!(0.0305),
                exchange: ExchangeId::Bitfinex,
            }),
            current_high: Some(Level {
                value: dec!(0.0312),
                exchange: ExchangeId::Bittrex,
            }),
            spread: Some(dec!(0.0007)),
            threshold: dec!(0.0003),
            min_gain: dec!(0.001),
            threshold_active: true,
            last_notified_at: Some(now),
        };
        let fees = FeeSchedule::new()
            .with_fee(ExchangeId::Bittrex, "BTC", dec!(0.0005))
            .with_fee(ExchangeId::Bitfinex, "ETH", dec!(0.01));

        let req = RotationRequest::from_view(&view, &fees).unwrap();
        assert_eq!(req.rate_high, dec!(0.0312));
        assert_eq!(req.rate_low, dec!(0.0305));
        assert_eq!(req.fee_high, dec!(0.0005));
        assert_eq!(req.fee_low, dec!(0.01));
        assert_eq!(req.min_gain, dec!(0.001));

        let single = TradingPairView {
            current_high: view.current_low,
            ..view
        };
        assert_eq!(
            RotationRequest::from_view(&single, &fees).unwrap_err(),
            RotationError::UndefinedSpread(PairId::new("ETHBTC"))
        );
    }

    #[test]
    fn test_solver_parse() {
        assert_eq!("closed-form".parse::<Solver>().unwrap(), Solver::ClosedForm);
        assert_eq!("SCAN".parse::<Solver>().unwrap(), Solver::Scan);
        assert_eq!("bisect".parse::<Solver>().unwrap(), Solver::Bisection);
        assert!("newton".parse::<Solver>().is_err());
    }
}
