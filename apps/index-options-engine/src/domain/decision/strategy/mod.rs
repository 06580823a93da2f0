//! Strategy evaluators and routing.
//!
//! Evaluators select legs and check the trade economics. The shared
//! [`RiskGuard`] runs afterwards so an unattractive trade is reported with
//! its specific reason rather than a generic risk limit.

mod credit_spread;
mod iron_condor;

use serde::{Deserialize, Serialize};

use super::model::{DecideRequest, QuotedLeg, TradePayload};
use super::profile::StrategyTable;
use super::risk::RiskGuard;
use crate::domain::instrument::OptionType;

/// Strikes closer than this are treated as equal.
const STRIKE_EPSILON: f64 = 1e-6;

// =============================================================================
// Types
// =============================================================================

/// Strategy family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StrategyKind {
    /// Single-sided credit spread.
    CreditSpread,
    /// Four-leg iron condor.
    IronCondor,
}

impl StrategyKind {
    /// Wire label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CreditSpread => "CREDIT_SPREAD",
            Self::IronCondor => "IRON_CONDOR",
        }
    }
}

impl std::fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed strategy rejection.
#[derive(Debug, Clone, PartialEq)]
pub struct Rejection {
    /// Reason code.
    pub reason: String,
    /// Diagnostics.
    pub payload: Option<TradePayload>,
}

impl Rejection {
    /// Rejection without diagnostics.
    #[must_use]
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            payload: None,
        }
    }

    /// Rejection carrying diagnostics.
    #[must_use]
    pub fn with_details(reason: impl Into<String>, details: serde_json::Value) -> Self {
        Self {
            reason: reason.into(),
            payload: Some(TradePayload::Diagnostics(details)),
        }
    }
}

/// Proposal that cleared strategy economics, before the risk guard.
#[derive(Debug, Clone, PartialEq)]
pub struct TradeProposal {
    /// Payload returned on success.
    pub payload: TradePayload,
    /// Worst-case loss for one lot.
    pub max_risk: f64,
}

/// Inputs shared by every evaluation.
#[derive(Debug, Clone, Copy)]
pub struct EvaluationContext<'a> {
    /// Per-underlying profiles.
    pub table: &'a StrategyTable,
    /// Final risk gate.
    pub guard: &'a RiskGuard,
    /// Realized loss so far this month.
    pub monthly_loss: f64,
}

// =============================================================================
// Routing
// =============================================================================

/// Chooses which strategy evaluates a request.
pub trait StrategyRouter: Send + Sync {
    /// Strategy for `request`.
    fn route(&self, request: &DecideRequest) -> StrategyKind;
}

/// Range-bound heuristic: spot sitting close to a round hundred selects the
/// iron condor. Stand-in for a market-regime classifier; any
/// [`StrategyRouter`] can replace it without touching the evaluators.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpotBandRouter {
    /// Rounding step.
    pub modulus: f64,
    /// Remainder below which the market is treated as range-bound.
    pub band: f64,
}

impl Default for SpotBandRouter {
    fn default() -> Self {
        Self {
            modulus: 100.0,
            band: 40.0,
        }
    }
}

impl StrategyRouter for SpotBandRouter {
    fn route(&self, request: &DecideRequest) -> StrategyKind {
        if (request.spot % self.modulus).abs() < self.band {
            StrategyKind::IronCondor
        } else {
            StrategyKind::CreditSpread
        }
    }
}

// =============================================================================
// Evaluation
// =============================================================================

/// Run the `kind` evaluator, then the risk guard.
///
/// # Errors
///
/// Returns the [`Rejection`] produced by the evaluator or the guard.
pub fn evaluate(
    kind: StrategyKind,
    request: &DecideRequest,
    ctx: &EvaluationContext<'_>,
) -> Result<TradePayload, Rejection> {
    let proposal = match kind {
        StrategyKind::CreditSpread => credit_spread::evaluate(request, ctx.table)?,
        StrategyKind::IronCondor => iron_condor::evaluate(request, ctx.table)?,
    };
    ctx.guard
        .check(proposal.max_risk, ctx.monthly_loss)
        .map_err(Rejection::new)?;
    Ok(proposal.payload)
}

// =============================================================================
// Leg selection
// =============================================================================

/// Distance from spot, positive when out of the money.
fn distance_from_spot(side: OptionType, spot: f64, strike: f64) -> f64 {
    match side {
        OptionType::Put => spot - strike,
        OptionType::Call => strike - spot,
    }
}

/// Hedge strike further out of the money than `short_strike`.
fn hedge_strike(side: OptionType, short_strike: f64, gap: f64) -> f64 {
    match side {
        OptionType::Put => short_strike - gap,
        OptionType::Call => short_strike + gap,
    }
}

/// Legs of `side` whose distance from spot lies in `[min, max]`.
fn in_range<'a>(
    legs: &[&'a QuotedLeg],
    side: OptionType,
    spot: f64,
    min: f64,
    max: f64,
) -> Vec<&'a QuotedLeg> {
    legs.iter()
        .copied()
        .filter(|leg| {
            let distance = distance_from_spot(side, spot, leg.strike);
            (min..=max).contains(&distance)
        })
        .collect()
}

/// Leg with the highest open interest. On ties the earliest leg in request
/// order wins.
fn max_open_interest<'a>(candidates: &[&'a QuotedLeg]) -> Option<&'a QuotedLeg> {
    candidates.iter().copied().fold(None, |best, leg| match best {
        Some(current) if leg.open_interest() > current.open_interest() => Some(leg),
        Some(current) => Some(current),
        None => Some(leg),
    })
}

/// First leg at `strike`.
fn find_strike<'a>(legs: &[&'a QuotedLeg], strike: f64) -> Option<&'a QuotedLeg> {
    legs.iter()
        .copied()
        .find(|leg| (leg.strike - strike).abs() < STRIKE_EPSILON)
}

/// Sorted, de-duplicated strikes for diagnostics.
fn sorted_strikes(legs: &[&QuotedLeg]) -> Vec<f64> {
    let mut strikes: Vec<f64> = legs.iter().map(|leg| leg.strike).collect();
    strikes.sort_by(f64::total_cmp);
    strikes.dedup_by(|a, b| (*a - *b).abs() < STRIKE_EPSILON);
    strikes
}
