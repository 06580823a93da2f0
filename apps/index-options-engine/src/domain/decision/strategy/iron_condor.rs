//! Four-leg iron condor.

use serde_json::json;

use super::{Rejection, TradeProposal, find_strike, hedge_strike, in_range, max_open_interest};
use crate::domain::decision::model::{DecideRequest, IronCondorTrade, QuotedLeg, TradePayload};
use crate::domain::decision::profile::{IronCondorParams, StrategyTable};
use crate::domain::decision::reasons;
use crate::domain::instrument::OptionType;

struct Side<'a> {
    short: &'a QuotedLeg,
    hedge: &'a QuotedLeg,
}

/// Short/hedge pair on one side, or the side-specific rejection reason.
fn select_side<'a>(
    legs: &[&'a QuotedLeg],
    side: OptionType,
    spot: f64,
    params: &IronCondorParams,
) -> Result<Side<'a>, &'static str> {
    let (no_range, no_hedge) = match side {
        OptionType::Put => (reasons::NO_PE_RANGE, reasons::NO_PE_HEDGE),
        OptionType::Call => (reasons::NO_CE_RANGE, reasons::NO_CE_HEDGE),
    };
    let candidates = in_range(legs, side, spot, params.min_distance, params.max_distance);
    let short = max_open_interest(&candidates).ok_or(no_range)?;
    let hedge = find_strike(legs, hedge_strike(side, short.strike, params.hedge_gap))
        .ok_or(no_hedge)?;
    Ok(Side { short, hedge })
}

pub(super) fn evaluate(
    request: &DecideRequest,
    table: &StrategyTable,
) -> Result<TradeProposal, Rejection> {
    if !request.has_valid_spot() {
        return Err(Rejection::new(reasons::INVALID_INPUT));
    }
    let profile = table
        .get(&request.underlying)
        .ok_or_else(|| Rejection::new(reasons::UNSUPPORTED_UNDERLYING))?;
    let params = &profile.iron_condor;

    let puts: Vec<&QuotedLeg> = request.legs(OptionType::Put).collect();
    let calls: Vec<&QuotedLeg> = request.legs(OptionType::Call).collect();
    if puts.is_empty() || calls.is_empty() {
        return Err(Rejection::new(reasons::MISSING_LEGS));
    }

    let put_side =
        select_side(&puts, OptionType::Put, request.spot, params).map_err(Rejection::new)?;
    let call_side =
        select_side(&calls, OptionType::Call, request.spot, params).map_err(Rejection::new)?;

    let gross_premium = put_side.short.ltp + call_side.short.ltp
        - put_side.hedge.ltp
        - call_side.hedge.ltp;
    let net_premium = gross_premium - params.estimated_cost;
    if net_premium < params.min_net_premium {
        return Err(Rejection::new(reasons::PREMIUM_TOO_LOW));
    }

    let max_risk = params
        .hedge_gap
        .mul_add(profile.lot_size, -(gross_premium * profile.lot_size));
    if max_risk > params.max_risk {
        return Err(Rejection::with_details(
            reasons::RISK_TOO_HIGH,
            json!({ "max_risk": max_risk }),
        ));
    }

    Ok(TradeProposal {
        payload: TradePayload::IronCondor(IronCondorTrade {
            short_pe: put_side.short.strike,
            hedge_pe: put_side.hedge.strike,
            short_ce: call_side.short.strike,
            hedge_ce: call_side.hedge.strike,
            net_premium,
            max_risk,
        }),
        max_risk,
    })
}
