//! Single-sided credit spread.

use serde_json::json;

use super::{
    Rejection, TradeProposal, find_strike, hedge_strike, in_range, max_open_interest,
    sorted_strikes,
};
use crate::domain::decision::model::{CreditSpreadTrade, DecideRequest, QuotedLeg, TradePayload};
use crate::domain::decision::profile::{StrategyTable, is_monthly_expiry};
use crate::domain::decision::reasons;

pub(super) fn evaluate(
    request: &DecideRequest,
    table: &StrategyTable,
) -> Result<TradeProposal, Rejection> {
    if request.instruments.is_empty() || !request.has_valid_spot() {
        return Err(Rejection::new(reasons::INVALID_INPUT));
    }
    let profile = table
        .get(&request.underlying)
        .ok_or_else(|| Rejection::new(reasons::UNSUPPORTED_UNDERLYING))?;
    let params = profile.credit_spread_for(is_monthly_expiry(&request.expiry));
    let side = params.side;
    let strikes_key = format!("available_{}_strikes", side.as_str().to_lowercase());

    let legs: Vec<&QuotedLeg> = request.legs(side).collect();
    let candidates = in_range(
        &legs,
        side,
        request.spot,
        params.min_distance,
        params.max_distance,
    );
    let Some(short) = max_open_interest(&candidates) else {
        return Err(Rejection::with_details(
            reasons::NO_STRIKE_IN_RANGE,
            json!({
                "spot": request.spot,
                strikes_key: sorted_strikes(&legs),
                "required_distance": [params.min_distance, params.max_distance],
            }),
        ));
    };

    let required_hedge = hedge_strike(side, short.strike, params.hedge_gap);
    let Some(hedge) = find_strike(&legs, required_hedge) else {
        return Err(Rejection::with_details(
            reasons::NO_HEDGE_STRIKE,
            json!({
                "short_strike": short.strike,
                "required_hedge": required_hedge,
                strikes_key: sorted_strikes(&legs),
            }),
        ));
    };

    if short.ltp <= 0.0 || hedge.ltp <= 0.0 {
        return Err(Rejection::with_details(
            reasons::INVALID_PREMIUM_DATA,
            json!({ "short_premium": short.ltp, "hedge_premium": hedge.ltp }),
        ));
    }
    if hedge.ltp < params.hedge_min_premium {
        return Err(Rejection::with_details(
            reasons::ILLIQUID_HEDGE,
            json!({ "hedge_premium": hedge.ltp, "threshold": params.hedge_min_premium }),
        ));
    }

    let gross_premium = short.ltp - hedge.ltp;
    let net_premium = gross_premium - params.estimated_cost;
    if net_premium < params.min_net_premium {
        return Err(Rejection::with_details(
            reasons::PREMIUM_TOO_LOW,
            json!({
                "gross_premium": gross_premium,
                "net_premium": net_premium,
                "threshold": params.min_net_premium,
            }),
        ));
    }

    let width = (short.strike - hedge.strike).abs();
    let max_risk = width.mul_add(profile.lot_size, -(gross_premium * profile.lot_size));

    Ok(TradeProposal {
        payload: TradePayload::CreditSpread(CreditSpreadTrade {
            underlying: request.underlying.clone(),
            expiry: request.expiry.clone(),
            spread_type: format!("{side}_CREDIT_SPREAD"),
            short_strike: short.strike,
            hedge_strike: hedge.strike,
            short_premium: short.ltp,
            hedge_premium: hedge.ltp,
            gross_premium,
            net_premium,
            max_risk,
        }),
        max_risk,
    })
}
