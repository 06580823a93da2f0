//! Decision request and result records.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::chain::OptionChainSnapshot;
use crate::domain::instrument::OptionType;

// =============================================================================
// Request
// =============================================================================

/// One quoted contract in a decision request.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QuotedLeg {
    /// Strike price.
    pub strike: f64,
    /// Call or put.
    pub opt_type: OptionType,
    /// Last traded price.
    pub ltp: f64,
    /// Open interest; missing counts as zero.
    #[serde(default)]
    pub oi: Option<f64>,
}

impl QuotedLeg {
    /// Open interest with missing treated as zero.
    #[must_use]
    pub fn open_interest(&self) -> f64 {
        self.oi.unwrap_or(0.0)
    }
}

/// Snapshot view evaluated by the decision pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecideRequest {
    /// Underlying symbol.
    pub underlying: String,
    /// Expiry date (`YYYY-MM-DD`).
    pub expiry: String,
    /// Underlying spot.
    pub spot: f64,
    /// Quoted contracts.
    pub instruments: Vec<QuotedLeg>,
}

impl DecideRequest {
    /// Build a request from a published chain. Returns `None` when the
    /// snapshot carries no spot.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn from_snapshot(snapshot: &OptionChainSnapshot) -> Option<Self> {
        let spot = snapshot.spot?;
        let instruments = [OptionType::Put, OptionType::Call]
            .into_iter()
            .flat_map(|option_type| {
                snapshot.legs(option_type).map(move |(strike, leg)| QuotedLeg {
                    strike: strike as f64,
                    opt_type: option_type,
                    ltp: leg.last_price,
                    oi: Some(leg.open_interest as f64),
                })
            })
            .collect();

        Some(Self {
            underlying: snapshot.underlying.clone(),
            expiry: snapshot.expiry.clone(),
            spot,
            instruments,
        })
    }

    /// Spot is a finite positive price.
    #[must_use]
    pub fn has_valid_spot(&self) -> bool {
        self.spot.is_finite() && self.spot > 0.0
    }

    /// Legs of one type, in request order.
    pub fn legs(&self, option_type: OptionType) -> impl Iterator<Item = &QuotedLeg> {
        self.instruments
            .iter()
            .filter(move |leg| leg.opt_type == option_type)
    }
}

// =============================================================================
// Result
// =============================================================================

/// Decision outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    /// Trade proposal emitted.
    Trade,
    /// Typed rejection.
    NoTrade,
    /// Evaluation failed.
    Error,
}

impl Action {
    /// Wire label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Trade => "TRADE",
            Self::NoTrade => "NO_TRADE",
            Self::Error => "ERROR",
        }
    }
}

/// Credit spread proposal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreditSpreadTrade {
    /// Underlying symbol.
    pub underlying: String,
    /// Expiry date.
    pub expiry: String,
    /// `PE_CREDIT_SPREAD` or `CE_CREDIT_SPREAD`.
    #[serde(rename = "type")]
    pub spread_type: String,
    /// Sold strike.
    pub short_strike: f64,
    /// Bought strike.
    pub hedge_strike: f64,
    /// Premium received on the short leg.
    pub short_premium: f64,
    /// Premium paid on the hedge.
    pub hedge_premium: f64,
    /// Short minus hedge premium.
    pub gross_premium: f64,
    /// Gross premium minus estimated costs.
    pub net_premium: f64,
    /// Worst-case loss for one lot.
    pub max_risk: f64,
}

/// Iron condor proposal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IronCondorTrade {
    /// Sold put strike.
    pub short_pe: f64,
    /// Bought put strike.
    pub hedge_pe: f64,
    /// Sold call strike.
    pub short_ce: f64,
    /// Bought call strike.
    pub hedge_ce: f64,
    /// Gross premium minus estimated costs.
    pub net_premium: f64,
    /// Worst-case loss for one lot.
    pub max_risk: f64,
}

/// Payload attached to a decision: a proposal, or diagnostics explaining a
/// rejection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TradePayload {
    /// Credit spread proposal.
    CreditSpread(CreditSpreadTrade),
    /// Iron condor proposal.
    IronCondor(IronCondorTrade),
    /// Free-form rejection diagnostics.
    Diagnostics(serde_json::Value),
}

/// Exactly one result is produced per decision request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionResult {
    /// Outcome.
    pub action: Action,
    /// Strategy (or `FILTER` for filter rejections).
    pub strategy: String,
    /// Rejection reason or error text.
    pub reason: Option<String>,
    /// Proposal or diagnostics.
    pub trade_payload: Option<TradePayload>,
    /// Unique id.
    pub decision_id: String,
}

impl DecisionResult {
    fn new(
        action: Action,
        strategy: impl Into<String>,
        reason: Option<String>,
        trade_payload: Option<TradePayload>,
    ) -> Self {
        Self {
            action,
            strategy: strategy.into(),
            reason,
            trade_payload,
            decision_id: Uuid::new_v4().to_string(),
        }
    }

    /// `TRADE` with a proposal.
    #[must_use]
    pub fn trade(strategy: impl Into<String>, payload: TradePayload) -> Self {
        Self::new(Action::Trade, strategy, None, Some(payload))
    }

    /// `NO_TRADE` with a reason and optional diagnostics.
    #[must_use]
    pub fn no_trade(
        strategy: impl Into<String>,
        reason: impl Into<String>,
        payload: Option<TradePayload>,
    ) -> Self {
        Self::new(Action::NoTrade, strategy, Some(reason.into()), payload)
    }

    /// `ERROR` carrying the failure text.
    #[must_use]
    pub fn error(strategy: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(Action::Error, strategy, Some(message.into()), None)
    }
}

/// Outcome of one filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterResult {
    /// Whether evaluation may continue.
    pub allowed: bool,
    /// Rejection reason.
    pub reason: Option<String>,
}

impl FilterResult {
    /// Pass.
    #[must_use]
    pub const fn allow() -> Self {
        Self {
            allowed: true,
            reason: None,
        }
    }

    /// Reject with `reason`.
    #[must_use]
    pub fn reject(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: Some(reason.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::chain::{OptionLeg, StrikeLegs};
    use std::collections::BTreeMap;

    #[test]
    fn request_accepts_missing_oi() {
        let req: DecideRequest = serde_json::from_str(
            r#"{"underlying":"NIFTY","expiry":"2025-01-30","spot":24000,
                "instruments":[{"strike":23800,"opt_type":"PE","ltp":110}]}"#,
        )
        .unwrap();
        assert!(req.instruments[0].open_interest().abs() < f64::EPSILON);
        assert_eq!(req.legs(OptionType::Put).count(), 1);
        assert_eq!(req.legs(OptionType::Call).count(), 0);
    }

    #[test]
    fn result_wire_shape() {
        let result = DecisionResult::no_trade("FILTER", "STALE_LIVE_FEED", None);
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["action"], "NO_TRADE");
        assert_eq!(json["reason"], "STALE_LIVE_FEED");
        assert!(json["trade_payload"].is_null());
        assert!(Uuid::parse_str(json["decision_id"].as_str().unwrap()).is_ok());
    }

    #[test]
    fn credit_trade_payload_uses_type_key() {
        let payload = TradePayload::CreditSpread(CreditSpreadTrade {
            underlying: "NIFTY".into(),
            expiry: "2025-01-30".into(),
            spread_type: "PE_CREDIT_SPREAD".into(),
            short_strike: 23_800.0,
            hedge_strike: 23_600.0,
            short_premium: 110.0,
            hedge_premium: 40.0,
            gross_premium: 70.0,
            net_premium: 20.0,
            max_risk: 6_500.0,
        });
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["type"], "PE_CREDIT_SPREAD");
    }

    #[test]
    fn request_from_snapshot_needs_spot() {
        let leg = OptionLeg {
            last_price: 10.0,
            open_interest: 5,
            volume: 0,
        };
        let mut strikes = BTreeMap::new();
        strikes.insert(
            24_000,
            StrikeLegs {
                call: Some(leg),
                put: Some(leg),
            },
        );
        let mut snapshot = OptionChainSnapshot {
            underlying: "NIFTY".into(),
            expiry: "2025-01-30".into(),
            timestamp: 1,
            spot: None,
            atm: None,
            strikes,
        };
        assert!(DecideRequest::from_snapshot(&snapshot).is_none());

        snapshot.spot = Some(24_010.0);
        let req = DecideRequest::from_snapshot(&snapshot).unwrap();
        assert_eq!(req.instruments.len(), 2);
        assert_eq!(req.instruments[0].opt_type, OptionType::Put);
        assert_eq!(req.instruments[0].oi, Some(5.0));
    }
}
