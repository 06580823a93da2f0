//! Decision Domain
//!
//! Pure decision logic: pre-trade filters, per-underlying strategy profiles,
//! credit spread and iron condor evaluators, routing and the risk guard.
//! Nothing here touches the store or the clock; callers supply a
//! [`FilterContext`] and the monthly loss.

mod filters;
mod model;
mod profile;
pub mod reasons;
mod risk;
mod strategy;

pub use filters::{
    DailyLossFilter, FeedHeartbeat, Filter, FilterConfig, FilterContext, FilterPipeline,
    FreshnessFilter, TradeCountFilter, TradingWindowFilter,
};
pub use model::{
    Action, CreditSpreadTrade, DecideRequest, DecisionResult, FilterResult, IronCondorTrade,
    QuotedLeg, TradePayload,
};
pub use profile::{
    CreditSpreadParams, IronCondorParams, MonthlyOverrides, StrategyProfile, StrategyTable,
    is_monthly_expiry,
};
pub use risk::RiskGuard;
pub use strategy::{
    EvaluationContext, Rejection, SpotBandRouter, StrategyKind, StrategyRouter, TradeProposal,
    evaluate,
};
