//! Application Services
//!
//! Services coordinate domain logic and infrastructure adapters. The feed
//! pipeline and recompute scheduler run as background tasks; the Greeks
//! and decision services answer HTTP requests.

mod decision;
mod feed_pipeline;
mod greeks;
mod recompute;

pub use decision::{DashboardState, DecisionError, DecisionService, ENGINE_STRATEGY, LatestDecision};
pub use feed_pipeline::FeedPipeline;
pub use greeks::{
    BatchItem, BatchItemError, BatchResponse, ChainGreeks, GreeksError, GreeksRequest,
    GreeksResponse, GreeksService,
};
pub use recompute::RecomputeScheduler;
