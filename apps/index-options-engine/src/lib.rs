#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::match_same_arms,
        clippy::needless_pass_by_value,
        clippy::needless_collect,
        clippy::option_if_let_else,
        clippy::default_trait_access,
        clippy::items_after_statements,
        clippy::or_fun_call
    )
)]

//! Index Options Engine - Market Data to Decision Pipeline
//!
//! Holds one connection to the Dhan v2 binary market feed for NSE index
//! options, folds ticks into per-expiry chain snapshots, prices contracts
//! with Black-Scholes and runs the credit spread / iron condor decision
//! pipeline behind a set of pre-trade filters and a risk guard.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: packets, instruments, chains, pricing and decisions
//!   - `market_data`: decoded packet types and `Tick`
//!   - `instrument`: security id → contract lookup with atomic table swap
//!   - `chain`: chain aggregation and the completeness gate
//!   - `pricing`: Black-Scholes, Greeks and the IV solver
//!   - `decision`: filters, strategy profiles, evaluators and risk guard
//!
//! - **Application**: ports and services
//!   - `ports`: the shared key/value `StateStore`
//!   - `services`: feed pipeline, Greeks, decisions, debounced recompute
//!
//! - **Infrastructure**: adapters
//!   - `dhan`: binary codec, reconnect policy and feed client
//!   - `instruments`: instrument master CSV loader
//!   - `store`: in-memory `StateStore`
//!   - `config`, `http`, `metrics`, `telemetry`
//!
//! # Data Flow
//!
//! ```text
//! Dhan WS ──► codec ──► resolver ──► aggregator ──► store ──► decision
//!                                        │                      ▲
//!                                        └──► Greeks recompute  │
//!                                                        HTTP ──┘
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Pure types and algorithms.
pub mod domain;

/// Application layer - Services and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::chain::{ChainAggregator, ChainKey, OptionChainSnapshot};
pub use domain::decision::{Action, DecideRequest, DecisionResult};
pub use domain::instrument::{Instrument, InstrumentResolver, InstrumentTable, OptionType};
pub use domain::market_data::{DecodeError, FeedPacket, Tick};

// Application
pub use application::ports::{StateStore, StoreError};
pub use application::services::{
    DecisionService, FeedPipeline, GreeksService, RecomputeScheduler,
};

// Infrastructure
pub use infrastructure::config::{ConfigError, EngineConfig};
pub use infrastructure::dhan::{DhanCodec, DhanFeedClient, FeedClientConfig, FeedEvent, FeedState};
pub use infrastructure::http::{AppState, HttpServer, HttpServerError, create_router};
pub use infrastructure::instruments::{InstrumentLoadError, load_instruments};
pub use infrastructure::metrics::init_metrics;
pub use infrastructure::store::InMemoryStateStore;
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
