//! Configuration Module
//!
//! Environment-driven engine configuration plus the optional YAML strategy
//! table.

mod settings;
mod strategy;

pub use settings::{
    ChainSettings, ConfigError, DecisionSettings, DhanCredentials, EngineConfig, FeedSettings,
    GreeksSettings, ServerSettings,
};
pub use strategy::{load_strategy_table, parse_strategy_table};
