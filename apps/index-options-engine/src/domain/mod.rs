//! Domain Layer - Market data, chains, pricing and decisions.
//!
//! Pure types and logic with no I/O. Everything here is deterministic given
//! its inputs so it can be exercised without a feed or a store.

/// Feed packet types and normalized ticks.
pub mod market_data;

/// Instrument reference data and security id resolution.
pub mod instrument;

/// Option chain aggregation and snapshots.
pub mod chain;

/// Black-Scholes pricing, Greeks and implied volatility.
pub mod pricing;

/// Filters, strategies and the risk guard.
pub mod decision;
