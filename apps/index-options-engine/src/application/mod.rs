//! Application Layer - Services and port definitions.
//!
//! Services orchestrate the domain against the shared key/value store: the
//! feed pipeline publishes chains, the Greeks service prices them and the
//! decision service turns a chain view into a decision.

/// Port interfaces for external systems.
pub mod ports;

/// Feed, Greeks and decision services.
pub mod services;
