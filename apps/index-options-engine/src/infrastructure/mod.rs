//! Infrastructure Layer - Adapters and external integrations.
//!
//! Concrete implementations of the application ports plus the inbound
//! HTTP API and process-level concerns.

/// Configuration from the environment and YAML.
pub mod config;

/// Dhan v2 binary market feed client.
pub mod dhan;

/// HTTP API.
pub mod http;

/// Instrument master CSV loader.
pub mod instruments;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// In-memory state store.
pub mod store;

/// Logging and OpenTelemetry tracing.
pub mod telemetry;
