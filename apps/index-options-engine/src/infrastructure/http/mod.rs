//! HTTP API
//!
//! # Endpoints
//!
//! - `GET /health`, `/healthz`, `/readyz`: health and probes
//! - `GET /metrics`: Prometheus text format
//! - `GET /status/live`: feed heartbeat
//! - `GET /decision/latest`: dashboard view of the last decision
//! - `POST /decide`, `GET /signal/{underlying}/{expiry}`: decision pipeline
//! - `POST /greeks`, `POST /greeks/batch`, `GET /greeks/chain/{symbol}/{expiry}`
//! - `POST /subscribe`: replace the feed subscription

mod controller;
mod request;
mod response;
mod server;

pub use controller::{ApiError, AppState, create_router};
pub use request::{BatchGreeksRequest, ChainWindowQuery, InstrumentSpec, SubscribeRequest};
pub use response::{
    ErrorResponse, HealthResponse, HealthStatus, LiveState, LiveStatusResponse, SubscribeResponse,
};
pub use server::{HttpServer, HttpServerError};
