//! HTTP response DTOs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::infrastructure::dhan::{FeedStatus, SubscriptionInstrument};

/// Overall health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Feed subscribed and packets flowing.
    Healthy,
    /// Engine up, feed not subscribed.
    Degraded,
}

/// `GET /health` body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Overall status.
    pub status: HealthStatus,
    /// Engine version.
    pub version: String,
    /// Uptime in seconds.
    pub uptime_secs: u64,
    /// Current time.
    pub current_time: DateTime<Utc>,
    /// Feed connection details.
    pub feed: FeedStatus,
    /// Chains held by the aggregator.
    pub chains: usize,
    /// Live Greeks cache entries.
    pub greeks_cache_entries: usize,
}

/// Feed liveness as seen through the heartbeat key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LiveState {
    /// Heartbeat present.
    Connected,
    /// No heartbeat yet.
    Waiting,
}

/// `GET /status/live` body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveStatusResponse {
    /// Liveness.
    pub status: LiveState,
    /// Heartbeat value, epoch seconds.
    pub last_packet_ts: Option<String>,
    /// Server time, epoch seconds.
    pub now: f64,
}

/// `POST /subscribe` body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscribeResponse {
    /// Command queued.
    pub ok: bool,
    /// Requested instrument set.
    pub subscribed: Vec<SubscriptionInstrument>,
}

/// Error body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error text.
    pub error: String,
}
