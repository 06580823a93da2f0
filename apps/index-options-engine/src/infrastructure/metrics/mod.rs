//! Prometheus Metrics Module
//!
//! Exposes engine metrics in Prometheus format at `/metrics`.
//!
//! # Metrics Categories
//!
//! - **Feed**: packets by type, decode failures, connection state, reconnects
//! - **Chain**: publishes and completeness per underlying
//! - **Greeks**: cache outcomes, duplicate writes, approximate IV solves
//! - **Decisions**: outcomes by action/strategy and evaluation latency

use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::domain::market_data::PacketType;

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// # Panics
///
/// Panics if the recorder cannot be installed.
pub fn init_metrics() -> PrometheusHandle {
    PROMETHEUS_HANDLE
        .get_or_init(|| {
            #[allow(clippy::expect_used)]
            let handle = PrometheusBuilder::new()
                .install_recorder()
                .expect("failed to install Prometheus recorder");

            register_metrics();
            handle
        })
        .clone()
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    // Feed
    describe_counter!(
        "options_engine_packets_received_total",
        "Binary frames decoded from the feed by packet type"
    );
    describe_counter!(
        "options_engine_decode_errors_total",
        "Binary frames that failed to decode by failure kind"
    );
    describe_counter!(
        "options_engine_unresolved_ticks_total",
        "Ticks dropped because the security id is not in the instrument table"
    );
    describe_gauge!(
        "options_engine_feed_connected",
        "1 while the feed is subscribed, 0 otherwise"
    );
    describe_counter!(
        "options_engine_feed_reconnects_total",
        "Feed reconnection attempts"
    );
    describe_counter!(
        "options_engine_resubscribes_total",
        "Resubscribe commands applied to the feed"
    );

    // Chain
    describe_counter!(
        "options_engine_chain_publishes_total",
        "Option chain snapshots published"
    );
    describe_gauge!(
        "options_engine_chain_complete_strikes",
        "Strikes with both legs present in the latest chain update"
    );

    // Greeks
    describe_counter!(
        "options_engine_greeks_cache_total",
        "Greeks cache lookups by outcome"
    );
    describe_counter!(
        "options_engine_greeks_duplicate_writes_total",
        "Greeks cache writes that raced with a concurrent miss for the same key"
    );
    describe_counter!(
        "options_engine_iv_approximate_total",
        "Implied volatility solves that hit the iteration cap"
    );

    // Decisions
    describe_counter!(
        "options_engine_decisions_total",
        "Decisions by action and strategy"
    );
    describe_histogram!(
        "options_engine_decision_seconds",
        "Time to evaluate one decision request"
    );
}

// =============================================================================
// Feed
// =============================================================================

/// Record a decoded frame.
pub fn record_packet(packet: PacketType) {
    counter!(
        "options_engine_packets_received_total",
        "packet" => packet.as_str()
    )
    .increment(1);
}

/// Record a decode failure.
pub fn record_decode_error(kind: &'static str) {
    counter!("options_engine_decode_errors_total", "kind" => kind).increment(1);
}

/// Record a tick for an unknown security id.
pub fn record_unresolved_tick() {
    counter!("options_engine_unresolved_ticks_total").increment(1);
}

/// Update the feed connection gauge.
pub fn set_feed_connected(connected: bool) {
    gauge!("options_engine_feed_connected").set(if connected { 1.0 } else { 0.0 });
}

/// Record a reconnection attempt.
pub fn record_reconnect() {
    counter!("options_engine_feed_reconnects_total").increment(1);
}

/// Record an applied resubscribe.
pub fn record_resubscribe() {
    counter!("options_engine_resubscribes_total").increment(1);
}

// =============================================================================
// Chain
// =============================================================================

/// Record a published snapshot.
pub fn record_chain_publish(underlying: &str) {
    counter!(
        "options_engine_chain_publishes_total",
        "underlying" => underlying.to_string()
    )
    .increment(1);
}

/// Update the complete-strike gauge for an underlying.
#[allow(clippy::cast_precision_loss)]
pub fn set_chain_complete_strikes(underlying: &str, count: usize) {
    gauge!(
        "options_engine_chain_complete_strikes",
        "underlying" => underlying.to_string()
    )
    .set(count as f64);
}

// =============================================================================
// Greeks
// =============================================================================

/// Greeks cache lookup outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheOutcome {
    /// Served from cache.
    Hit,
    /// Computed.
    Miss,
}

impl CacheOutcome {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Hit => "hit",
            Self::Miss => "miss",
        }
    }
}

/// Record a cache lookup.
pub fn record_greeks_cache(outcome: CacheOutcome) {
    counter!(
        "options_engine_greeks_cache_total",
        "outcome" => outcome.as_str()
    )
    .increment(1);
}

/// Record a cache write that overwrote a fresh entry.
pub fn record_greeks_duplicate_write() {
    counter!("options_engine_greeks_duplicate_writes_total").increment(1);
}

/// Record an IV solve that returned its best estimate at the iteration cap.
pub fn record_iv_approximate() {
    counter!("options_engine_iv_approximate_total").increment(1);
}

// =============================================================================
// Decisions
// =============================================================================

/// Record a decision and its evaluation time.
pub fn record_decision(action: &'static str, strategy: &str, duration: Duration) {
    counter!(
        "options_engine_decisions_total",
        "action" => action,
        "strategy" => strategy.to_string()
    )
    .increment(1);
    histogram!("options_engine_decision_seconds").record(duration.as_secs_f64());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_outcome_labels() {
        assert_eq!(CacheOutcome::Hit.as_str(), "hit");
        assert_eq!(CacheOutcome::Miss.as_str(), "miss");
    }

    #[test]
    fn recording_without_recorder_is_noop() {
        record_packet(PacketType::Full);
        record_decode_error("truncated");
        set_feed_connected(true);
        record_chain_publish("NIFTY");
        record_decision("NO_TRADE", "FILTER", Duration::from_millis(1));
    }
}
