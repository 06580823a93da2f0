//! Feed Connection State
//!
//! Shared view of the feed client's lifecycle, written by the client task
//! and read by the health endpoints.

use std::sync::atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;

/// Feed connection lifecycle.
///
/// `Disconnected → Cooldown → Connecting → Subscribed`, and back to
/// `Disconnected` on any transport error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// No socket.
    #[default]
    Disconnected,
    /// Sleeping out the backoff delay.
    Cooldown,
    /// Opening the socket and sending the subscription.
    Connecting,
    /// Subscribed and reading frames.
    Subscribed,
}

impl ConnectionState {
    /// Lowercase label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Cooldown => "cooldown",
            Self::Connecting => "connecting",
            Self::Subscribed => "subscribed",
        }
    }
}

/// Tracks the feed connection for health reporting.
#[derive(Debug, Default)]
pub struct FeedState {
    state: RwLock<ConnectionState>,
    last_connected_at: RwLock<Option<DateTime<Utc>>>,
    error_message: RwLock<Option<String>>,
    subscription_count: AtomicUsize,
    reconnect_attempts: AtomicU32,
    packets_received: AtomicU64,
    decode_errors: AtomicU64,
}

impl FeedState {
    /// Create a disconnected state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Move to `state`. Entering `Subscribed` clears the error and the
    /// reconnect counter.
    pub fn set_state(&self, state: ConnectionState) {
        *self.state.write() = state;
        if state == ConnectionState::Subscribed {
            *self.last_connected_at.write() = Some(Utc::now());
            *self.error_message.write() = None;
            self.reconnect_attempts.store(0, Ordering::Relaxed);
        }
    }

    /// Record a transport error and drop to `Disconnected`.
    pub fn set_error(&self, message: String) {
        *self.state.write() = ConnectionState::Disconnected;
        *self.error_message.write() = Some(message);
    }

    /// Record a reconnect attempt.
    pub fn increment_reconnect_attempts(&self) {
        self.reconnect_attempts.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a received binary frame.
    pub fn increment_packets(&self) {
        self.packets_received.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a frame that failed to decode.
    pub fn increment_decode_errors(&self) {
        self.decode_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Number of instruments in the active subscription.
    pub fn set_subscription_count(&self, count: usize) {
        self.subscription_count.store(count, Ordering::Relaxed);
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    /// Whether the feed is subscribed.
    #[must_use]
    pub fn is_subscribed(&self) -> bool {
        self.state() == ConnectionState::Subscribed
    }

    /// Point-in-time copy for reporting.
    #[must_use]
    pub fn snapshot(&self) -> FeedStatus {
        FeedStatus {
            state: self.state(),
            last_connected_at: *self.last_connected_at.read(),
            error_message: self.error_message.read().clone(),
            subscription_count: self.subscription_count.load(Ordering::Relaxed),
            reconnect_attempts: self.reconnect_attempts.load(Ordering::Relaxed),
            packets_received: self.packets_received.load(Ordering::Relaxed),
            decode_errors: self.decode_errors.load(Ordering::Relaxed),
        }
    }
}

/// Serializable feed status.
#[derive(Debug, Clone, Serialize)]
pub struct FeedStatus {
    /// Connection state.
    pub state: ConnectionState,
    /// Last successful subscription.
    pub last_connected_at: Option<DateTime<Utc>>,
    /// Last transport error.
    pub error_message: Option<String>,
    /// Subscribed instrument count.
    pub subscription_count: usize,
    /// Reconnect attempts since the last successful subscription.
    pub reconnect_attempts: u32,
    /// Binary frames received.
    pub packets_received: u64,
    /// Frames that failed to decode.
    pub decode_errors: u64,
}
