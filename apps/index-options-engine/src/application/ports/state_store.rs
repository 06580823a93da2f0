//! State Store Port (Driven Port)
//!
//! Shared key/value hand-off between the feed pipeline, the decision
//! engine and out-of-process collaborators (execution layer, dashboards).

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;

/// Well-known keys.
pub mod keys {
    /// Feed heartbeat: fractional epoch seconds (millisecond precision)
    /// of the last resolved packet.
    pub const LIVE_LAST_PACKET_TS: &str = "live:last_packet_ts";
    /// Realized P&L for the day, written by the execution layer.
    pub const PNL_TODAY: &str = "pnl:today";
    /// Trades taken today, written by the execution layer.
    pub const TRADES_TODAY: &str = "trades:today";
    /// Realized loss for the month, written by the execution layer.
    pub const LOSS_MONTH: &str = "loss:month";
    /// Prefix shared by current and last-good chain snapshots.
    pub const OPTION_CHAIN_PREFIX: &str = "optionchain:";
}

/// Encode a heartbeat instant as fractional epoch seconds, e.g. `1737347400.900`.
#[must_use]
pub fn heartbeat_value(at: DateTime<Utc>) -> String {
    let millis = at.timestamp_millis();
    format!("{}.{:03}", millis.div_euclid(1000), millis.rem_euclid(1000))
}

/// Decode a heartbeat written as epoch seconds (whole or fractional) into
/// epoch milliseconds.
#[must_use]
pub fn parse_heartbeat_millis(raw: &str) -> Option<i64> {
    let secs = raw.trim().parse::<f64>().ok().filter(|s| s.is_finite())?;
    // Float to int casts saturate.
    #[allow(clippy::cast_possible_truncation)]
    let millis = (secs * 1000.0).round() as i64;
    Some(millis)
}

/// State store error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    /// Store could not be reached.
    #[error("State store unavailable: {0}")]
    Unavailable(String),

    /// Stored value could not be encoded or decoded.
    #[error("State store value for '{key}' is invalid: {message}")]
    InvalidValue {
        /// Key involved.
        key: String,
        /// Error details.
        message: String,
    },
}

/// Port for the shared key/value store.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Read a value.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Write a value, expiring after `ttl` when given.
    async fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> Result<(), StoreError>;

    /// Remove a value. Returns true if it existed.
    async fn delete(&self, key: &str) -> Result<bool, StoreError>;

    /// Live keys starting with `prefix`, sorted.
    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError>;
}

/// Read and decode a JSON value.
///
/// # Errors
///
/// Returns [`StoreError::InvalidValue`] if the value is not valid JSON for
/// `T`, or the store's own error.
pub async fn get_json<T: DeserializeOwned>(
    store: &dyn StateStore,
    key: &str,
) -> Result<Option<T>, StoreError> {
    store
        .get(key)
        .await?
        .map(|raw| {
            serde_json::from_str(&raw).map_err(|e| StoreError::InvalidValue {
                key: key.to_string(),
                message: e.to_string(),
            })
        })
        .transpose()
}

/// Encode and write a JSON value.
///
/// # Errors
///
/// Returns [`StoreError::InvalidValue`] if encoding fails, or the store's
/// own error.
pub async fn set_json<T: Serialize + Sync>(
    store: &dyn StateStore,
    key: &str,
    value: &T,
    ttl: Option<Duration>,
) -> Result<(), StoreError> {
    let raw = serde_json::to_string(value).map_err(|e| StoreError::InvalidValue {
        key: key.to_string(),
        message: e.to_string(),
    })?;
    store.set(key, raw, ttl).await
}

/// Read a numeric counter; absent keys read as zero.
///
/// # Errors
///
/// Returns [`StoreError::InvalidValue`] if the value is not a number.
pub async fn get_number(store: &dyn StateStore, key: &str) -> Result<f64, StoreError> {
    match store.get(key).await? {
        None => Ok(0.0),
        Some(raw) => raw
            .trim()
            .parse::<f64>()
            .map_err(|e| StoreError::InvalidValue {
                key: key.to_string(),
                message: e.to_string(),
            }),
    }
}
