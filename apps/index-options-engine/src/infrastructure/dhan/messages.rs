//! Feed Control Messages
//!
//! JSON messages sent from the client to the Dhan v2 feed. Market data
//! arrives as binary frames and is handled by the codec; only the
//! subscription handshake is JSON.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Maximum instruments per subscription message accepted by the feed.
pub const MAX_INSTRUMENTS_PER_MESSAGE: usize = 100;

// =============================================================================
// Feed Mode
// =============================================================================

/// Subscription depth requested from the feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FeedMode {
    /// LTP and trade time only.
    Ticker,
    /// Quote with day OHLC.
    Quote,
    /// Full packet with OI and depth.
    #[default]
    Full,
}

impl FeedMode {
    /// Request code used to subscribe in this mode.
    #[must_use]
    pub const fn subscribe_code(self) -> u8 {
        match self {
            Self::Ticker => 15,
            Self::Quote => 17,
            Self::Full => 21,
        }
    }

    /// Request code used to unsubscribe in this mode.
    #[must_use]
    pub const fn unsubscribe_code(self) -> u8 {
        self.subscribe_code() + 1
    }

    /// Lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ticker => "ticker",
            Self::Quote => "quote",
            Self::Full => "full",
        }
    }

    /// Parse a mode name, falling back to `Full`.
    #[must_use]
    pub fn from_str_case_insensitive(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "ticker" => Self::Ticker,
            "quote" => Self::Quote,
            _ => Self::Full,
        }
    }
}

// =============================================================================
// Subscription Instrument
// =============================================================================

/// One `{ExchangeSegment, SecurityId}` entry of a subscription list.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriptionInstrument {
    /// Exchange segment name (e.g. `NSE_FNO`, `IDX_I`).
    #[serde(rename = "ExchangeSegment")]
    pub exchange_segment: String,
    /// Security id as a decimal string.
    #[serde(rename = "SecurityId")]
    pub security_id: String,
}

impl SubscriptionInstrument {
    /// Create a new entry.
    #[must_use]
    pub fn new(exchange_segment: impl Into<String>, security_id: impl Into<String>) -> Self {
        Self {
            exchange_segment: exchange_segment.into(),
            security_id: security_id.into(),
        }
    }

    /// Numeric security id, if the id is a valid `u32`.
    #[must_use]
    pub fn numeric_id(&self) -> Option<u32> {
        self.security_id.trim().parse().ok()
    }
}

impl fmt::Display for SubscriptionInstrument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.exchange_segment, self.security_id)
    }
}

/// Error parsing a `SEG:ID` instrument spec.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid instrument spec '{0}', expected SEGMENT:SECURITY_ID")]
pub struct InvalidInstrumentSpec(pub String);

impl FromStr for SubscriptionInstrument {
    type Err = InvalidInstrumentSpec;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (segment, id) = s
            .trim()
            .split_once(':')
            .ok_or_else(|| InvalidInstrumentSpec(s.to_string()))?;
        let (segment, id) = (segment.trim(), id.trim());
        if segment.is_empty() || id.is_empty() {
            return Err(InvalidInstrumentSpec(s.to_string()));
        }
        Ok(Self::new(segment, id))
    }
}

/// Parse a comma-separated `SEG:ID,SEG:ID` list. Malformed entries are
/// skipped.
#[must_use]
pub fn parse_instrument_list(input: &str) -> Vec<SubscriptionInstrument> {
    input
        .split(',')
        .filter(|part| !part.trim().is_empty())
        .filter_map(|part| match part.parse() {
            Ok(instrument) => Some(instrument),
            Err(e) => {
                tracing::warn!(error = %e, "Skipping instrument spec");
                None
            }
        })
        .collect()
}

// =============================================================================
// Subscription Request
// =============================================================================

/// Subscribe / unsubscribe message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionRequest {
    /// Request code.
    #[serde(rename = "RequestCode")]
    pub request_code: u8,
    /// Number of instruments in this message.
    #[serde(rename = "InstrumentCount")]
    pub instrument_count: usize,
    /// Instruments.
    #[serde(rename = "InstrumentList")]
    pub instrument_list: Vec<SubscriptionInstrument>,
}

impl SubscriptionRequest {
    /// Build subscribe messages for `instruments`, split into batches the
    /// feed accepts.
    #[must_use]
    pub fn subscribe(mode: FeedMode, instruments: &[SubscriptionInstrument]) -> Vec<Self> {
        Self::batched(mode.subscribe_code(), instruments)
    }

    /// Build unsubscribe messages for `instruments`.
    #[must_use]
    pub fn unsubscribe(mode: FeedMode, instruments: &[SubscriptionInstrument]) -> Vec<Self> {
        Self::batched(mode.unsubscribe_code(), instruments)
    }

    fn batched(request_code: u8, instruments: &[SubscriptionInstrument]) -> Vec<Self> {
        instruments
            .chunks(MAX_INSTRUMENTS_PER_MESSAGE)
            .map(|chunk| Self {
                request_code,
                instrument_count: chunk.len(),
                instrument_list: chunk.to_vec(),
            })
            .collect()
    }

    /// Compact JSON encoding.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
