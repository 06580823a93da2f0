//! Market Data Types
//!
//! Typed records produced by the binary feed decoder. Every known packet
//! type has its own variant; unknown type bytes surface as a decode error
//! rather than a catch-all map.

use serde::{Deserialize, Serialize};

// =============================================================================
// Packet Type
// =============================================================================

/// Packet type byte (first byte of every binary frame).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PacketType {
    /// Last traded price and time.
    Ticker,
    /// Full layout carrying market depth.
    Depth,
    /// Quote with day OHLC.
    Quote,
    /// Open interest only.
    Oi,
    /// Previous day close.
    PrevClose,
    /// Market status.
    Status,
    /// Full packet with OI and five depth levels.
    Full,
    /// Server-initiated disconnect with reason code.
    ServerDisconnect,
}

impl PacketType {
    /// Map a leading byte to its packet type.
    #[must_use]
    pub const fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            2 => Some(Self::Ticker),
            3 => Some(Self::Depth),
            4 => Some(Self::Quote),
            5 => Some(Self::Oi),
            6 => Some(Self::PrevClose),
            7 => Some(Self::Status),
            8 => Some(Self::Full),
            50 => Some(Self::ServerDisconnect),
            _ => None,
        }
    }

    /// Wire byte for this packet type.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        match self {
            Self::Ticker => 2,
            Self::Depth => 3,
            Self::Quote => 4,
            Self::Oi => 5,
            Self::PrevClose => 6,
            Self::Status => 7,
            Self::Full => 8,
            Self::ServerDisconnect => 50,
        }
    }

    /// Lowercase label for logs and metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ticker => "ticker",
            Self::Depth => "depth",
            Self::Quote => "quote",
            Self::Oi => "oi",
            Self::PrevClose => "prev_close",
            Self::Status => "status",
            Self::Full => "full",
            Self::ServerDisconnect => "server_disconnect",
        }
    }
}

impl std::fmt::Display for PacketType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Packet Bodies
// =============================================================================

/// Common packet header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PacketHeader {
    /// Packet type byte.
    pub packet_type: u8,
    /// Declared message length.
    pub message_length: u16,
    /// Exchange segment code.
    pub exchange_segment: u8,
    /// Security id.
    pub security_id: u32,
}

/// One level of the order book.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DepthLevel {
    /// Total bid quantity at this level.
    pub bid_quantity: u32,
    /// Total ask quantity at this level.
    pub ask_quantity: u32,
    /// Number of bid orders.
    pub bid_orders: u16,
    /// Number of ask orders.
    pub ask_orders: u16,
    /// Bid price.
    pub bid_price: f32,
    /// Ask price.
    pub ask_price: f32,
}

/// Day open/close/high/low.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DayOhlc {
    /// Day open.
    pub open: f32,
    /// Previous close as reported by the exchange.
    pub close: f32,
    /// Day high.
    pub high: f32,
    /// Day low.
    pub low: f32,
}

/// TICKER body.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TickerPacket {
    /// Header.
    pub header: PacketHeader,
    /// Last traded price.
    pub last_price: f32,
    /// Last trade time (epoch seconds).
    pub last_trade_time: u32,
}

/// QUOTE body.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QuotePacket {
    /// Header.
    pub header: PacketHeader,
    /// Last traded price.
    pub last_price: f32,
    /// Last traded quantity.
    pub last_quantity: u16,
    /// Last trade time (epoch seconds).
    pub last_trade_time: u32,
    /// Average traded price.
    pub average_price: f32,
    /// Day volume.
    pub volume: u32,
    /// Total pending sell quantity.
    pub total_sell_quantity: u32,
    /// Total pending buy quantity.
    pub total_buy_quantity: u32,
    /// Day OHLC.
    pub day: DayOhlc,
}

/// FULL (and DEPTH) body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FullPacket {
    /// Header.
    pub header: PacketHeader,
    /// Last traded price.
    pub last_price: f32,
    /// Last traded quantity.
    pub last_quantity: u16,
    /// Last trade time (epoch seconds).
    pub last_trade_time: u32,
    /// Average traded price.
    pub average_price: f32,
    /// Day volume.
    pub volume: u32,
    /// Total pending sell quantity.
    pub total_sell_quantity: u32,
    /// Total pending buy quantity.
    pub total_buy_quantity: u32,
    /// Open interest.
    pub open_interest: u32,
    /// Day high of open interest.
    pub oi_day_high: u32,
    /// Day low of open interest.
    pub oi_day_low: u32,
    /// Day OHLC.
    pub day: DayOhlc,
    /// Up to five depth levels.
    pub depth: Vec<DepthLevel>,
}

/// OI body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OiPacket {
    /// Header.
    pub header: PacketHeader,
    /// Open interest.
    pub open_interest: u32,
}

/// PREV_CLOSE body.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PrevClosePacket {
    /// Header.
    pub header: PacketHeader,
    /// Previous day close.
    pub prev_close: f32,
    /// Timestamp field (epoch seconds).
    pub timestamp: u32,
}

/// STATUS body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusPacket {
    /// Exchange segment.
    pub exchange_segment: u8,
    /// Raw status word.
    pub raw_status: u32,
}

/// SERVER_DISCONNECT body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisconnectPacket {
    /// Reason code sent by the server.
    pub error_code: u16,
}

// =============================================================================
// Feed Packet
// =============================================================================

/// A successfully decoded binary frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FeedPacket {
    /// TICKER.
    Ticker(TickerPacket),
    /// DEPTH (same layout as FULL).
    Depth(FullPacket),
    /// QUOTE.
    Quote(QuotePacket),
    /// OI.
    Oi(OiPacket),
    /// PREV_CLOSE.
    PrevClose(PrevClosePacket),
    /// STATUS.
    Status(StatusPacket),
    /// FULL.
    Full(FullPacket),
    /// SERVER_DISCONNECT.
    ServerDisconnect(DisconnectPacket),
}

impl FeedPacket {
    /// Packet type.
    #[must_use]
    pub const fn packet_type(&self) -> PacketType {
        match self {
            Self::Ticker(_) => PacketType::Ticker,
            Self::Depth(_) => PacketType::Depth,
            Self::Quote(_) => PacketType::Quote,
            Self::Oi(_) => PacketType::Oi,
            Self::PrevClose(_) => PacketType::PrevClose,
            Self::Status(_) => PacketType::Status,
            Self::Full(_) => PacketType::Full,
            Self::ServerDisconnect(_) => PacketType::ServerDisconnect,
        }
    }

    /// Security id, for packets that carry one.
    #[must_use]
    pub const fn security_id(&self) -> Option<u32> {
        match self {
            Self::Ticker(p) => Some(p.header.security_id),
            Self::Depth(p) | Self::Full(p) => Some(p.header.security_id),
            Self::Quote(p) => Some(p.header.security_id),
            Self::Oi(p) => Some(p.header.security_id),
            Self::PrevClose(p) => Some(p.header.security_id),
            Self::Status(_) | Self::ServerDisconnect(_) => None,
        }
    }

    /// Convert a market-data packet into a tick. Control packets and
    /// previous-close packets yield `None`.
    #[must_use]
    pub fn to_tick(&self) -> Option<Tick> {
        match self {
            Self::Ticker(p) => Some(Tick {
                security_id: p.header.security_id,
                exchange_segment: p.header.exchange_segment,
                last_price: Some(f64::from(p.last_price)),
                last_trade_time: Some(p.last_trade_time),
                ..Tick::empty(p.header.security_id)
            }),
            Self::Quote(p) => Some(Tick {
                security_id: p.header.security_id,
                exchange_segment: p.header.exchange_segment,
                last_price: Some(f64::from(p.last_price)),
                last_quantity: Some(p.last_quantity),
                last_trade_time: Some(p.last_trade_time),
                average_price: Some(f64::from(p.average_price)),
                volume: Some(p.volume),
                day: Some(p.day),
                ..Tick::empty(p.header.security_id)
            }),
            Self::Full(p) | Self::Depth(p) => Some(Tick {
                security_id: p.header.security_id,
                exchange_segment: p.header.exchange_segment,
                last_price: Some(f64::from(p.last_price)),
                last_quantity: Some(p.last_quantity),
                last_trade_time: Some(p.last_trade_time),
                average_price: Some(f64::from(p.average_price)),
                volume: Some(p.volume),
                open_interest: Some(p.open_interest),
                day: Some(p.day),
                depth: p.depth.clone(),
            }),
            Self::Oi(p) => Some(Tick {
                exchange_segment: p.header.exchange_segment,
                open_interest: Some(p.open_interest),
                ..Tick::empty(p.header.security_id)
            }),
            Self::PrevClose(_) | Self::Status(_) | Self::ServerDisconnect(_) => None,
        }
    }
}

// =============================================================================
// Decode Errors
// =============================================================================

/// Tagged decode failure. Decoding never panics; every malformed frame maps
/// to one of these.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// Zero-length frame.
    #[error("empty packet")]
    Empty,

    /// Frame shorter than the fixed layout for its type.
    #[error("truncated {packet} packet: {actual} bytes, need {expected}")]
    Truncated {
        /// Packet type from the leading byte.
        packet: PacketType,
        /// Bytes received.
        actual: usize,
        /// Bytes required.
        expected: usize,
    },

    /// Leading byte is not a known packet type.
    #[error("unknown packet type {type_byte} ({len} bytes)")]
    UnknownType {
        /// Raw type byte.
        type_byte: u8,
        /// Raw frame length.
        len: usize,
    },

    /// Best-effort layout could not be parsed.
    #[error("cannot parse {packet} packet ({len} bytes)")]
    CannotParse {
        /// Packet type from the leading byte.
        packet: PacketType,
        /// Raw frame length.
        len: usize,
    },
}

impl DecodeError {
    /// Short label for logs and metrics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::Truncated { .. } => "truncated",
            Self::UnknownType { .. } => "unknown_type",
            Self::CannotParse { .. } => "cannot_parse",
        }
    }
}

// =============================================================================
// Tick
// =============================================================================

/// Normalised per-contract market update.
///
/// Fields absent from the originating packet are `None`; consumers merge
/// only what is present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    /// Feed security id.
    pub security_id: u32,
    /// Exchange segment code.
    pub exchange_segment: u8,
    /// Last traded price.
    pub last_price: Option<f64>,
    /// Last traded quantity.
    pub last_quantity: Option<u16>,
    /// Last trade time (epoch seconds).
    pub last_trade_time: Option<u32>,
    /// Average traded price.
    pub average_price: Option<f64>,
    /// Day volume.
    pub volume: Option<u32>,
    /// Open interest.
    pub open_interest: Option<u32>,
    /// Day OHLC.
    pub day: Option<DayOhlc>,
    /// Market depth, best level first.
    pub depth: Vec<DepthLevel>,
}

impl Tick {
    /// A tick carrying only its security id.
    #[must_use]
    pub const fn empty(security_id: u32) -> Self {
        Self {
            security_id,
            exchange_segment: 0,
            last_price: None,
            last_quantity: None,
            last_trade_time: None,
            average_price: None,
            volume: None,
            open_interest: None,
            day: None,
            depth: Vec::new(),
        }
    }
}
