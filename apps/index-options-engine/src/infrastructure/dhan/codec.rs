//! Binary Feed Codec
//!
//! Decodes Dhan v2 little-endian market-data frames. The first byte selects
//! the layout:
//!
//! | Type | Packet            | Bytes | Layout                                  |
//! |------|-------------------|-------|-----------------------------------------|
//! | 2    | TICKER            | 16    | header, ltp f32, ltt u32                |
//! | 3    | DEPTH             | 162   | same as FULL                            |
//! | 4    | QUOTE             | 50    | header, ltp, ltq, ltt, avg, 3×u32, ohlc |
//! | 5    | OI                | 12    | header, oi u32                          |
//! | 6    | `PREV_CLOSE`      | 16    | same as TICKER                          |
//! | 7    | STATUS            | 8     | header only                             |
//! | 8    | FULL              | 162   | quote fields, oi ×3, ohlc, 5 depth      |
//! | 50   | `SERVER_DISCONNECT` | 10  | header, reason u16                      |
//!
//! The 8-byte header is `type u8, length u16, segment u8, security id u32`.
//! QUOTE frames shorter than 50 bytes fall back to the TICKER layout.

use crate::domain::market_data::{
    DayOhlc, DecodeError, DepthLevel, DisconnectPacket, FeedPacket, FullPacket, OiPacket,
    PacketHeader, PacketType, PrevClosePacket, QuotePacket, StatusPacket, TickerPacket,
};

/// Header length shared by every packet.
pub const HEADER_LEN: usize = 8;
/// TICKER / `PREV_CLOSE` frame length.
pub const TICKER_LEN: usize = 16;
/// OI frame length.
pub const OI_LEN: usize = 12;
/// QUOTE frame length.
pub const QUOTE_LEN: usize = 50;
/// FULL / DEPTH frame length.
pub const FULL_LEN: usize = 162;
/// STATUS frame length.
pub const STATUS_LEN: usize = 8;
/// `SERVER_DISCONNECT` frame length.
pub const DISCONNECT_LEN: usize = 10;
/// One depth level.
pub const DEPTH_LEVEL_LEN: usize = 20;
/// Offset of the depth block inside a FULL frame.
const DEPTH_OFFSET: usize = 62;

// =============================================================================
// Reader / Writer
// =============================================================================

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    const fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take<const N: usize>(&mut self) -> Option<[u8; N]> {
        let bytes = self.buf.get(self.pos..self.pos + N)?;
        self.pos += N;
        bytes.try_into().ok()
    }

    fn u8(&mut self) -> Option<u8> {
        self.take::<1>().map(|[b]| b)
    }

    fn u16(&mut self) -> Option<u16> {
        self.take().map(u16::from_le_bytes)
    }

    fn u32(&mut self) -> Option<u32> {
        self.take().map(u32::from_le_bytes)
    }

    fn f32(&mut self) -> Option<f32> {
        self.take().map(f32::from_le_bytes)
    }

    fn header(&mut self) -> Option<PacketHeader> {
        Some(PacketHeader {
            packet_type: self.u8()?,
            message_length: self.u16()?,
            exchange_segment: self.u8()?,
            security_id: self.u32()?,
        })
    }

    fn ohlc(&mut self) -> Option<DayOhlc> {
        Some(DayOhlc {
            open: self.f32()?,
            close: self.f32()?,
            high: self.f32()?,
            low: self.f32()?,
        })
    }
}

#[derive(Default)]
struct Writer(Vec<u8>);

impl Writer {
    fn u8(&mut self, v: u8) -> &mut Self {
        self.0.push(v);
        self
    }

    fn u16(&mut self, v: u16) -> &mut Self {
        self.0.extend_from_slice(&v.to_le_bytes());
        self
    }

    fn u32(&mut self, v: u32) -> &mut Self {
        self.0.extend_from_slice(&v.to_le_bytes());
        self
    }

    fn f32(&mut self, v: f32) -> &mut Self {
        self.0.extend_from_slice(&v.to_le_bytes());
        self
    }

    fn header(&mut self, h: &PacketHeader) -> &mut Self {
        self.u8(h.packet_type)
            .u16(h.message_length)
            .u8(h.exchange_segment)
            .u32(h.security_id)
    }

    fn ohlc(&mut self, d: &DayOhlc) -> &mut Self {
        self.f32(d.open).f32(d.close).f32(d.high).f32(d.low)
    }
}

// =============================================================================
// Depth
// =============================================================================

/// Decode a depth block in 20-byte strides. An incomplete trailing stride
/// is dropped.
#[must_use]
pub fn decode_depth(block: &[u8]) -> Vec<DepthLevel> {
    block
        .chunks_exact(DEPTH_LEVEL_LEN)
        .filter_map(|chunk| {
            let mut r = Reader::new(chunk);
            Some(DepthLevel {
                bid_quantity: r.u32()?,
                ask_quantity: r.u32()?,
                bid_orders: r.u16()?,
                ask_orders: r.u16()?,
                bid_price: r.f32()?,
                ask_price: r.f32()?,
            })
        })
        .collect()
}

// =============================================================================
// Codec
// =============================================================================

/// Stateless codec for Dhan v2 binary frames.
#[derive(Debug, Default, Clone, Copy)]
pub struct DhanCodec;

impl DhanCodec {
    /// Create a new codec.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Decode one binary frame.
    ///
    /// # Errors
    ///
    /// Returns a [`DecodeError`] tag for empty, truncated, unknown or
    /// unparseable frames.
    pub fn decode(&self, data: &[u8]) -> Result<FeedPacket, DecodeError> {
        let Some(&type_byte) = data.first() else {
            return Err(DecodeError::Empty);
        };
        let Some(packet) = PacketType::from_byte(type_byte) else {
            return Err(DecodeError::UnknownType {
                type_byte,
                len: data.len(),
            });
        };

        match packet {
            PacketType::Full => decode_full(data, packet).map(FeedPacket::Full),
            PacketType::Depth => decode_full(data, packet).map(FeedPacket::Depth),
            PacketType::Ticker => decode_ticker(data).map(FeedPacket::Ticker),
            PacketType::Quote => decode_quote(data),
            PacketType::Oi => decode_oi(data).map(FeedPacket::Oi),
            PacketType::PrevClose => decode_prev_close(data).map(FeedPacket::PrevClose),
            PacketType::Status => decode_status(data).map(FeedPacket::Status),
            PacketType::ServerDisconnect => {
                decode_disconnect(data).map(FeedPacket::ServerDisconnect)
            }
        }
    }

    /// Encode a packet into its wire layout.
    ///
    /// Used for replaying captured sessions and building fixtures.
    #[must_use]
    pub fn encode(&self, packet: &FeedPacket) -> Vec<u8> {
        let mut w = Writer::default();
        match packet {
            FeedPacket::Ticker(p) => {
                w.header(&p.header).f32(p.last_price).u32(p.last_trade_time);
            }
            FeedPacket::PrevClose(p) => {
                w.header(&p.header).f32(p.prev_close).u32(p.timestamp);
            }
            FeedPacket::Quote(p) => {
                w.header(&p.header)
                    .f32(p.last_price)
                    .u16(p.last_quantity)
                    .u32(p.last_trade_time)
                    .f32(p.average_price)
                    .u32(p.volume)
                    .u32(p.total_sell_quantity)
                    .u32(p.total_buy_quantity)
                    .ohlc(&p.day);
            }
            FeedPacket::Full(p) | FeedPacket::Depth(p) => {
                w.header(&p.header)
                    .f32(p.last_price)
                    .u16(p.last_quantity)
                    .u32(p.last_trade_time)
                    .f32(p.average_price)
                    .u32(p.volume)
                    .u32(p.total_sell_quantity)
                    .u32(p.total_buy_quantity)
                    .u32(p.open_interest)
                    .u32(p.oi_day_high)
                    .u32(p.oi_day_low)
                    .ohlc(&p.day);
                for level in p.depth.iter().take(5) {
                    w.u32(level.bid_quantity)
                        .u32(level.ask_quantity)
                        .u16(level.bid_orders)
                        .u16(level.ask_orders)
                        .f32(level.bid_price)
                        .f32(level.ask_price);
                }
                w.0.resize(FULL_LEN, 0);
            }
            FeedPacket::Oi(p) => {
                w.header(&p.header).u32(p.open_interest);
            }
            FeedPacket::Status(p) => {
                w.u8(PacketType::Status.as_byte())
                    .u16(8)
                    .u8(p.exchange_segment)
                    .u32(p.raw_status);
            }
            FeedPacket::ServerDisconnect(p) => {
                w.u8(PacketType::ServerDisconnect.as_byte())
                    .u16(10)
                    .u8(0)
                    .u32(0)
                    .u16(p.error_code);
            }
        }
        w.0
    }
}

const fn require(data: &[u8], packet: PacketType, expected: usize) -> Result<(), DecodeError> {
    if data.len() < expected {
        return Err(DecodeError::Truncated {
            packet,
            actual: data.len(),
            expected,
        });
    }
    Ok(())
}

const fn cannot_parse(packet: PacketType, data: &[u8]) -> DecodeError {
    DecodeError::CannotParse {
        packet,
        len: data.len(),
    }
}

fn decode_full(data: &[u8], packet: PacketType) -> Result<FullPacket, DecodeError> {
    require(data, packet, FULL_LEN)?;
    parse_full(data).ok_or_else(|| cannot_parse(packet, data))
}

fn parse_full(data: &[u8]) -> Option<FullPacket> {
    let mut r = Reader::new(data);
    Some(FullPacket {
        header: r.header()?,
        last_price: r.f32()?,
        last_quantity: r.u16()?,
        last_trade_time: r.u32()?,
        average_price: r.f32()?,
        volume: r.u32()?,
        total_sell_quantity: r.u32()?,
        total_buy_quantity: r.u32()?,
        open_interest: r.u32()?,
        oi_day_high: r.u32()?,
        oi_day_low: r.u32()?,
        day: r.ohlc()?,
        depth: decode_depth(data.get(DEPTH_OFFSET..FULL_LEN)?),
    })
}

fn decode_ticker(data: &[u8]) -> Result<TickerPacket, DecodeError> {
    require(data, PacketType::Ticker, TICKER_LEN)?;
    parse_ticker(data).ok_or_else(|| cannot_parse(PacketType::Ticker, data))
}

fn parse_ticker(data: &[u8]) -> Option<TickerPacket> {
    let mut r = Reader::new(data);
    Some(TickerPacket {
        header: r.header()?,
        last_price: r.f32()?,
        last_trade_time: r.u32()?,
    })
}

fn decode_quote(data: &[u8]) -> Result<FeedPacket, DecodeError> {
    if data.len() >= QUOTE_LEN {
        return parse_quote(data)
            .map(FeedPacket::Quote)
            .ok_or_else(|| cannot_parse(PacketType::Quote, data));
    }
    if data.len() >= TICKER_LEN {
        return decode_ticker(data).map(FeedPacket::Ticker);
    }
    Err(DecodeError::Truncated {
        packet: PacketType::Quote,
        actual: data.len(),
        expected: TICKER_LEN,
    })
}

fn parse_quote(data: &[u8]) -> Option<QuotePacket> {
    let mut r = Reader::new(data);
    Some(QuotePacket {
        header: r.header()?,
        last_price: r.f32()?,
        last_quantity: r.u16()?,
        last_trade_time: r.u32()?,
        average_price: r.f32()?,
        volume: r.u32()?,
        total_sell_quantity: r.u32()?,
        total_buy_quantity: r.u32()?,
        day: r.ohlc()?,
    })
}

fn decode_oi(data: &[u8]) -> Result<OiPacket, DecodeError> {
    require(data, PacketType::Oi, OI_LEN)?;
    let mut r = Reader::new(data);
    let header = r.header();
    let open_interest = r.u32();
    header
        .zip(open_interest)
        .map(|(header, open_interest)| OiPacket {
            header,
            open_interest,
        })
        .ok_or_else(|| cannot_parse(PacketType::Oi, data))
}

fn decode_prev_close(data: &[u8]) -> Result<PrevClosePacket, DecodeError> {
    parse_ticker(data)
        .map(|t| PrevClosePacket {
            header: t.header,
            prev_close: t.last_price,
            timestamp: t.last_trade_time,
        })
        .ok_or_else(|| cannot_parse(PacketType::PrevClose, data))
}

fn decode_status(data: &[u8]) -> Result<StatusPacket, DecodeError> {
    Reader::new(data)
        .header()
        .map(|header| StatusPacket {
            exchange_segment: header.exchange_segment,
            raw_status: header.security_id,
        })
        .ok_or_else(|| cannot_parse(PacketType::Status, data))
}

fn decode_disconnect(data: &[u8]) -> Result<DisconnectPacket, DecodeError> {
    let mut r = Reader::new(data);
    r.header()
        .and_then(|_| r.u16())
        .map(|error_code| DisconnectPacket { error_code })
        .ok_or_else(|| cannot_parse(PacketType::ServerDisconnect, data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn full_packet() -> FullPacket {
        FullPacket {
            header: PacketHeader {
                packet_type: 8,
                message_length: 162,
                exchange_segment: 2,
                security_id: 35_001,
            },
            last_price: 112.5,
            last_quantity: 75,
            last_trade_time: 1_735_700_000,
            average_price: 110.25,
            volume: 1_250_000,
            total_sell_quantity: 40_000,
            total_buy_quantity: 52_000,
            open_interest: 980_000,
            oi_day_high: 1_000_000,
            oi_day_low: 900_000,
            day: DayOhlc {
                open: 100.0,
                close: 98.5,
                high: 120.0,
                low: 95.25,
            },
            depth: (0..5u16)
                .map(|i| DepthLevel {
                    bid_quantity: 100 + u32::from(i),
                    ask_quantity: 200 + u32::from(i),
                    bid_orders: i + 1,
                    ask_orders: i + 2,
                    bid_price: 112.0 - f32::from(i) * 0.05,
                    ask_price: 112.5 + f32::from(i) * 0.05,
                })
                .collect(),
        }
    }

    #[test]
    fn full_packet_decodes_every_field() {
        let codec = DhanCodec::new();
        let packet = FeedPacket::Full(full_packet());
        let bytes = codec.encode(&packet);
        assert_eq!(bytes.len(), FULL_LEN);
        assert_eq!(codec.decode(&bytes).unwrap(), packet);
    }

    #[test]
    fn depth_type_reuses_full_layout() {
        let codec = DhanCodec::new();
        let mut body = full_packet();
        body.header.packet_type = 3;
        let bytes = codec.encode(&FeedPacket::Depth(body.clone()));
        assert_eq!(codec.decode(&bytes).unwrap(), FeedPacket::Depth(body));
    }

    fn header(packet_type: PacketType, message_length: u16, security_id: u32) -> PacketHeader {
        PacketHeader {
            packet_type: packet_type.as_byte(),
            message_length,
            exchange_segment: 2,
            security_id,
        }
    }

    #[test]
    fn short_layouts_decode_what_was_encoded() {
        let codec = DhanCodec::new();
        let packets = [
            FeedPacket::Ticker(TickerPacket {
                header: header(PacketType::Ticker, 16, 13),
                last_price: 24_010.5,
                last_trade_time: 1_737_347_400,
            }),
            FeedPacket::Quote(QuotePacket {
                header: header(PacketType::Quote, 50, 40_007),
                last_price: 182.35,
                last_quantity: 75,
                last_trade_time: 1_737_347_401,
                average_price: 180.1,
                volume: 845_000,
                total_sell_quantity: 31_000,
                total_buy_quantity: 27_500,
                day: DayOhlc {
                    open: 170.0,
                    close: 165.4,
                    high: 190.25,
                    low: 168.5,
                },
            }),
            FeedPacket::Oi(OiPacket {
                header: header(PacketType::Oi, 12, 41_003),
                open_interest: 1_234_500,
            }),
            FeedPacket::PrevClose(PrevClosePacket {
                header: header(PacketType::PrevClose, 16, 41_003),
                prev_close: 96.75,
                timestamp: 1_737_300_000,
            }),
            FeedPacket::Status(StatusPacket {
                exchange_segment: 2,
                raw_status: 3,
            }),
        ];

        for packet in packets {
            let bytes = codec.encode(&packet);
            let expected_len = match &packet {
                FeedPacket::Ticker(_) | FeedPacket::PrevClose(_) => TICKER_LEN,
                FeedPacket::Quote(_) => QUOTE_LEN,
                FeedPacket::Oi(_) => OI_LEN,
                _ => STATUS_LEN,
            };
            assert_eq!(bytes.len(), expected_len, "{packet:?}");
            assert_eq!(codec.decode(&bytes).unwrap(), packet);
        }
    }

    #[test]
    fn ticker_layout_offsets() {
        let mut bytes = vec![2u8];
        bytes.extend_from_slice(&16u16.to_le_bytes());
        bytes.push(1);
        bytes.extend_from_slice(&13u32.to_le_bytes());
        bytes.extend_from_slice(&24_010.5f32.to_le_bytes());
        bytes.extend_from_slice(&1_700_000_000u32.to_le_bytes());

        let FeedPacket::Ticker(t) = DhanCodec::new().decode(&bytes).unwrap() else {
            panic!("expected ticker");
        };
        assert_eq!(t.header.security_id, 13);
        assert_eq!(t.header.exchange_segment, 1);
        assert!((t.last_price - 24_010.5).abs() < f32::EPSILON);
        assert_eq!(t.last_trade_time, 1_700_000_000);
    }

    #[test]
    fn short_quote_falls_back_to_ticker() {
        let mut bytes = vec![4u8];
        bytes.extend_from_slice(&20u16.to_le_bytes());
        bytes.push(2);
        bytes.extend_from_slice(&77u32.to_le_bytes());
        bytes.extend_from_slice(&55.0f32.to_le_bytes());
        bytes.extend_from_slice(&9u32.to_le_bytes());
        bytes.extend_from_slice(&[0; 4]);

        let decoded = DhanCodec::new().decode(&bytes).unwrap();
        let FeedPacket::Ticker(t) = decoded else {
            panic!("expected ticker fallback, got {decoded:?}");
        };
        assert_eq!(t.header.security_id, 77);
        assert_eq!(t.last_trade_time, 9);
    }

    #[test]
    fn empty_and_unknown_frames() {
        let codec = DhanCodec::new();
        assert_eq!(codec.decode(&[]), Err(DecodeError::Empty));
        assert_eq!(
            codec.decode(&[99, 0, 0]),
            Err(DecodeError::UnknownType {
                type_byte: 99,
                len: 3
            })
        );
    }

    #[test]
    fn short_status_cannot_parse() {
        let err = DhanCodec::new().decode(&[7, 8, 0]).unwrap_err();
        assert_eq!(err.kind(), "cannot_parse");
    }

    #[test]
    fn disconnect_reason_code() {
        let codec = DhanCodec::new();
        let packet = FeedPacket::ServerDisconnect(DisconnectPacket { error_code: 805 });
        let bytes = codec.encode(&packet);
        assert_eq!(bytes.len(), DISCONNECT_LEN);
        assert_eq!(codec.decode(&bytes).unwrap(), packet);
    }

    #[test]
    fn partial_depth_stride_dropped() {
        let levels = decode_depth(&[0u8; 50]);
        assert_eq!(levels.len(), 2);
    }

    proptest! {
        #[test]
        fn any_full_prefix_is_truncated(len in 1usize..FULL_LEN) {
            let bytes = DhanCodec::new().encode(&FeedPacket::Full(full_packet()));
            let result = DhanCodec::new().decode(&bytes[..len]);
            prop_assert_eq!(
                result,
                Err(DecodeError::Truncated { packet: PacketType::Full, actual: len, expected: FULL_LEN })
            );
        }

        #[test]
        fn arbitrary_bytes_never_panic(bytes in proptest::collection::vec(any::<u8>(), 0..256)) {
            let _ = DhanCodec::new().decode(&bytes);
        }
    }
}
