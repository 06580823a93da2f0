//! Feed-to-Decision Integration Tests
//!
//! Binary frames are decoded, resolved against the fixture instrument
//! master, folded into a chain, published to the store and evaluated by
//! the decision pipeline.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use index_options_engine::application::ports::{get_json, keys};
use index_options_engine::domain::chain::ChainKey;
use index_options_engine::domain::decision::{Action, DecideRequest, StrategyTable, TradePayload};
use index_options_engine::domain::market_data::{
    DayOhlc, FeedPacket, FullPacket, PacketHeader, PacketType, TickerPacket,
};
use index_options_engine::infrastructure::config::DecisionSettings;
use index_options_engine::infrastructure::dhan::{FeedEvent, SubscriptionInstrument};
use index_options_engine::{
    DecisionService, DhanCodec, FeedPipeline, InMemoryStateStore, InstrumentResolver,
    OptionChainSnapshot, StateStore, load_instruments,
};

const NSE_FNO: u8 = 2;
const IDX_I: u8 = 0;
const NIFTY_SPOT_ID: u32 = 13;
const EXPIRY: &str = "2025-01-23";

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

/// 10:00 IST on a trading day.
fn in_window() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 20, 4, 30, 0).unwrap()
}

fn header(packet_type: PacketType, exchange_segment: u8, security_id: u32) -> PacketHeader {
    PacketHeader {
        packet_type: packet_type.as_byte(),
        message_length: 0,
        exchange_segment,
        security_id,
    }
}

fn full(security_id: u32, last_price: f32, open_interest: u32) -> FeedPacket {
    FeedPacket::Full(FullPacket {
        header: header(PacketType::Full, NSE_FNO, security_id),
        last_price,
        last_quantity: 75,
        last_trade_time: 1_737_347_400,
        average_price: last_price,
        volume: 1_500,
        total_sell_quantity: 900,
        total_buy_quantity: 1_100,
        open_interest,
        oi_day_high: open_interest,
        oi_day_low: open_interest,
        day: DayOhlc {
            open: last_price,
            close: last_price,
            high: last_price,
            low: last_price,
        },
        depth: Vec::new(),
    })
}

fn spot(price: f32) -> FeedPacket {
    FeedPacket::Ticker(TickerPacket {
        header: header(PacketType::Ticker, IDX_I, NIFTY_SPOT_ID),
        last_price: price,
        last_trade_time: 1_737_347_400,
    })
}

/// Fixture ids: CE `40000 + i`, PE `41000 + i` for strike `23500 + 50 * i`.
const fn strike_index(strike: u32) -> u32 {
    (strike - 23_500) / 50
}

/// Put premium and OI chosen so the weekly NIFTY credit spread trades:
/// short 23850 (highest OI in range), hedge 23650, gross 320, net 70.
fn put_quote(strike: u32) -> (f32, u32) {
    match strike {
        23_850 => (420.0, 5_000),
        23_800 => (380.0, 1_200),
        23_650 => (100.0, 800),
        _ => (50.0, 100),
    }
}

fn pipeline() -> (Arc<FeedPipeline>, Arc<InMemoryStateStore>) {
    let table = load_instruments(fixture("scrip_master.csv")).unwrap();
    let store = Arc::new(InMemoryStateStore::new());
    let pipeline = FeedPipeline::new(
        Arc::new(InstrumentResolver::new(table)),
        store.clone(),
        10,
        Duration::from_secs(15),
        HashMap::from([(NIFTY_SPOT_ID, "NIFTY".to_string())]),
    );
    (Arc::new(pipeline), store)
}

/// Encode, decode and feed a packet through the pipeline.
async fn push(
    pipeline: &FeedPipeline,
    packet: &FeedPacket,
    now: DateTime<Utc>,
) -> Option<OptionChainSnapshot> {
    let codec = DhanCodec::new();
    let decoded = codec.decode(&codec.encode(packet)).unwrap();
    pipeline.process_packet(&decoded, now).await.unwrap()
}

#[tokio::test]
async fn chain_publishes_on_tenth_complete_strike_and_trades() {
    let (pipeline, store) = pipeline();
    let now = in_window();

    // Off the round hundred, so the router picks the credit spread.
    assert!(push(&pipeline, &spot(24_050.0), now).await.is_none());

    let mut first_publish = None;
    for (n, strike) in (23_500..24_500).step_by(50).enumerate() {
        let i = strike_index(strike);
        let (put_ltp, put_oi) = put_quote(strike);
        push(&pipeline, &full(41_000 + i, put_ltp, put_oi), now).await;
        let published = push(&pipeline, &full(40_000 + i, 60.0, 100), now).await;
        if published.is_some() && first_publish.is_none() {
            first_publish = Some(n + 1);
        }
    }
    assert_eq!(first_publish, Some(10));

    let key = ChainKey::new("NIFTY", EXPIRY);
    let snapshot: OptionChainSnapshot = get_json(store.as_ref(), &key.current_key())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(snapshot.strikes.len(), 20);
    assert_eq!(snapshot.spot, Some(24_050.0));
    assert_eq!(snapshot.atm, Some(24_050));
    assert!(store.get(&key.last_good_key()).await.unwrap().is_some());
    assert_eq!(
        store.get(keys::LIVE_LAST_PACKET_TS).await.unwrap(),
        Some(format!("{}.000", now.timestamp()))
    );

    let settings = DecisionSettings {
        strategies: StrategyTable::builtin(),
        ..DecisionSettings::default()
    };
    let decisions = DecisionService::new(store.clone(), settings);
    let snapshot = decisions.load_snapshot(&key).await.unwrap();
    let request = DecideRequest::from_snapshot(&snapshot).unwrap();

    let decision = decisions.decide_at(request, now).await;
    assert_eq!(decision.strategy, "CREDIT_SPREAD");
    assert_eq!(decision.action, Action::Trade, "{decision:?}");
    let Some(TradePayload::CreditSpread(trade)) = decision.trade_payload else {
        panic!("expected credit spread payload");
    };
    assert_eq!(trade.short_strike, 23_850.0);
    assert_eq!(trade.hedge_strike, 23_650.0);
}

#[tokio::test]
async fn stale_heartbeat_blocks_published_chain() {
    let (pipeline, store) = pipeline();
    let fed_at = in_window();

    push(&pipeline, &spot(24_050.0), fed_at).await;
    for strike in (23_500..24_500).step_by(50) {
        let i = strike_index(strike);
        push(&pipeline, &full(41_000 + i, 50.0, 100), fed_at).await;
        push(&pipeline, &full(40_000 + i, 50.0, 100), fed_at).await;
    }

    let settings = DecisionSettings {
        strategies: StrategyTable::builtin(),
        ..DecisionSettings::default()
    };
    let decisions = DecisionService::new(store, settings);
    let snapshot = decisions
        .load_snapshot(&ChainKey::new("NIFTY", EXPIRY))
        .await
        .unwrap();
    let request = DecideRequest::from_snapshot(&snapshot).unwrap();

    let later = fed_at + chrono::Duration::seconds(10);
    let decision = decisions.decide_at(request, later).await;
    assert_eq!(decision.action, Action::NoTrade);
    assert_eq!(decision.strategy, "FILTER");
    assert_eq!(decision.reason.as_deref(), Some("STALE_LIVE_FEED"));
}

#[tokio::test]
async fn heartbeat_keeps_sub_second_precision() {
    let (pipeline, store) = pipeline();
    let fed_at = in_window() + chrono::Duration::milliseconds(900);

    push(&pipeline, &spot(24_050.0), fed_at).await;
    for strike in (23_500..24_500).step_by(50) {
        let i = strike_index(strike);
        let (put_ltp, put_oi) = put_quote(strike);
        push(&pipeline, &full(41_000 + i, put_ltp, put_oi), fed_at).await;
        push(&pipeline, &full(40_000 + i, 60.0, 100), fed_at).await;
    }
    assert_eq!(
        store.get(keys::LIVE_LAST_PACKET_TS).await.unwrap().as_deref(),
        Some("1737347400.900")
    );

    let settings = DecisionSettings {
        strategies: StrategyTable::builtin(),
        ..DecisionSettings::default()
    };
    let decisions = DecisionService::new(store, settings);
    let snapshot = decisions
        .load_snapshot(&ChainKey::new("NIFTY", EXPIRY))
        .await
        .unwrap();
    let request = DecideRequest::from_snapshot(&snapshot).unwrap();

    let decision = decisions
        .decide_at(request, fed_at + chrono::Duration::milliseconds(2_600))
        .await;
    assert_eq!(decision.strategy, "CREDIT_SPREAD", "{decision:?}");
    assert_eq!(decision.action, Action::Trade);
}

#[tokio::test]
async fn resubscribe_clears_published_chains() {
    let (pipeline, store) = pipeline();
    let now = in_window();

    push(&pipeline, &spot(24_000.0), now).await;
    for strike in (23_500..24_500).step_by(50) {
        let i = strike_index(strike);
        push(&pipeline, &full(41_000 + i, 50.0, 100), now).await;
        push(&pipeline, &full(40_000 + i, 50.0, 100), now).await;
    }
    let key = ChainKey::new("NIFTY", EXPIRY);
    assert!(store.get(&key.current_key()).await.unwrap().is_some());

    let narrowed = vec![SubscriptionInstrument::new("NSE_FNO", "40000")];
    pipeline
        .handle_event(FeedEvent::Resubscribed { instruments: narrowed }, now)
        .await
        .unwrap();

    assert!(store.get(&key.current_key()).await.unwrap().is_none());
    assert!(store.get(&key.last_good_key()).await.unwrap().is_none());
    assert_eq!(pipeline.chain_count(), 0);

    // Ids outside the new set are dropped before resolution.
    assert!(push(&pipeline, &full(41_000, 50.0, 100), now).await.is_none());
    assert_eq!(pipeline.chain_count(), 0);
}
