//! Option Chain Aggregation
//!
//! Folds per-contract ticks into one chain per `(underlying, expiry)`. The
//! aggregator is owned by the feed pipeline task and is its only writer;
//! readers only ever see [`OptionChainSnapshot`] copies taken at publish
//! time.
//!
//! A chain publishes only once at least `min_complete_strikes` strikes have
//! both a call and a put leg.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::instrument::{Instrument, OptionType};
use crate::domain::market_data::Tick;

/// Default completeness threshold.
pub const DEFAULT_MIN_COMPLETE_STRIKES: usize = 10;

// =============================================================================
// Chain Key
// =============================================================================

/// Identity of a chain.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChainKey {
    /// Underlying symbol.
    pub underlying: String,
    /// Expiry date (`YYYY-MM-DD`).
    pub expiry: String,
}

impl ChainKey {
    /// Create a key.
    #[must_use]
    pub fn new(underlying: impl Into<String>, expiry: impl Into<String>) -> Self {
        Self {
            underlying: underlying.into(),
            expiry: expiry.into(),
        }
    }

    /// Store key of the current (TTL-bound) snapshot.
    #[must_use]
    pub fn current_key(&self) -> String {
        format!("optionchain:{}:{}", self.underlying, self.expiry)
    }

    /// Store key of the last complete snapshot.
    #[must_use]
    pub fn last_good_key(&self) -> String {
        format!("optionchain:last_good:{}:{}", self.underlying, self.expiry)
    }

    /// Store key of the recomputed Greeks for this chain.
    #[must_use]
    pub fn greeks_key(&self) -> String {
        format!("greeks:chain:{}:{}", self.underlying, self.expiry)
    }
}

impl fmt::Display for ChainKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.underlying, self.expiry)
    }
}

// =============================================================================
// Legs
// =============================================================================

/// Latest market state of one contract.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OptionLeg {
    /// Last traded price.
    #[serde(rename = "ltp")]
    pub last_price: f64,
    /// Open interest.
    #[serde(rename = "oi", default)]
    pub open_interest: u64,
    /// Day volume.
    #[serde(default)]
    pub volume: u64,
}

/// Call and put legs at one strike.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct StrikeLegs {
    /// Call leg.
    #[serde(rename = "CE", default, skip_serializing_if = "Option::is_none")]
    pub call: Option<OptionLeg>,
    /// Put leg.
    #[serde(rename = "PE", default, skip_serializing_if = "Option::is_none")]
    pub put: Option<OptionLeg>,
}

impl StrikeLegs {
    /// Leg for an option type.
    #[must_use]
    pub const fn leg(&self, option_type: OptionType) -> Option<&OptionLeg> {
        match option_type {
            OptionType::Call => self.call.as_ref(),
            OptionType::Put => self.put.as_ref(),
        }
    }

    const fn leg_mut(&mut self, option_type: OptionType) -> &mut Option<OptionLeg> {
        match option_type {
            OptionType::Call => &mut self.call,
            OptionType::Put => &mut self.put,
        }
    }

    /// Whether both legs are present.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.call.is_some() && self.put.is_some()
    }
}

// =============================================================================
// Snapshot
// =============================================================================

/// Immutable published copy of a chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionChainSnapshot {
    /// Underlying symbol.
    pub underlying: String,
    /// Expiry date.
    pub expiry: String,
    /// Publish time (epoch milliseconds, strictly increasing per aggregator).
    pub timestamp: i64,
    /// Underlying spot, when an index tick has been seen.
    #[serde(default)]
    pub spot: Option<f64>,
    /// Strike nearest to spot.
    #[serde(default)]
    pub atm: Option<i64>,
    /// Legs by strike, ascending.
    pub strikes: BTreeMap<i64, StrikeLegs>,
}

impl OptionChainSnapshot {
    /// Chain identity.
    #[must_use]
    pub fn key(&self) -> ChainKey {
        ChainKey::new(&self.underlying, &self.expiry)
    }

    /// Number of strikes with both legs.
    #[must_use]
    pub fn complete_strikes(&self) -> usize {
        self.strikes.values().filter(|l| l.is_complete()).count()
    }

    /// All legs of one type, by ascending strike.
    pub fn legs(&self, option_type: OptionType) -> impl Iterator<Item = (i64, &OptionLeg)> {
        self.strikes
            .iter()
            .filter_map(move |(strike, legs)| legs.leg(option_type).map(|leg| (*strike, leg)))
    }
}

/// Strike nearest to `spot`; ties go to the lower strike.
#[must_use]
pub fn nearest_strike(strikes: impl IntoIterator<Item = i64>, spot: f64) -> Option<i64> {
    strikes
        .into_iter()
        .map(|strike| {
            #[allow(clippy::cast_precision_loss)]
            let distance = (strike as f64 - spot).abs();
            (strike, distance)
        })
        .min_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)))
        .map(|(strike, _)| strike)
}

// =============================================================================
// Aggregator
// =============================================================================

/// Outcome of applying one tick.
#[derive(Debug, Clone, PartialEq)]
pub struct ChainUpdate {
    /// Chain touched by the tick.
    pub key: ChainKey,
    /// Strikes with both legs after the update.
    pub complete_strikes: usize,
    /// Published copy, present once the chain is complete.
    pub snapshot: Option<OptionChainSnapshot>,
}

/// Single-writer chain state.
#[derive(Debug)]
pub struct ChainAggregator {
    min_complete_strikes: usize,
    chains: HashMap<ChainKey, BTreeMap<i64, StrikeLegs>>,
    spots: HashMap<String, f64>,
    last_timestamp: i64,
}

impl Default for ChainAggregator {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_COMPLETE_STRIKES)
    }
}

impl ChainAggregator {
    /// Create an aggregator with the given completeness threshold.
    #[must_use]
    pub fn new(min_complete_strikes: usize) -> Self {
        Self {
            min_complete_strikes,
            chains: HashMap::new(),
            spots: HashMap::new(),
            last_timestamp: 0,
        }
    }

    /// Completeness threshold.
    #[must_use]
    pub const fn min_complete_strikes(&self) -> usize {
        self.min_complete_strikes
    }

    /// Fold a tick for a resolved option contract.
    ///
    /// Present tick fields overwrite the leg; absent fields keep their last
    /// value. A tick without a price cannot create a leg, so an OI-only
    /// update for a contract never seen trading is ignored.
    pub fn apply(&mut self, instrument: &Instrument, tick: &Tick, now_ms: i64) -> ChainUpdate {
        let key = ChainKey::new(&instrument.underlying_symbol, &instrument.expiry_date);
        let strikes = self.chains.entry(key.clone()).or_default();
        let slot = strikes
            .entry(instrument.strike)
            .or_default()
            .leg_mut(instrument.option_type);

        if let Some(leg) = slot.as_mut() {
            merge(leg, tick);
        } else if let Some(last_price) = tick.last_price {
            let mut leg = OptionLeg {
                last_price,
                open_interest: 0,
                volume: 0,
            };
            merge(&mut leg, tick);
            *slot = Some(leg);
        }

        let complete_strikes = strikes.values().filter(|l| l.is_complete()).count();
        let snapshot = if complete_strikes >= self.min_complete_strikes {
            self.snapshot_at(&key, now_ms)
        } else {
            None
        };

        ChainUpdate {
            key,
            complete_strikes,
            snapshot,
        }
    }

    /// Record the underlying's spot. Applies to every chain of that
    /// underlying from its next publish.
    pub fn update_spot(&mut self, underlying: &str, spot: f64) {
        if spot.is_finite() && spot > 0.0 {
            self.spots.insert(underlying.to_string(), spot);
        }
    }

    /// Last recorded spot for an underlying.
    #[must_use]
    pub fn spot(&self, underlying: &str) -> Option<f64> {
        self.spots.get(underlying).copied()
    }

    /// Copy out a chain regardless of completeness.
    #[must_use]
    pub fn snapshot(&mut self, key: &ChainKey, now_ms: i64) -> Option<OptionChainSnapshot> {
        self.snapshot_at(key, now_ms)
    }

    fn snapshot_at(&mut self, key: &ChainKey, now_ms: i64) -> Option<OptionChainSnapshot> {
        let strikes = self.chains.get(key)?.clone();
        let timestamp = now_ms.max(self.last_timestamp + 1);
        self.last_timestamp = timestamp;

        let spot = self.spots.get(&key.underlying).copied();
        let atm = spot.and_then(|s| nearest_strike(strikes.keys().copied(), s));

        Some(OptionChainSnapshot {
            underlying: key.underlying.clone(),
            expiry: key.expiry.clone(),
            timestamp,
            spot,
            atm,
            strikes,
        })
    }

    /// Drop every chain. Returns the keys that were held.
    pub fn clear(&mut self) -> Vec<ChainKey> {
        let mut keys: Vec<_> = self.chains.drain().map(|(key, _)| key).collect();
        keys.sort();
        keys
    }

    /// Number of chains held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.chains.len()
    }

    /// Whether no chains are held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.chains.is_empty()
    }
}

fn merge(leg: &mut OptionLeg, tick: &Tick) {
    if let Some(price) = tick.last_price {
        leg.last_price = price;
    }
    if let Some(oi) = tick.open_interest {
        leg.open_interest = u64::from(oi);
    }
    if let Some(volume) = tick.volume {
        leg.volume = u64::from(volume);
    }
}
