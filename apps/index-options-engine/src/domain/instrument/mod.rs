//! Instrument Reference Data
//!
//! Maps numeric feed security ids to option contracts. The table is loaded
//! once at startup and is read-only afterwards; a reload replaces the whole
//! table behind an `Arc` so lookups never observe a half-populated map.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

// =============================================================================
// Option Type
// =============================================================================

/// Option type code used by Indian exchanges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OptionType {
    /// Call option.
    #[serde(rename = "CE")]
    Call,
    /// Put option.
    #[serde(rename = "PE")]
    Put,
}

impl OptionType {
    /// Exchange code (`CE` / `PE`).
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Call => "CE",
            Self::Put => "PE",
        }
    }
}

impl fmt::Display for OptionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when an option type code is not `CE` or `PE`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid option type: {0}")]
pub struct InvalidOptionType(pub String);

impl FromStr for OptionType {
    type Err = InvalidOptionType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "CE" => Ok(Self::Call),
            "PE" => Ok(Self::Put),
            other => Err(InvalidOptionType(other.to_string())),
        }
    }
}

// =============================================================================
// Instrument
// =============================================================================

/// A single option contract from the instrument master.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instrument {
    /// Feed security id.
    pub security_id: u32,
    /// Underlying index symbol (e.g. `NIFTY`).
    pub underlying_symbol: String,
    /// Expiry date as `YYYY-MM-DD`.
    pub expiry_date: String,
    /// Strike price (whole points).
    pub strike: i64,
    /// Call or put.
    pub option_type: OptionType,
}

// =============================================================================
// Instrument Table
// =============================================================================

/// Immutable security-id → instrument map.
#[derive(Debug, Default, Clone)]
pub struct InstrumentTable {
    by_id: HashMap<u32, Instrument>,
}

impl InstrumentTable {
    /// Build a table from instruments. Later duplicates of a security id
    /// replace earlier ones.
    #[must_use]
    pub fn from_instruments(instruments: impl IntoIterator<Item = Instrument>) -> Self {
        let by_id = instruments
            .into_iter()
            .map(|instrument| (instrument.security_id, instrument))
            .collect();
        Self { by_id }
    }

    /// Look up an instrument by security id.
    #[must_use]
    pub fn get(&self, security_id: u32) -> Option<&Instrument> {
        self.by_id.get(&security_id)
    }

    /// Number of instruments.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    /// Whether the table is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Iterate over all instruments.
    pub fn iter(&self) -> impl Iterator<Item = &Instrument> {
        self.by_id.values()
    }
}

// =============================================================================
// Resolver
// =============================================================================

/// Shared, swappable view of the instrument table.
#[derive(Debug, Default)]
pub struct InstrumentResolver {
    table: RwLock<Arc<InstrumentTable>>,
}

impl InstrumentResolver {
    /// Create a resolver over an initial table.
    #[must_use]
    pub fn new(table: InstrumentTable) -> Self {
        Self {
            table: RwLock::new(Arc::new(table)),
        }
    }

    /// Resolve a security id to its instrument.
    #[must_use]
    pub fn resolve(&self, security_id: u32) -> Option<Instrument> {
        self.snapshot().get(security_id).cloned()
    }

    /// Current table. Holding the returned `Arc` pins that table version.
    #[must_use]
    pub fn snapshot(&self) -> Arc<InstrumentTable> {
        self.table.read().clone()
    }

    /// Replace the whole table.
    pub fn swap(&self, table: InstrumentTable) {
        let next = Arc::new(table);
        *self.table.write() = next;
    }

    /// Number of instruments in the current table.
    #[must_use]
    pub fn len(&self) -> usize {
        self.table.read().len()
    }

    /// Whether the current table is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.table.read().is_empty()
    }
}
