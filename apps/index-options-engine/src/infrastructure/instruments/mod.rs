//! Instrument Master Loader
//!
//! Reads the broker's detailed scrip master CSV into an [`InstrumentTable`].
//! Only CE/PE rows with a numeric security id are kept; anything else is
//! skipped row by row.

use std::io::Read;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

use crate::domain::instrument::{Instrument, InstrumentTable, OptionType};

/// Errors that prevent the instrument table from loading.
#[derive(Debug, Error)]
pub enum InstrumentLoadError {
    /// File could not be opened or the header could not be read.
    #[error("failed to read instrument master {path}: {source}")]
    Read {
        /// Path attempted.
        path: String,
        /// Underlying CSV error.
        #[source]
        source: csv::Error,
    },

    /// No option rows survived filtering.
    #[error("instrument master {0} contains no option contracts")]
    Empty(String),
}

/// Row counts from a load.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadStats {
    /// Data rows read.
    pub rows: usize,
    /// Option contracts kept.
    pub loaded: usize,
    /// Rows skipped (non-options, malformed).
    pub skipped: usize,
}

#[derive(Debug, Deserialize)]
struct ScripRow {
    #[serde(rename = "OPTION_TYPE", default)]
    option_type: Option<String>,
    #[serde(rename = "SEM_OPTION_TYPE", default)]
    sem_option_type: Option<String>,
    #[serde(rename = "SECURITY_ID", default)]
    security_id: Option<String>,
    #[serde(rename = "UNDERLYING_SYMBOL", default)]
    underlying_symbol: Option<String>,
    #[serde(rename = "SYMBOL_NAME", default)]
    symbol_name: Option<String>,
    #[serde(rename = "SM_EXPIRY_DATE", default)]
    expiry_date: Option<String>,
    #[serde(rename = "STRIKE_PRICE", default)]
    strike_price: Option<String>,
}

fn non_empty(value: Option<&String>) -> Option<&str> {
    value.map(|v| v.trim()).filter(|v| !v.is_empty())
}

impl ScripRow {
    fn into_instrument(self) -> Option<Instrument> {
        let option_type: OptionType = non_empty(self.option_type.as_ref())
            .or_else(|| non_empty(self.sem_option_type.as_ref()))?
            .parse()
            .ok()?;
        let security_id = parse_security_id(non_empty(self.security_id.as_ref())?)?;
        let underlying_symbol = non_empty(self.underlying_symbol.as_ref())
            .or_else(|| non_empty(self.symbol_name.as_ref()))?
            .to_uppercase();
        let expiry_date = non_empty(self.expiry_date.as_ref())?.to_string();
        let strike = parse_strike(non_empty(self.strike_price.as_ref())?)?;

        Some(Instrument {
            security_id,
            underlying_symbol,
            expiry_date,
            strike,
            option_type,
        })
    }
}

/// Security ids appear as `12345` or `12345.0`.
fn parse_security_id(raw: &str) -> Option<u32> {
    raw.parse::<u32>().ok().or_else(|| {
        let value = raw.parse::<f64>().ok()?;
        let whole = value.is_finite() && value.fract().abs() < f64::EPSILON;
        if whole && (0.0..=f64::from(u32::MAX)).contains(&value) {
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            Some(value as u32)
        } else {
            None
        }
    })
}

/// Strikes are truncated to whole points.
fn parse_strike(raw: &str) -> Option<i64> {
    let value = raw.parse::<f64>().ok()?;
    #[allow(clippy::cast_possible_truncation)]
    value.is_finite().then(|| value.trunc() as i64)
}

/// Load the instrument master from any reader.
///
/// # Errors
///
/// Returns [`InstrumentLoadError::Read`] if the header cannot be read.
pub fn load_from_reader<R: Read>(
    reader: R,
    source_name: &str,
) -> Result<(InstrumentTable, LoadStats), InstrumentLoadError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);
    csv_reader
        .headers()
        .map_err(|source| InstrumentLoadError::Read {
            path: source_name.to_string(),
            source,
        })?;

    let mut stats = LoadStats::default();
    let mut instruments = Vec::new();
    for row in csv_reader.deserialize::<ScripRow>() {
        stats.rows += 1;
        match row.ok().and_then(ScripRow::into_instrument) {
            Some(instrument) => instruments.push(instrument),
            None => stats.skipped += 1,
        }
    }
    stats.loaded = instruments.len();

    Ok((InstrumentTable::from_instruments(instruments), stats))
}

/// Load the instrument master from a file. An empty result is an error.
///
/// # Errors
///
/// Returns [`InstrumentLoadError`] if the file is unreadable or holds no
/// option contracts.
pub fn load_instruments(path: impl AsRef<Path>) -> Result<InstrumentTable, InstrumentLoadError> {
    let path = path.as_ref();
    let source_name = path.display().to_string();
    let file = std::fs::File::open(path).map_err(|e| InstrumentLoadError::Read {
        path: source_name.clone(),
        source: csv::Error::from(e),
    })?;

    let (table, stats) = load_from_reader(file, &source_name)?;
    if table.is_empty() {
        return Err(InstrumentLoadError::Empty(source_name));
    }

    tracing::info!(
        path = %source_name,
        rows = stats.rows,
        loaded = stats.loaded,
        skipped = stats.skipped,
        unique = table.len(),
        "Instrument master loaded"
    );
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = "\
SECURITY_ID,UNDERLYING_SYMBOL,SM_EXPIRY_DATE,STRIKE_PRICE,OPTION_TYPE,LOT_SIZE
35001,NIFTY,2025-01-30,24000.0,CE,75
35002,NIFTY,2025-01-30,24000.0,PE,75
35003,NIFTY,2025-01-30,24050.5,CE,75
13,NIFTY,,,XX,1
,NIFTY,2025-01-30,24100,CE,75
abc,NIFTY,2025-01-30,24100,PE,75
";

    #[test]
    fn loads_option_rows_and_skips_the_rest() {
        let (table, stats) = load_from_reader(SAMPLE.as_bytes(), "sample").unwrap();
        assert_eq!(stats.rows, 6);
        assert_eq!(stats.loaded, 3);
        assert_eq!(stats.skipped, 3);

        let ce = table.get(35_001).unwrap();
        assert_eq!(ce.underlying_symbol, "NIFTY");
        assert_eq!(ce.expiry_date, "2025-01-30");
        assert_eq!(ce.strike, 24_000);
        assert_eq!(ce.option_type, OptionType::Call);

        assert_eq!(table.get(35_003).unwrap().strike, 24_050);
        assert!(table.get(13).is_none());
    }

    #[test]
    fn falls_back_to_alternate_columns() {
        let csv = "\
SECURITY_ID,SYMBOL_NAME,SM_EXPIRY_DATE,STRIKE_PRICE,SEM_OPTION_TYPE
42.0,banknifty,2025-01-29,51000,PE
";
        let (table, _) = load_from_reader(csv.as_bytes(), "alt").unwrap();
        let put = table.get(42).unwrap();
        assert_eq!(put.underlying_symbol, "BANKNIFTY");
        assert_eq!(put.option_type, OptionType::Put);
    }

    #[test]
    fn file_without_options_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "SECURITY_ID,UNDERLYING_SYMBOL,OPTION_TYPE").unwrap();
        writeln!(file, "13,NIFTY,XX").unwrap();
        let err = load_instruments(file.path()).unwrap_err();
        assert!(matches!(err, InstrumentLoadError::Empty(_)));
    }

    #[test]
    fn missing_file_is_an_error() {
        let err = load_instruments("/nonexistent/scrip-master.csv").unwrap_err();
        assert!(matches!(err, InstrumentLoadError::Read { .. }));
    }

    #[test]
    fn loads_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        let table = load_instruments(file.path()).unwrap();
        assert_eq!(table.len(), 3);
    }
}
