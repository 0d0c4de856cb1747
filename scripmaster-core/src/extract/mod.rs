//! Source extraction: vendor CSV → [`NormalizedInstrument`] records.
//!
//! One generic extractor driven by a [`VendorProfile`]. Rows are kept when the
//! exchange cell equals the profile's target exchange and the instrument-type
//! cell matches the profile's type case-insensitively. Output preserves input
//! order; an empty result is valid.

pub mod profile;

pub use profile::{ColumnMapping, VendorProfile};

use crate::data::DataError;
use crate::domain::{normalize_symbol, NormalizedInstrument};
use csv::StringRecord;
use std::io::Read;
use std::path::Path;

/// Extract equity records from a CSV file on disk.
pub fn extract_file(
    profile: &VendorProfile,
    path: &Path,
) -> Result<Vec<NormalizedInstrument>, DataError> {
    tracing::info!(source = %profile.name, path = %path.display(), "reading feed");
    let file = std::fs::File::open(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => DataError::MissingInput {
            path: path.to_path_buf(),
        },
        _ => DataError::Io {
            path: path.to_path_buf(),
            source: e,
        },
    })?;
    extract_reader(profile, file)
}

/// Extract equity records from any CSV reader with a header row.
pub fn extract_reader<R: Read>(
    profile: &VendorProfile,
    reader: R,
) -> Result<Vec<NormalizedInstrument>, DataError> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    let headers = rdr.headers().map_err(|e| csv_error(profile, e))?.clone();
    let cols = ResolvedColumns::resolve(profile, &headers)?;

    let mut out = Vec::new();
    let mut rows = 0usize;
    let mut blank_symbols = 0usize;
    let mut record = StringRecord::new();

    while rdr
        .read_record(&mut record)
        .map_err(|e| csv_error(profile, e))?
    {
        rows += 1;
        if !cols.qualifies(profile, &record) {
            continue;
        }
        let instrument = cols.normalize(profile, &record);
        if instrument.trading_symbol.is_empty() {
            blank_symbols += 1;
            continue;
        }
        out.push(instrument);
    }

    if blank_symbols > 0 {
        tracing::warn!(
            source = %profile.name,
            skipped = blank_symbols,
            "skipped qualifying rows with a blank trading symbol"
        );
    }
    tracing::info!(
        source = %profile.name,
        rows,
        extracted = out.len(),
        exchange = %profile.target_exchange,
        "extracted equity records"
    );
    Ok(out)
}

fn csv_error(profile: &VendorProfile, e: csv::Error) -> DataError {
    DataError::Csv {
        source_name: profile.name.clone(),
        reason: e.to_string(),
    }
}

/// Header positions for every mapped column.
struct ResolvedColumns {
    exchange: usize,
    instrument_type: usize,
    instrument_key: usize,
    trading_symbol: usize,
    name: Option<usize>,
    short_name: Option<usize>,
    security_id: Option<usize>,
    symbol_name: Option<usize>,
    isin: Option<usize>,
}

impl ResolvedColumns {
    fn resolve(profile: &VendorProfile, headers: &StringRecord) -> Result<Self, DataError> {
        let position = |name: &str| {
            headers
                .iter()
                .position(|h| h.trim_start_matches('\u{feff}').trim() == name)
        };

        for column in profile.required_columns() {
            if position(column).is_none() {
                return Err(DataError::Schema {
                    source_name: profile.name.clone(),
                    column: column.to_string(),
                });
            }
        }

        let optional = |name: &Option<String>| name.as_deref().and_then(position);
        let m = &profile.columns;

        // Required columns were checked above.
        let required = |name: &str| position(name).unwrap_or_default();

        Ok(Self {
            exchange: required(&profile.exchange_column),
            instrument_type: required(&profile.instrument_type_column),
            instrument_key: required(&m.instrument_key),
            trading_symbol: required(&m.trading_symbol),
            name: optional(&m.name),
            short_name: optional(&m.short_name),
            security_id: optional(&m.security_id),
            symbol_name: optional(&m.symbol_name),
            isin: optional(&m.isin),
        })
    }

    fn qualifies(&self, profile: &VendorProfile, record: &StringRecord) -> bool {
        cell(record, self.exchange) == profile.target_exchange
            && cell(record, self.instrument_type).eq_ignore_ascii_case(&profile.instrument_type)
    }

    fn normalize(&self, profile: &VendorProfile, record: &StringRecord) -> NormalizedInstrument {
        let opt = |idx: Option<usize>| idx.map(|i| cell(record, i).to_string()).unwrap_or_default();

        NormalizedInstrument {
            exchange: profile.normalized_exchange.clone(),
            instrument_key: cell(record, self.instrument_key).to_string(),
            trading_symbol: normalize_symbol(cell(record, self.trading_symbol)),
            name: opt(self.name),
            security_id: opt(self.security_id),
            symbol_name: opt(self.symbol_name),
            short_name: opt(self.short_name),
            isin: opt(self.isin),
        }
    }
}

/// Trimmed cell value; short rows read as empty.
fn cell(record: &StringRecord, idx: usize) -> &str {
    record.get(idx).unwrap_or("").trim()
}
