//! Reconciliation reports: three CSV files in the output directory.
//!
//! - `common_stocks.csv` with the merged common columns
//! - `only_in_<label>.csv` per source, in that source profile's column order
//!
//! Headers are always written, so an empty partition still produces a file a
//! downstream reader can parse. Each file is written to a `.tmp` sibling and
//! renamed into place.

use scripmaster_core::{InstrumentColumn, NormalizedInstrument, ReconciliationResult};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const COMMON_FILE: &str = "common_stocks.csv";

/// Column order of `common_stocks.csv`.
pub const COMMON_HEADER: [&str; 8] = [
    "exchange",
    "instrument_key",
    "security_id",
    "symbol_name",
    "short_name",
    "name",
    "isin",
    "trading_symbol",
];

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("report I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write CSV {}: {source}", path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}

/// How one source's "only in" report is named and laid out.
#[derive(Debug, Clone, Copy)]
pub struct SourceLayout<'a> {
    pub label: &'a str,
    pub columns: &'a [InstrumentColumn],
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportPaths {
    pub common: PathBuf,
    pub only_a: PathBuf,
    pub only_b: PathBuf,
}

pub fn only_in_file(label: &str) -> String {
    format!("only_in_{label}.csv")
}

pub struct ReportWriter {
    output_dir: PathBuf,
}

impl ReportWriter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn write(
        &self,
        result: &ReconciliationResult,
        a: SourceLayout<'_>,
        b: SourceLayout<'_>,
    ) -> Result<ReportPaths, ReportError> {
        fs::create_dir_all(&self.output_dir).map_err(|e| ReportError::Io {
            path: self.output_dir.clone(),
            source: e,
        })?;

        let common = self.output_dir.join(COMMON_FILE);
        write_atomic(&common, |wtr| {
            wtr.write_record(COMMON_HEADER)?;
            for rec in &result.common {
                wtr.write_record([
                    &rec.exchange,
                    &rec.instrument_key,
                    &rec.security_id,
                    &rec.symbol_name,
                    &rec.short_name,
                    &rec.name,
                    &rec.isin,
                    &rec.trading_symbol,
                ])?;
            }
            Ok(())
        })?;

        let only_a = self.output_dir.join(only_in_file(a.label));
        write_only_in(&only_a, a.columns, &result.only_a)?;

        let only_b = self.output_dir.join(only_in_file(b.label));
        write_only_in(&only_b, b.columns, &result.only_b)?;

        tracing::info!(
            dir = %self.output_dir.display(),
            common = result.common.len(),
            only_a = result.only_a.len(),
            only_b = result.only_b.len(),
            "reports written"
        );

        Ok(ReportPaths {
            common,
            only_a,
            only_b,
        })
    }
}

fn write_only_in(
    path: &Path,
    columns: &[InstrumentColumn],
    records: &[NormalizedInstrument],
) -> Result<(), ReportError> {
    write_atomic(path, |wtr| {
        wtr.write_record(columns.iter().map(|c| c.as_str()))?;
        for rec in records {
            wtr.write_record(columns.iter().map(|c| rec.field(*c)))?;
        }
        Ok(())
    })
}

/// Write via a `.tmp` sibling, then rename over `path`. The sibling is
/// removed on every failure.
fn write_atomic<F>(path: &Path, fill: F) -> Result<(), ReportError>
where
    F: FnOnce(&mut csv::Writer<fs::File>) -> csv::Result<()>,
{
    let tmp = path.with_extension("csv.tmp");
    let result = write_then_rename(path, &tmp, fill);
    if result.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    result
}

fn write_then_rename<F>(path: &Path, tmp: &Path, fill: F) -> Result<(), ReportError>
where
    F: FnOnce(&mut csv::Writer<fs::File>) -> csv::Result<()>,
{
    let csv_err = |source| ReportError::Csv {
        path: path.to_path_buf(),
        source,
    };

    let mut wtr = csv::Writer::from_path(tmp).map_err(csv_err)?;
    fill(&mut wtr).map_err(csv_err)?;
    wtr.flush().map_err(|e| ReportError::Io {
        path: tmp.to_path_buf(),
        source: e,
    })?;
    drop(wtr);

    fs::rename(tmp, path).map_err(|e| ReportError::Io {
        path: path.to_path_buf(),
        source: e,
    })
}
