//! Structured error types for fetching and parsing vendor feeds.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DataError {
    #[error("network error fetching {url}: {reason}")]
    Network { url: String, reason: String },

    #[error("timed out fetching {url} after {timeout_secs}s")]
    Timeout { url: String, timeout_secs: u64 },

    #[error("input file not found: {}", path.display())]
    MissingInput { path: PathBuf },

    #[error("{source_name} feed is missing required column '{column}'")]
    Schema { source_name: String, column: String },

    #[error("{source_name} feed is not valid CSV: {reason}")]
    Csv { source_name: String, reason: String },

    #[error("failed to decompress {}: {reason}", path.display())]
    Decompression { path: PathBuf, reason: String },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl DataError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
