//! Persistence sinks for normalized instruments.
//!
//! - `document`: batched, unordered upserts keyed by `instrument_key`
//! - `relational`: single-transaction upserts keyed by `security_id`

pub mod document;
pub mod relational;

pub use document::{BatchOutcome, DocumentSink, DocumentStore, MongoDocumentStore, RecordFailure};
pub use relational::{RelationalSink, StoredRow};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("cannot reach {store}: {reason}")]
    Connection { store: String, reason: String },

    #[error("write to {store} failed: {reason}")]
    Write { store: String, reason: String },

    #[error(
        "trading symbol '{trading_symbol}' for security_id {security_id} is already held by {}",
        existing_security_id.as_deref().unwrap_or("another row")
    )]
    ConstraintViolation {
        security_id: String,
        trading_symbol: String,
        existing_security_id: Option<String>,
    },

    #[error("record '{trading_symbol}' has an empty {field}")]
    MissingKey {
        field: &'static str,
        trading_symbol: String,
    },
}

/// What one sink did with one source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SinkReport {
    pub store: String,
    pub records: usize,
    pub batches: usize,
    /// Inserted or changed.
    pub written: usize,
    /// Matched an identical existing record.
    pub unchanged: usize,
}
