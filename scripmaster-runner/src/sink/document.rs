//! Document-store sink.
//!
//! Records are split into batches of `batch_size` and each batch is handed to
//! the store as one dispatch. Writes inside a batch are unordered: a failing
//! record does not stop the rest of its batch, and a batch with failures does
//! not stop later batches. Failures are reported once every batch has been
//! submitted, so callers must not assume a batch is all-or-nothing.
//!
//! An unreachable store is different: it aborts the sink immediately.

use super::{SinkError, SinkReport};
use crate::config::DocumentStoreConfig;
use mongodb::bson::{doc, Bson, Document};
use mongodb::error::ErrorKind;
use mongodb::options::{ClientOptions, IndexOptions};
use mongodb::sync::{Client, Collection, Database};
use mongodb::IndexModel;
use scripmaster_core::NormalizedInstrument;
use std::time::Duration;

/// Result of one batch dispatch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    pub written: usize,
    pub unchanged: usize,
    pub failures: Vec<RecordFailure>,
    /// Batch-level problem reported alongside the per-record results, such as
    /// an unsatisfied write concern.
    pub batch_error: Option<String>,
}

impl BatchOutcome {
    /// Every key in `keys` failed for the same reason.
    pub fn all_failed(keys: &[&str], reason: &str) -> Self {
        Self {
            failures: keys
                .iter()
                .map(|key| RecordFailure {
                    instrument_key: key.to_string(),
                    reason: reason.to_string(),
                })
                .collect(),
            ..Default::default()
        }
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty() && self.batch_error.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordFailure {
    pub instrument_key: String,
    pub reason: String,
}

/// A document collection keyed by `instrument_key`.
pub trait DocumentStore {
    /// Human-readable store name for logs and reports.
    fn name(&self) -> &str;

    /// Create the unique index on `instrument_key` if it does not exist.
    fn ensure_index(&self) -> Result<(), SinkError>;

    /// Upsert every record of the batch, unordered.
    ///
    /// Per-record failures are returned in the outcome. `Err` means the batch
    /// could not be dispatched at all.
    fn upsert_batch(&self, batch: &[NormalizedInstrument]) -> Result<BatchOutcome, SinkError>;

    fn count(&self) -> Result<u64, SinkError>;

    /// Up to `limit` stored documents, rendered for display.
    fn sample(&self, limit: usize) -> Result<Vec<String>, SinkError>;
}

pub struct DocumentSink {
    store: Box<dyn DocumentStore>,
    batch_size: usize,
}

impl DocumentSink {
    pub fn new(store: Box<dyn DocumentStore>, batch_size: usize) -> Self {
        Self {
            store,
            batch_size: batch_size.max(1),
        }
    }

    pub fn prepare(&self) -> Result<(), SinkError> {
        self.store.ensure_index()?;
        tracing::info!(store = self.store.name(), "unique index on instrument_key applied");
        Ok(())
    }

    pub fn write(&self, records: &[NormalizedInstrument]) -> Result<SinkReport, SinkError> {
        if let Some(rec) = records.iter().find(|r| r.instrument_key.is_empty()) {
            return Err(SinkError::MissingKey {
                field: "instrument_key",
                trading_symbol: rec.trading_symbol.clone(),
            });
        }

        let store = self.store.name().to_string();
        let total_batches = records.len().div_ceil(self.batch_size);
        let mut report = SinkReport {
            store: store.clone(),
            records: records.len(),
            ..Default::default()
        };
        let mut failed_records = 0usize;
        let mut failed_batches = 0usize;
        let mut first_cause: Option<String> = None;

        for (i, batch) in records.chunks(self.batch_size).enumerate() {
            let outcome = self.store.upsert_batch(batch)?;
            report.batches += 1;
            report.written += outcome.written;
            report.unchanged += outcome.unchanged;

            if !outcome.is_clean() {
                failed_batches += 1;
                failed_records += outcome.failures.len();
                for failure in &outcome.failures {
                    tracing::warn!(
                        store = %store,
                        instrument_key = %failure.instrument_key,
                        reason = %failure.reason,
                        "document upsert failed"
                    );
                }
                if let Some(err) = &outcome.batch_error {
                    tracing::warn!(store = %store, batch = i + 1, reason = %err, "batch reported an error");
                }
                if first_cause.is_none() {
                    first_cause = outcome
                        .failures
                        .first()
                        .map(|f| format!("{}: {}", f.instrument_key, f.reason))
                        .or_else(|| outcome.batch_error.clone());
                }
            }

            tracing::info!(
                store = %store,
                batch = i + 1,
                of = total_batches,
                size = batch.len(),
                failed = outcome.failures.len(),
                "dispatched batch"
            );
        }

        if failed_batches > 0 {
            return Err(SinkError::Write {
                store,
                reason: format!(
                    "{failed_records} of {} record(s) failed across {failed_batches} of {} batch(es); first: {}",
                    report.records,
                    report.batches,
                    first_cause.unwrap_or_default()
                ),
            });
        }

        tracing::info!(
            store = %report.store,
            records = report.records,
            written = report.written,
            unchanged = report.unchanged,
            "document sink complete"
        );
        Ok(report)
    }
}

/// Driver options for `config`: the connection string, with the configured
/// timeouts taking precedence over any given in the URI.
pub fn client_options(config: &DocumentStoreConfig) -> Result<ClientOptions, SinkError> {
    let mut options = ClientOptions::parse(config.uri.as_str())
        .run()
        .map_err(|e| SinkError::Connection {
            store: "mongodb".into(),
            reason: e.to_string(),
        })?;
    options.server_selection_timeout = Some(Duration::from_millis(config.server_selection_timeout_ms));
    options.connect_timeout = Some(Duration::from_millis(config.connect_timeout_ms));
    Ok(options)
}

/// One unordered `update` command for a batch.
#[derive(Debug)]
pub struct UpdateCommand<'a> {
    pub command: Document,
    /// Keys in the order of the command's `updates` array.
    pub sent: Vec<&'a str>,
    /// Records that could not be encoded and were left out.
    pub rejected: Vec<RecordFailure>,
}

pub fn build_update_command<'a>(
    collection: &str,
    batch: &'a [NormalizedInstrument],
) -> UpdateCommand<'a> {
    let mut updates = Vec::with_capacity(batch.len());
    let mut sent = Vec::with_capacity(batch.len());
    let mut rejected = Vec::new();

    for rec in batch {
        match mongodb::bson::to_document(rec) {
            Ok(fields) => {
                updates.push(doc! {
                    "q": { "instrument_key": rec.instrument_key.as_str() },
                    "u": { "$set": fields },
                    "upsert": true,
                });
                sent.push(rec.instrument_key.as_str());
            }
            Err(e) => rejected.push(RecordFailure {
                instrument_key: rec.instrument_key.clone(),
                reason: e.to_string(),
            }),
        }
    }

    UpdateCommand {
        command: doc! {
            "update": collection,
            "updates": updates,
            "ordered": false,
        },
        sent,
        rejected,
    }
}

/// Read an `update` command reply for the keys in `sent`.
///
/// `n` counts matched plus upserted documents, so whatever matched without
/// being modified is unchanged. `writeErrors[].index` points into `sent`.
pub fn outcome_from_reply(sent: &[&str], reply: &Document) -> BatchOutcome {
    let upserted = match reply.get("upserted") {
        Some(Bson::Array(items)) => items.len(),
        _ => 0,
    };
    let written = upserted + count_field(reply, "nModified");
    let matched = count_field(reply, "n");

    let failures = match reply.get("writeErrors") {
        Some(Bson::Array(items)) => items
            .iter()
            .filter_map(Bson::as_document)
            .map(|err| {
                let index = count_field(err, "index");
                RecordFailure {
                    instrument_key: sent
                        .get(index)
                        .map(|key| key.to_string())
                        .unwrap_or_else(|| format!("<update {index}>")),
                    reason: error_text(err),
                }
            })
            .collect(),
        _ => Vec::new(),
    };

    let batch_error = reply
        .get("writeConcernError")
        .and_then(Bson::as_document)
        .map(|err| format!("write concern: {}", error_text(err)));

    BatchOutcome {
        written,
        unchanged: matched.saturating_sub(written),
        failures,
        batch_error,
    }
}

fn count_field(doc: &Document, key: &str) -> usize {
    match doc.get(key) {
        Some(Bson::Int32(v)) => (*v).max(0) as usize,
        Some(Bson::Int64(v)) => (*v).max(0) as usize,
        Some(Bson::Double(v)) if *v >= 0.0 => *v as usize,
        _ => 0,
    }
}

fn error_text(err: &Document) -> String {
    let code = match err.get("code") {
        Some(Bson::Int32(c)) => i64::from(*c),
        Some(Bson::Int64(c)) => *c,
        _ => 0,
    };
    let msg = err.get_str("errmsg").unwrap_or("unknown error");
    format!("E{code}: {msg}")
}

/// MongoDB collection accessed through the driver's blocking API.
pub struct MongoDocumentStore {
    database: Database,
    collection: Collection<Document>,
    collection_name: String,
    name: String,
}

impl MongoDocumentStore {
    pub fn connect(config: &DocumentStoreConfig) -> Result<Self, SinkError> {
        let client = Client::with_options(client_options(config)?).map_err(|e| {
            SinkError::Connection {
                store: "mongodb".into(),
                reason: e.to_string(),
            }
        })?;
        let database = client.database(&config.database);
        let collection = database.collection::<Document>(&config.collection);
        Ok(Self {
            database,
            collection,
            collection_name: config.collection.clone(),
            name: format!("mongodb:{}.{}", config.database, config.collection),
        })
    }

    fn error(&self, e: mongodb::error::Error) -> SinkError {
        match *e.kind {
            ErrorKind::ServerSelection { .. } => SinkError::Connection {
                store: self.name.clone(),
                reason: e.to_string(),
            },
            _ => SinkError::Write {
                store: self.name.clone(),
                reason: e.to_string(),
            },
        }
    }
}

impl DocumentStore for MongoDocumentStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn ensure_index(&self) -> Result<(), SinkError> {
        let index = IndexModel::builder()
            .keys(doc! { "instrument_key": 1 })
            .options(IndexOptions::builder().unique(true).build())
            .build();
        self.collection
            .create_index(index)
            .run()
            .map_err(|e| self.error(e))?;
        Ok(())
    }

    fn upsert_batch(&self, batch: &[NormalizedInstrument]) -> Result<BatchOutcome, SinkError> {
        let UpdateCommand {
            command,
            sent,
            rejected,
        } = build_update_command(&self.collection_name, batch);

        let mut outcome = if sent.is_empty() {
            BatchOutcome::default()
        } else {
            match self.database.run_command(command).run() {
                Ok(reply) => outcome_from_reply(&sent, &reply),
                Err(e) => match self.error(e) {
                    conn @ SinkError::Connection { .. } => return Err(conn),
                    other => BatchOutcome::all_failed(&sent, &other.to_string()),
                },
            }
        };
        outcome.failures.extend(rejected);
        Ok(outcome)
    }

    fn count(&self) -> Result<u64, SinkError> {
        self.collection
            .count_documents(doc! {})
            .run()
            .map_err(|e| self.error(e))
    }

    fn sample(&self, limit: usize) -> Result<Vec<String>, SinkError> {
        let cursor = self
            .collection
            .find(doc! {})
            .limit(limit as i64)
            .run()
            .map_err(|e| self.error(e))?;
        cursor
            .map(|d| d.map(|d| d.to_string()).map_err(|e| self.error(e)))
            .collect()
    }
}
