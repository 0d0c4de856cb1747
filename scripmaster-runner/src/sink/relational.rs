//! Relational sink backed by SQLite.
//!
//! One row per `security_id` (primary key). `trading_symbol` is unique on its
//! own, so a second security claiming an existing symbol is a data-quality
//! failure and is surfaced as [`SinkError::ConstraintViolation`], never
//! resolved by replacing the other row. A whole write runs in one
//! transaction and rolls back on the first failure.

use super::{SinkError, SinkReport};
use crate::config::RelationalStoreConfig;
use chrono::{SecondsFormat, Utc};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Transaction};
use scripmaster_core::NormalizedInstrument;
use std::time::Duration;

/// A row as stored, for inspection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredRow {
    pub exchange: Option<String>,
    pub security_id: String,
    pub symbol_name: Option<String>,
    pub trading_symbol: Option<String>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

pub struct RelationalSink {
    conn: Connection,
    table: String,
}

impl RelationalSink {
    pub fn open(config: &RelationalStoreConfig) -> Result<Self, SinkError> {
        if let Some(parent) = config.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| SinkError::Connection {
                store: "sqlite".into(),
                reason: format!("create {}: {e}", parent.display()),
            })?;
        }
        let conn = Connection::open(&config.path).map_err(|e| SinkError::Connection {
            store: format!("sqlite:{}", config.path.display()),
            reason: e.to_string(),
        })?;
        conn.busy_timeout(Duration::from_millis(config.busy_timeout_ms))
            .map_err(|e| SinkError::Connection {
                store: format!("sqlite:{}", config.path.display()),
                reason: e.to_string(),
            })?;
        Self::from_connection(conn, &config.table)
    }

    /// Wrap an existing connection. `table` must be a plain identifier.
    pub fn from_connection(conn: Connection, table: &str) -> Result<Self, SinkError> {
        let valid = table
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
            && table.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
        if !valid {
            return Err(SinkError::Write {
                store: "sqlite".into(),
                reason: format!("invalid table name '{table}'"),
            });
        }
        Ok(Self {
            conn,
            table: table.to_string(),
        })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    fn store_name(&self) -> String {
        format!("sqlite:{}", self.table)
    }

    fn write_error(&self, e: rusqlite::Error) -> SinkError {
        SinkError::Write {
            store: self.store_name(),
            reason: e.to_string(),
        }
    }

    /// Create the table and the trading_symbol index if missing.
    pub fn apply_schema(&self) -> Result<(), SinkError> {
        let t = &self.table;
        self.conn
            .execute_batch(&format!(
                "CREATE TABLE IF NOT EXISTS {t} (
                    exchange TEXT,
                    security_id TEXT PRIMARY KEY,
                    symbol_name TEXT,
                    trading_symbol TEXT UNIQUE,
                    created_at TIMESTAMP,
                    updated_at TIMESTAMP
                );
                CREATE INDEX IF NOT EXISTS idx_{t}_trading_symbol ON {t} (trading_symbol);"
            ))
            .map_err(|e| self.write_error(e))?;
        tracing::info!(table = %t, "sqlite schema applied");
        Ok(())
    }

    /// Upsert every record keyed by `security_id` in a single transaction.
    ///
    /// `created_at` is set on first insert only; `updated_at` moves only when
    /// a column actually changes, so re-applying a batch is a no-op.
    pub fn write(&mut self, records: &[NormalizedInstrument]) -> Result<SinkReport, SinkError> {
        if let Some(rec) = records.iter().find(|r| r.security_id.is_empty()) {
            return Err(SinkError::MissingKey {
                field: "security_id",
                trading_symbol: rec.trading_symbol.clone(),
            });
        }

        let store = self.store_name();
        let now = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        let t = self.table.clone();
        let sql = format!(
            "INSERT INTO {t} (exchange, security_id, symbol_name, trading_symbol, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)
             ON CONFLICT(security_id) DO UPDATE SET
                 exchange = excluded.exchange,
                 symbol_name = excluded.symbol_name,
                 trading_symbol = excluded.trading_symbol,
                 updated_at = excluded.updated_at
             WHERE {t}.exchange IS NOT excluded.exchange
                OR {t}.symbol_name IS NOT excluded.symbol_name
                OR {t}.trading_symbol IS NOT excluded.trading_symbol"
        );

        let tx = self.conn.transaction().map_err(|e| SinkError::Write {
            store: store.clone(),
            reason: e.to_string(),
        })?;

        let mut written = 0usize;
        {
            let mut stmt = tx.prepare(&sql).map_err(|e| SinkError::Write {
                store: store.clone(),
                reason: e.to_string(),
            })?;
            for rec in records {
                let changed = stmt
                    .execute(params![
                        rec.exchange,
                        rec.security_id,
                        rec.symbol_name,
                        rec.trading_symbol,
                        now
                    ])
                    .map_err(|e| classify(&tx, &t, &store, rec, e))?;
                written += changed;
            }
        }

        tx.commit().map_err(|e| SinkError::Write {
            store: store.clone(),
            reason: e.to_string(),
        })?;

        let report = SinkReport {
            store,
            records: records.len(),
            batches: 1,
            written,
            unchanged: records.len() - written,
        };
        tracing::info!(
            store = %report.store,
            records = report.records,
            written = report.written,
            unchanged = report.unchanged,
            "relational sink complete"
        );
        Ok(report)
    }

    pub fn count(&self) -> Result<u64, SinkError> {
        let n: i64 = self
            .conn
            .query_row(&format!("SELECT COUNT(*) FROM {}", self.table), [], |row| {
                row.get(0)
            })
            .map_err(|e| self.write_error(e))?;
        Ok(n as u64)
    }

    /// Up to `limit` rows in rowid order.
    pub fn sample(&self, limit: usize) -> Result<Vec<StoredRow>, SinkError> {
        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT exchange, security_id, symbol_name, trading_symbol, created_at, updated_at
                 FROM {} ORDER BY rowid LIMIT ?1",
                self.table
            ))
            .map_err(|e| self.write_error(e))?;
        let rows = stmt
            .query_map([limit as i64], |row| {
                Ok(StoredRow {
                    exchange: row.get(0)?,
                    security_id: row.get(1)?,
                    symbol_name: row.get(2)?,
                    trading_symbol: row.get(3)?,
                    created_at: row.get(4)?,
                    updated_at: row.get(5)?,
                })
            })
            .map_err(|e| self.write_error(e))?;
        rows.collect::<Result<Vec<_>, _>>()
            .map_err(|e| self.write_error(e))
    }
}

/// Map a failed upsert to a sink error, naming the row that already holds the
/// symbol when the failure is a uniqueness conflict.
fn classify(
    tx: &Transaction<'_>,
    table: &str,
    store: &str,
    rec: &NormalizedInstrument,
    e: rusqlite::Error,
) -> SinkError {
    match &e {
        rusqlite::Error::SqliteFailure(err, _) if err.code == ErrorCode::ConstraintViolation => {
            let existing = tx
                .query_row(
                    &format!("SELECT security_id FROM {table} WHERE trading_symbol = ?1"),
                    [&rec.trading_symbol],
                    |row| row.get::<_, String>(0),
                )
                .optional()
                .ok()
                .flatten();
            tracing::error!(
                security_id = %rec.security_id,
                trading_symbol = %rec.trading_symbol,
                existing = existing.as_deref().unwrap_or("?"),
                "trading symbol uniqueness violated"
            );
            SinkError::ConstraintViolation {
                security_id: rec.security_id.clone(),
                trading_symbol: rec.trading_symbol.clone(),
                existing_security_id: existing,
            }
        }
        _ => SinkError::Write {
            store: store.to_string(),
            reason: e.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sink() -> RelationalSink {
        let conn = Connection::open_in_memory().unwrap();
        let sink = RelationalSink::from_connection(conn, "dhan_nse").unwrap();
        sink.apply_schema().unwrap();
        sink
    }

    fn dhan(security_id: &str, symbol: &str, name: &str) -> NormalizedInstrument {
        NormalizedInstrument {
            exchange: "NSE".into(),
            instrument_key: security_id.into(),
            trading_symbol: symbol.into(),
            security_id: security_id.into(),
            symbol_name: name.into(),
            ..Default::default()
        }
    }

    fn batch() -> Vec<NormalizedInstrument> {
        vec![
            dhan("1594", "INFY", "INFOSYS LIMITED"),
            dhan("11536", "TCS", "TATA CONSULTANCY SERVICES LTD"),
            dhan("1333", "HDFCBANK", "HDFC BANK LTD"),
        ]
    }

    #[test]
    fn upsert_is_idempotent() {
        let mut sink = sink();

        let first = sink.write(&batch()).unwrap();
        let rows_after_first = sink.sample(10).unwrap();

        let second = sink.write(&batch()).unwrap();
        let rows_after_second = sink.sample(10).unwrap();

        assert_eq!(first.written, 3);
        assert_eq!(second.written, 0);
        assert_eq!(second.unchanged, 3);
        assert_eq!(sink.count().unwrap(), 3);
        assert_eq!(rows_after_first, rows_after_second);
    }

    #[test]
    fn changed_row_is_updated_in_place_and_keeps_created_at() {
        let mut sink = sink();
        sink.write(&batch()).unwrap();
        let before = sink.sample(1).unwrap().remove(0);

        std::thread::sleep(Duration::from_millis(5));
        let report = sink
            .write(&[dhan("1594", "INFY", "INFOSYS LTD (RENAMED)")])
            .unwrap();
        let after = sink.sample(1).unwrap().remove(0);

        assert_eq!(report.written, 1);
        assert_eq!(sink.count().unwrap(), 3);
        assert_eq!(after.symbol_name.as_deref(), Some("INFOSYS LTD (RENAMED)"));
        assert_eq!(after.created_at, before.created_at);
        assert_ne!(after.updated_at, before.updated_at);
    }

    #[test]
    fn symbol_claimed_by_another_security_is_a_constraint_violation() {
        let mut sink = sink();
        sink.write(&batch()).unwrap();

        let err = sink
            .write(&[dhan("999", "WIPRO", "WIPRO LTD"), dhan("2000", "INFY", "IMPOSTOR")])
            .unwrap_err();

        match err {
            SinkError::ConstraintViolation {
                security_id,
                trading_symbol,
                existing_security_id,
            } => {
                assert_eq!(security_id, "2000");
                assert_eq!(trading_symbol, "INFY");
                assert_eq!(existing_security_id.as_deref(), Some("1594"));
            }
            other => panic!("expected constraint violation, got {other:?}"),
        }
        // The whole write rolled back, including WIPRO.
        assert_eq!(sink.count().unwrap(), 3);
    }

    #[test]
    fn duplicate_symbol_within_one_batch_is_surfaced() {
        let mut sink = sink();
        let err = sink
            .write(&[dhan("1", "ABC", "A"), dhan("2", "ABC", "B")])
            .unwrap_err();
        assert!(matches!(err, SinkError::ConstraintViolation { .. }));
        assert_eq!(sink.count().unwrap(), 0);
    }

    #[test]
    fn empty_security_id_is_rejected() {
        let mut sink = sink();
        let err = sink.write(&[dhan("", "INFY", "X")]).unwrap_err();
        assert!(matches!(err, SinkError::MissingKey { field: "security_id", .. }));
    }

    #[test]
    fn schema_is_reapplied_safely() {
        let mut sink = sink();
        sink.write(&batch()).unwrap();
        sink.apply_schema().unwrap();
        assert_eq!(sink.count().unwrap(), 3);
    }

    #[test]
    fn invalid_table_name_is_rejected() {
        let conn = Connection::open_in_memory().unwrap();
        assert!(RelationalSink::from_connection(conn, "x; DROP TABLE y").is_err());
    }

    #[test]
    fn open_creates_file_and_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let config = RelationalStoreConfig {
            path: dir.path().join("db").join("nse_data.db"),
            table: "dhan_nse".into(),
            busy_timeout_ms: 1000,
        };
        let mut sink = RelationalSink::open(&config).unwrap();
        sink.apply_schema().unwrap();
        sink.write(&batch()).unwrap();
        assert!(config.path.exists());
    }
}
