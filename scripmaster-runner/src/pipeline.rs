//! Pipeline orchestration.
//!
//! Stages run in a fixed order:
//!
//! 1. fetch both feeds into a scratch directory
//! 2. apply store schemas
//! 3. extract source A and source B
//! 4. persist A to the document sink and B to the relational sink
//! 5. reconcile A against B
//! 6. write reports, then the run manifest
//!
//! Sinks consume extractor output, not reconciler output. Each sink is
//! optional; without sinks the run only reconciles and reports. Every failure
//! is tagged with the stage that produced it, and the scratch directory is
//! removed whether the run succeeds or not.

use crate::config::{ConfigError, PipelineConfig};
use crate::manifest::{save_manifest, ExtractedCounts, FeedRecord, RunManifest, SCHEMA_VERSION};
use crate::report::{ReportError, ReportWriter, SourceLayout};
use crate::sink::{DocumentSink, MongoDocumentStore, RelationalSink, SinkError};
use chrono::Utc;
use scripmaster_core::{extract_file, reconcile, DataError, FeedFetcher, ScratchDir};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Setup,
    Fetch,
    Schema,
    Extract,
    DocumentSink,
    RelationalSink,
    Reconcile,
    Report,
    Manifest,
    Cleanup,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Stage::Setup => "setup",
            Stage::Fetch => "fetch",
            Stage::Schema => "schema",
            Stage::Extract => "extract",
            Stage::DocumentSink => "document sink",
            Stage::RelationalSink => "relational sink",
            Stage::Reconcile => "reconcile",
            Stage::Report => "report",
            Stage::Manifest => "manifest",
            Stage::Cleanup => "cleanup",
        };
        f.write_str(s)
    }
}

/// Underlying cause of a stage failure.
#[derive(Debug, Error)]
pub enum StageFailure {
    #[error(transparent)]
    Data(#[from] DataError),

    #[error(transparent)]
    Sink(#[from] SinkError),

    #[error(transparent)]
    Report(#[from] ReportError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[derive(Debug, Error)]
#[error("{stage} stage failed")]
pub struct RunError {
    pub stage: Stage,
    #[source]
    pub source: StageFailure,
}

/// Tag a stage result with its stage, logging the failure once.
pub trait StageResultExt<T> {
    fn stage(self, stage: Stage) -> Result<T, RunError>;
}

impl<T, E: Into<StageFailure>> StageResultExt<T> for Result<T, E> {
    fn stage(self, stage: Stage) -> Result<T, RunError> {
        self.map_err(|e| {
            let source = e.into();
            tracing::error!(stage = %stage, error = %source, "stage failed");
            RunError { stage, source }
        })
    }
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub manifest: RunManifest,
    pub manifest_path: PathBuf,
}

pub struct Pipeline<'a> {
    config: &'a PipelineConfig,
    document: Option<DocumentSink>,
    relational: Option<RelationalSink>,
}

impl<'a> Pipeline<'a> {
    pub fn new(config: &'a PipelineConfig) -> Self {
        Self {
            config,
            document: None,
            relational: None,
        }
    }

    pub fn with_document_sink(mut self, sink: DocumentSink) -> Self {
        self.document = Some(sink);
        self
    }

    pub fn with_relational_sink(mut self, sink: RelationalSink) -> Self {
        self.relational = Some(sink);
        self
    }

    /// Attach both sinks as described by the config. Failing to reach either
    /// store is a setup failure.
    pub fn with_configured_sinks(self) -> Result<Self, RunError> {
        let config = self.config;
        let store = MongoDocumentStore::connect(&config.document_store).stage(Stage::Setup)?;
        let document = DocumentSink::new(Box::new(store), config.document_store.batch_size);
        let relational = RelationalSink::open(&config.relational_store).stage(Stage::Setup)?;
        Ok(self
            .with_document_sink(document)
            .with_relational_sink(relational))
    }

    /// Run every stage. The scratch directory is closed on success and on
    /// failure; a cleanup failure after a stage failure is logged and the
    /// stage failure is returned.
    pub fn run(mut self) -> Result<RunSummary, RunError> {
        let scratch = ScratchDir::create(self.config.work_dir.as_deref()).stage(Stage::Setup)?;
        let outcome = self.run_stages(&scratch);
        let cleanup = scratch.close().stage(Stage::Cleanup);

        match (outcome, cleanup) {
            (Ok(summary), Ok(())) => Ok(summary),
            (Ok(_), Err(cleanup_err)) => Err(cleanup_err),
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(cleanup_err)) => {
                tracing::warn!(error = %cleanup_err, "scratch cleanup failed after an earlier failure");
                Err(e)
            }
        }
    }

    fn run_stages(&mut self, scratch: &ScratchDir) -> Result<RunSummary, RunError> {
        let config = self.config;
        let started_at = Utc::now();

        let profile_a = config.source_a.resolve_profile().stage(Stage::Setup)?;
        let profile_b = config.source_b.resolve_profile().stage(Stage::Setup)?;
        let feed_a = config.source_a.feed_source().stage(Stage::Setup)?;
        let feed_b = config.source_b.feed_source().stage(Stage::Setup)?;
        let fetcher =
            FeedFetcher::new(Duration::from_secs(config.http_timeout_secs)).stage(Stage::Setup)?;

        // ── Fetch ──
        let fetched_a = fetcher.fetch(&feed_a, scratch).stage(Stage::Fetch)?;
        let fetched_b = fetcher.fetch(&feed_b, scratch).stage(Stage::Fetch)?;

        // ── Schema ──
        if let Some(doc) = &self.document {
            doc.prepare().stage(Stage::Schema)?;
        }
        if let Some(rel) = &self.relational {
            rel.apply_schema().stage(Stage::Schema)?;
        }

        // ── Extract ──
        let records_a = extract_file(&profile_a, &fetched_a.csv_path).stage(Stage::Extract)?;
        let records_b = extract_file(&profile_b, &fetched_b.csv_path).stage(Stage::Extract)?;
        tracing::info!(
            source_a = %config.source_a.label,
            count_a = records_a.len(),
            source_b = %config.source_b.label,
            count_b = records_b.len(),
            "extracted equity records"
        );

        // ── Persist ──
        let mut sinks = Vec::new();
        if let Some(doc) = &self.document {
            sinks.push(doc.write(&records_a).stage(Stage::DocumentSink)?);
        }
        if let Some(rel) = self.relational.as_mut() {
            sinks.push(rel.write(&records_b).stage(Stage::RelationalSink)?);
        }
        if sinks.is_empty() {
            tracing::info!("no sinks configured, persistence skipped");
        }

        // ── Reconcile ──
        let result = reconcile(&records_a, &records_b);
        let counts = result.summary();
        tracing::info!(
            stage = %Stage::Reconcile,
            common = counts.common,
            only_a = counts.only_a,
            only_b = counts.only_b,
            "reconciliation complete"
        );

        // ── Report ──
        let reports = ReportWriter::new(&config.output_dir)
            .write(
                &result,
                SourceLayout {
                    label: &config.source_a.label,
                    columns: &profile_a.report_columns,
                },
                SourceLayout {
                    label: &config.source_b.label,
                    columns: &profile_b.report_columns,
                },
            )
            .stage(Stage::Report)?;

        // ── Manifest ──
        let manifest = RunManifest {
            schema_version: SCHEMA_VERSION,
            started_at,
            finished_at: Utc::now(),
            feeds: vec![FeedRecord::from(&fetched_a), FeedRecord::from(&fetched_b)],
            extracted: ExtractedCounts {
                source_a: records_a.len(),
                source_b: records_b.len(),
            },
            reconciliation: counts,
            sinks,
            reports,
        };
        let manifest_path = save_manifest(&manifest, &config.output_dir).stage(Stage::Manifest)?;
        tracing::info!(path = %manifest_path.display(), "run manifest written");

        Ok(RunSummary {
            manifest,
            manifest_path,
        })
    }
}
