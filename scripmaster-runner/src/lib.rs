//! scripmaster runner: configuration, persistence sinks, reports and the
//! pipeline that ties them to the core extractors and reconciler.
//!
//! - `config`: TOML pipeline configuration with environment overrides
//! - `sink`: MongoDB document sink and SQLite relational sink
//! - `report`: the three reconciliation CSVs
//! - `manifest`: JSON run manifest
//! - `pipeline`: stage orchestration with stage-tagged errors

pub mod config;
pub mod manifest;
pub mod pipeline;
pub mod report;
pub mod sink;

pub use config::{ConfigError, PipelineConfig};
pub use manifest::{load_manifest, save_manifest, RunManifest};
pub use pipeline::{Pipeline, RunError, RunSummary, Stage, StageFailure};
pub use report::{ReportError, ReportPaths, ReportWriter};
pub use sink::{DocumentSink, DocumentStore, MongoDocumentStore, RelationalSink, SinkError, SinkReport};
