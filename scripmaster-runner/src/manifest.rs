//! Run manifest: a JSON record of what one pipeline run consumed and produced.
//!
//! The manifest carries a `schema_version`; manifests written by a newer
//! version are rejected on load.

use crate::report::ReportPaths;
use crate::sink::SinkReport;
use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use scripmaster_core::data::FetchedFeed;
use scripmaster_core::ReconciliationCounts;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const SCHEMA_VERSION: u32 = 1;
pub const MANIFEST_FILE: &str = "run_manifest.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunManifest {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub feeds: Vec<FeedRecord>,
    pub extracted: ExtractedCounts,
    pub reconciliation: ReconciliationCounts,
    /// Empty when persistence was skipped.
    #[serde(default)]
    pub sinks: Vec<SinkReport>,
    pub reports: ReportPaths,
}

fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedRecord {
    pub label: String,
    pub origin: String,
    pub bytes: u64,
    pub blake3: String,
}

impl From<&FetchedFeed> for FeedRecord {
    fn from(feed: &FetchedFeed) -> Self {
        Self {
            label: feed.label.clone(),
            origin: feed.origin.clone(),
            bytes: feed.raw_bytes,
            blake3: feed.raw_hash.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedCounts {
    pub source_a: usize,
    pub source_b: usize,
}

/// Write `run_manifest.json` into `output_dir` and return its path.
pub fn save_manifest(manifest: &RunManifest, output_dir: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("failed to create output dir: {}", output_dir.display()))?;
    let json =
        serde_json::to_string_pretty(manifest).context("failed to serialize run manifest")?;

    let path = output_dir.join(MANIFEST_FILE);
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json).with_context(|| format!("failed to write {}", tmp.display()))?;
    std::fs::rename(&tmp, &path)
        .with_context(|| format!("failed to move manifest into {}", path.display()))?;
    Ok(path)
}

pub fn load_manifest(path: &Path) -> Result<RunManifest> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let manifest: RunManifest =
        serde_json::from_str(&json).context("failed to deserialize run manifest")?;
    if manifest.schema_version > SCHEMA_VERSION {
        bail!(
            "unsupported schema version {} (max supported: {})",
            manifest.schema_version,
            SCHEMA_VERSION
        );
    }
    Ok(manifest)
}
