//! Pipeline configuration.
//!
//! Loaded once from a TOML file and handed to each component constructor.
//! Environment overrides are applied at load time only; components never read
//! process-wide state.

use scripmaster_core::data::{Compression, FeedLocation, FeedSource};
use scripmaster_core::VendorProfile;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const ENV_MONGO_URI: &str = "SCRIPMASTER_MONGO_URI";
pub const ENV_SQLITE_PATH: &str = "SCRIPMASTER_SQLITE_PATH";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(String),

    #[error("invalid config: {0}")]
    Invalid(String),

    #[error("unknown vendor profile '{name}' (known: {known})")]
    UnknownProfile { name: String, known: String },
}

/// Full configuration of one reconciliation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Parent of the per-run scratch directory. System temp dir when unset.
    #[serde(default)]
    pub work_dir: Option<PathBuf>,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
    /// Feeds the document store and the left side of the join.
    pub source_a: SourceConfig,
    /// Feeds the relational store and the right side of the join.
    pub source_b: SourceConfig,
    pub document_store: DocumentStoreConfig,
    pub relational_store: RelationalStoreConfig,
}

/// One vendor feed: where to get it and how to read it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceConfig {
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    #[serde(default)]
    pub compression: Compression,
    pub profile: ProfileRef,
}

/// A built-in profile name or a full inline profile table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProfileRef {
    Preset(String),
    Inline(VendorProfile),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentStoreConfig {
    pub uri: String,
    pub database: String,
    pub collection: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Upper bound on picking a server for any operation.
    #[serde(default = "default_store_timeout_ms")]
    pub server_selection_timeout_ms: u64,
    /// Upper bound on opening a connection to a selected server.
    #[serde(default = "default_store_timeout_ms")]
    pub connect_timeout_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationalStoreConfig {
    pub path: PathBuf,
    #[serde(default = "default_table")]
    pub table: String,
    #[serde(default = "default_store_timeout_ms")]
    pub busy_timeout_ms: u64,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}

fn default_http_timeout_secs() -> u64 {
    30
}

fn default_batch_size() -> usize {
    1000
}

fn default_store_timeout_ms() -> u64 {
    10_000
}

fn default_table() -> String {
    "dhan_nse".to_string()
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            work_dir: None,
            output_dir: default_output_dir(),
            http_timeout_secs: default_http_timeout_secs(),
            source_a: SourceConfig {
                label: "upstox".into(),
                url: Some(
                    "https://assets.upstox.com/market-quote/instruments/exchange/NSE.csv.gz".into(),
                ),
                path: None,
                compression: Compression::Gzip,
                profile: ProfileRef::Preset(VendorProfile::UPSTOX_NSE.into()),
            },
            source_b: SourceConfig {
                label: "dhan".into(),
                url: Some("https://images.dhan.co/api-data/api-scrip-master.csv".into()),
                path: None,
                compression: Compression::Auto,
                profile: ProfileRef::Preset(VendorProfile::DHAN_NSE.into()),
            },
            document_store: DocumentStoreConfig {
                uri: "mongodb://localhost:27017".into(),
                database: "market_data".into(),
                collection: "upstox_nse".into(),
                batch_size: default_batch_size(),
                server_selection_timeout_ms: default_store_timeout_ms(),
                connect_timeout_ms: default_store_timeout_ms(),
            },
            relational_store: RelationalStoreConfig {
                path: PathBuf::from("nse_data.db"),
                table: default_table(),
                busy_timeout_ms: default_store_timeout_ms(),
            },
        }
    }
}

impl PipelineConfig {
    /// Load, apply environment overrides and validate.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let config = Self::from_file(path)?.with_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Replace store locations from an environment lookup.
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(uri) = lookup(ENV_MONGO_URI).filter(|v| !v.is_empty()) {
            self.document_store.uri = uri;
        }
        if let Some(path) = lookup(ENV_SQLITE_PATH).filter(|v| !v.is_empty()) {
            self.relational_store.path = PathBuf::from(path);
        }
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.source_a.validate()?;
        self.source_b.validate()?;
        if self.source_a.label == self.source_b.label {
            return Err(ConfigError::Invalid(format!(
                "source labels must differ (both are '{}')",
                self.source_a.label
            )));
        }
        if self.http_timeout_secs == 0 {
            return Err(ConfigError::Invalid("http_timeout_secs must be at least 1".into()));
        }
        if self.document_store.batch_size == 0 {
            return Err(ConfigError::Invalid("document_store.batch_size must be at least 1".into()));
        }
        if !is_identifier(&self.relational_store.table) {
            return Err(ConfigError::Invalid(format!(
                "relational_store.table '{}' is not a plain SQL identifier",
                self.relational_store.table
            )));
        }
        Ok(())
    }
}

impl SourceConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        let label_ok = !self.label.is_empty()
            && self
                .label
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !label_ok {
            return Err(ConfigError::Invalid(format!(
                "source label '{}' must be non-empty and use only [A-Za-z0-9_-]",
                self.label
            )));
        }
        self.location()?;
        self.resolve_profile()?;
        Ok(())
    }

    /// Exactly one of `url` or `path` must be set.
    pub fn location(&self) -> Result<FeedLocation, ConfigError> {
        match (&self.url, &self.path) {
            (Some(url), None) => Ok(FeedLocation::Http(url.clone())),
            (None, Some(path)) => Ok(FeedLocation::Local(path.clone())),
            (Some(_), Some(_)) => Err(ConfigError::Invalid(format!(
                "source '{}' sets both url and path",
                self.label
            ))),
            (None, None) => Err(ConfigError::Invalid(format!(
                "source '{}' needs a url or a path",
                self.label
            ))),
        }
    }

    pub fn feed_source(&self) -> Result<FeedSource, ConfigError> {
        Ok(FeedSource {
            label: self.label.clone(),
            location: self.location()?,
            compression: self.compression,
        })
    }

    pub fn resolve_profile(&self) -> Result<VendorProfile, ConfigError> {
        match &self.profile {
            ProfileRef::Inline(profile) => Ok(profile.clone()),
            ProfileRef::Preset(name) => {
                VendorProfile::preset(name).ok_or_else(|| ConfigError::UnknownProfile {
                    name: name.clone(),
                    known: VendorProfile::preset_names().join(", "),
                })
            }
        }
    }
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;
    use scripmaster_core::InstrumentColumn;

    #[test]
    fn default_config_is_valid_and_roundtrips() {
        let config = PipelineConfig::default();
        config.validate().unwrap();

        let toml_str = config.to_toml().unwrap();
        let parsed = PipelineConfig::from_toml(&toml_str).unwrap();
        assert_eq!(config, parsed);
    }

    #[test]
    fn minimal_toml_fills_defaults() {
        let config = PipelineConfig::from_toml(
            r#"
[source_a]
label = "upstox"
path = "feeds/NSE.csv.gz"
profile = "upstox_nse"

[source_b]
label = "dhan"
path = "feeds/api-scrip-master.csv"
profile = "dhan_nse"

[document_store]
uri = "mongodb://db:27017"
database = "market_data"
collection = "upstox_nse"

[relational_store]
path = "nse_data.db"
"#,
        )
        .unwrap();

        assert_eq!(config.document_store.batch_size, 1000);
        assert_eq!(config.relational_store.table, "dhan_nse");
        assert_eq!(config.http_timeout_secs, 30);
        assert_eq!(config.source_a.compression, Compression::Auto);
        config.validate().unwrap();
    }

    #[test]
    fn inline_profile_is_accepted() {
        let mut config = PipelineConfig::default();
        let mut profile = VendorProfile::dhan_nse();
        profile.name = "dhan_bse".into();
        profile.target_exchange = "BSE".into();
        profile.report_columns = vec![InstrumentColumn::TradingSymbol];
        config.source_b.profile = ProfileRef::Inline(profile.clone());

        let parsed = PipelineConfig::from_toml(&config.to_toml().unwrap()).unwrap();
        assert_eq!(parsed.source_b.resolve_profile().unwrap(), profile);
    }

    #[test]
    fn unknown_preset_is_rejected() {
        let mut config = PipelineConfig::default();
        config.source_a.profile = ProfileRef::Preset("zerodha_nse".into());
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::UnknownProfile { .. }));
    }

    #[test]
    fn url_and_path_are_mutually_exclusive() {
        let mut config = PipelineConfig::default();
        config.source_a.path = Some(PathBuf::from("NSE.csv.gz"));
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        config.source_a.url = None;
        config.source_a.path = None;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn table_name_must_be_identifier() {
        let mut config = PipelineConfig::default();
        config.relational_store.table = "dhan_nse; DROP TABLE x".into();
        assert!(config.validate().is_err());
        config.relational_store.table = "_dhan2".into();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        let mut config = PipelineConfig::default();
        config.document_store.batch_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn env_overrides_replace_store_locations() {
        let config = PipelineConfig::default().with_overrides(|key| match key {
            ENV_MONGO_URI => Some("mongodb://prod:27017".into()),
            ENV_SQLITE_PATH => Some("/var/lib/nse.db".into()),
            _ => None,
        });
        assert_eq!(config.document_store.uri, "mongodb://prod:27017");
        assert_eq!(config.relational_store.path, PathBuf::from("/var/lib/nse.db"));

        let untouched = PipelineConfig::default().with_overrides(|_| Some(String::new()));
        assert_eq!(untouched, PipelineConfig::default());
    }
}
