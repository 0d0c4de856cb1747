//! Feed fetcher: brings a vendor scrip master into the scratch directory.
//!
//! A feed is either an HTTP(S) URL fetched with a single bounded GET, or a
//! local file. Gzip payloads are decompressed next to the download. There is
//! no retry: a failed fetch aborts the run.

use super::decompress::{gunzip_file, is_gzip};
use super::error::DataError;
use super::scratch::ScratchDir;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// How a feed's payload is compressed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Compression {
    None,
    Gzip,
    /// Sniff the gzip magic bytes.
    #[default]
    Auto,
}

/// Where a feed comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedLocation {
    Http(String),
    Local(PathBuf),
}

impl std::fmt::Display for FeedLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Http(url) => f.write_str(url),
            Self::Local(path) => write!(f, "{}", path.display()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FeedSource {
    /// Short name used for scratch files, logs and report names.
    pub label: String,
    pub location: FeedLocation,
    pub compression: Compression,
}

/// A feed ready for extraction.
#[derive(Debug, Clone)]
pub struct FetchedFeed {
    pub label: String,
    pub origin: String,
    /// Uncompressed CSV to hand to the extractor.
    pub csv_path: PathBuf,
    /// Size of the payload as fetched (before decompression).
    pub raw_bytes: u64,
    /// BLAKE3 of the payload as fetched.
    pub raw_hash: String,
    pub decompressed: bool,
}

pub struct FeedFetcher {
    client: reqwest::blocking::Client,
    timeout: Duration,
}

impl FeedFetcher {
    pub fn new(timeout: Duration) -> Result<Self, DataError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("scripmaster/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| DataError::Network {
                url: String::new(),
                reason: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self { client, timeout })
    }

    /// Fetch one feed. Remote payloads and decompressed output land in
    /// `scratch`; an uncompressed local file is read in place.
    pub fn fetch(&self, source: &FeedSource, scratch: &ScratchDir) -> Result<FetchedFeed, DataError> {
        let raw_path = match &source.location {
            FeedLocation::Http(url) => {
                let dest = scratch.file(&format!("{}.download", source.label));
                self.download(url, &dest)?;
                dest
            }
            FeedLocation::Local(path) => {
                if !path.exists() {
                    return Err(DataError::MissingInput { path: path.clone() });
                }
                path.clone()
            }
        };

        let (raw_bytes, raw_hash) = hash_file(&raw_path)?;

        let gzipped = match source.compression {
            Compression::Gzip => true,
            Compression::None => false,
            Compression::Auto => is_gzip(&raw_path)?,
        };

        let csv_path = if gzipped {
            let dest = scratch.file(&format!("{}.csv", source.label));
            gunzip_file(&raw_path, &dest)?;
            dest
        } else {
            raw_path
        };

        tracing::info!(
            feed = %source.label,
            origin = %source.location,
            bytes = raw_bytes,
            hash = %raw_hash,
            gzipped,
            "feed ready"
        );

        Ok(FetchedFeed {
            label: source.label.clone(),
            origin: source.location.to_string(),
            csv_path,
            raw_bytes,
            raw_hash,
            decompressed: gzipped,
        })
    }

    fn download(&self, url: &str, dest: &Path) -> Result<(), DataError> {
        tracing::info!(url, "downloading feed");

        let mut resp = self.client.get(url).send().map_err(|e| self.request_error(url, e))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(DataError::Network {
                url: url.to_string(),
                reason: format!("HTTP {status}"),
            });
        }

        let file = File::create(dest).map_err(|e| DataError::io(dest, e))?;
        let mut writer = BufWriter::new(file);
        let bytes = resp
            .copy_to(&mut writer)
            .map_err(|e| self.request_error(url, e))?;
        writer.flush().map_err(|e| DataError::io(dest, e))?;

        tracing::info!(url, bytes, dest = %dest.display(), "downloaded feed");
        Ok(())
    }

    fn request_error(&self, url: &str, e: reqwest::Error) -> DataError {
        if e.is_timeout() {
            DataError::Timeout {
                url: url.to_string(),
                timeout_secs: self.timeout.as_secs(),
            }
        } else {
            DataError::Network {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    }
}

/// Size and BLAKE3 hash of a file.
fn hash_file(path: &Path) -> Result<(u64, String), DataError> {
    let mut file = File::open(path).map_err(|e| DataError::io(path, e))?;
    let mut hasher = blake3::Hasher::new();
    let bytes = std::io::copy(&mut file, &mut hasher).map_err(|e| DataError::io(path, e))?;
    Ok((bytes, hasher.finalize().to_hex().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;

    const CSV: &str = "instrument_key,tradingsymbol\nNSE_EQ|INE009A01021,INFY\n";

    fn fetcher() -> FeedFetcher {
        FeedFetcher::new(Duration::from_secs(2)).unwrap()
    }

    #[test]
    fn local_plain_feed_is_read_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("upstox.csv");
        std::fs::write(&path, CSV).unwrap();
        let scratch = ScratchDir::create(None).unwrap();

        let source = FeedSource {
            label: "upstox".into(),
            location: FeedLocation::Local(path.clone()),
            compression: Compression::Auto,
        };
        let fetched = fetcher().fetch(&source, &scratch).unwrap();

        assert_eq!(fetched.csv_path, path);
        assert!(!fetched.decompressed);
        assert_eq!(fetched.raw_bytes, CSV.len() as u64);
        assert_eq!(fetched.raw_hash, blake3::hash(CSV.as_bytes()).to_hex().to_string());
    }

    #[test]
    fn local_gzip_feed_is_decompressed_into_scratch() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("NSE.csv.gz");
        let mut enc = GzEncoder::new(Vec::new(), flate2::Compression::default());
        enc.write_all(CSV.as_bytes()).unwrap();
        std::fs::write(&path, enc.finish().unwrap()).unwrap();
        let scratch = ScratchDir::create(None).unwrap();

        let source = FeedSource {
            label: "upstox".into(),
            location: FeedLocation::Local(path),
            compression: Compression::Auto,
        };
        let fetched = fetcher().fetch(&source, &scratch).unwrap();

        assert!(fetched.decompressed);
        assert!(fetched.csv_path.starts_with(scratch.path()));
        assert_eq!(std::fs::read_to_string(&fetched.csv_path).unwrap(), CSV);
    }

    #[test]
    fn missing_local_feed_is_missing_input() {
        let scratch = ScratchDir::create(None).unwrap();
        let source = FeedSource {
            label: "dhan".into(),
            location: FeedLocation::Local(PathBuf::from("/nonexistent/api-scrip-master.csv")),
            compression: Compression::None,
        };
        let err = fetcher().fetch(&source, &scratch).unwrap_err();
        assert!(matches!(err, DataError::MissingInput { .. }));
    }

    #[test]
    fn unreachable_host_is_network_error() {
        let scratch = ScratchDir::create(None).unwrap();
        let source = FeedSource {
            label: "dhan".into(),
            location: FeedLocation::Http("http://127.0.0.1:1/api-scrip-master.csv".into()),
            compression: Compression::None,
        };
        let err = fetcher().fetch(&source, &scratch).unwrap_err();
        assert!(
            matches!(err, DataError::Network { .. } | DataError::Timeout { .. }),
            "got {err:?}"
        );
    }
}
