//! Scoped scratch directory for downloaded and decompressed feeds.
//!
//! Downloaded artifacts must never survive a run: a stale file picked up by
//! the next run would silently reconcile yesterday's data. The directory is
//! removed by `close()` at the end of a run and by `Drop` on every other exit
//! path.

use super::error::DataError;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub struct ScratchDir {
    dir: TempDir,
}

impl ScratchDir {
    /// Create a fresh scratch directory under `parent`, or under the system
    /// temp dir when `parent` is `None`.
    pub fn create(parent: Option<&Path>) -> Result<Self, DataError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("scripmaster-");
        let dir = match parent {
            Some(parent) => {
                std::fs::create_dir_all(parent).map_err(|e| DataError::io(parent, e))?;
                builder.tempdir_in(parent).map_err(|e| DataError::io(parent, e))?
            }
            None => builder
                .tempdir()
                .map_err(|e| DataError::io(std::env::temp_dir(), e))?,
        };
        tracing::debug!(path = %dir.path().display(), "created scratch directory");
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Path of a file inside the scratch directory.
    pub fn file(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Remove the directory now and report the outcome.
    pub fn close(self) -> Result<(), DataError> {
        let path = self.dir.path().to_path_buf();
        self.dir.close().map_err(|e| DataError::io(&path, e))?;
        tracing::info!(path = %path.display(), "cleaned up scratch directory");
        Ok(())
    }
}
