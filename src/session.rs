//! Analysis session.
//!
//! A `Session` owns the staging path where the loader writes the canonical
//! CSV form of the active dataset and where the dispatcher and renderer read
//! it back. Callers that want isolated datasets create separate sessions
//! with distinct staging paths.

use std::path::{Path, PathBuf};

/// Default staging location, relative to the working directory.
pub const DEFAULT_STAGING_PATH: &str = "temp_dataframe.csv";

#[derive(Debug, Clone)]
pub struct Session {
    staging_path: PathBuf,
}

impl Default for Session {
    fn default() -> Self {
        Self::new(DEFAULT_STAGING_PATH)
    }
}

impl Session {
    pub fn new(staging_path: impl Into<PathBuf>) -> Self {
        Self {
            staging_path: staging_path.into(),
        }
    }

    pub fn staging_path(&self) -> &Path {
        &self.staging_path
    }

    /// Resolve the staging path for one request: an explicit `temp_path`
    /// parameter wins over the session default.
    pub fn resolve(&self, temp_path: Option<&str>) -> PathBuf {
        temp_path
            .map(PathBuf::from)
            .unwrap_or_else(|| self.staging_path.clone())
    }
}
