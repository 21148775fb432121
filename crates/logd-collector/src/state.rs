//! Persisted collector state
//!
//! The set of registered logs survives restarts in a small JSON document:
//!
//! ```json
//! {"logs":{"web":{"source":"/var/run/web.fifo"}}}
//! ```
//!
//! Saves write a sibling temp file and rename it over the old one, so a
//! crash mid-save leaves either the previous or the new document.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::CollectorResult;

/// One registered log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogState {
    /// Path the stream worker reads from
    pub source: String,
}

/// Every registered log, keyed by name
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectorState {
    #[serde(default)]
    pub logs: BTreeMap<String, LogState>,
}

/// Location of the state document on disk
#[derive(Debug, Clone)]
pub struct StateFile {
    path: PathBuf,
}

impl StateFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the state; a missing file is an empty state
    pub fn load(&self) -> CollectorResult<CollectorState> {
        match fs::read(&self.path) {
            Ok(bytes) => {
                let state: CollectorState = serde_json::from_slice(&bytes)?;
                debug!(path = %self.path.display(), logs = state.logs.len(), "Loaded state");
                Ok(state)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(CollectorState::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// Replace the document with `state`
    pub fn save(&self, state: &CollectorState) -> CollectorResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let temp_path = self.path.with_extension("json.tmp");
        let bytes = serde_json::to_vec_pretty(state)?;
        {
            let mut file = File::create(&temp_path)?;
            file.write_all(&bytes)?;
            file.sync_all()?;
        }
        fs::rename(&temp_path, &self.path)?;
        debug!(path = %self.path.display(), logs = state.logs.len(), "Saved state");
        Ok(())
    }
}
