// src/engine/checkpoint.rs

//! Best-effort persistence of the execution snapshot.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::config::EnvConfig;
use crate::dag::ExecutionSnapshot;
use crate::fs::FileSystem;

pub const CHECKPOINT_FILE: &str = "dag.json";

/// Writes `dag.json` into the log directory after every node.
///
/// Without a log directory every write is a no-op. Each write replaces the
/// file atomically, so a crash mid-write leaves the previous checkpoint.
/// Failures are logged and never interrupt the run.
#[derive(Debug, Clone)]
pub struct Checkpointer {
    path: Option<PathBuf>,
    fs: Arc<dyn FileSystem>,
}

impl Checkpointer {
    pub fn disabled(fs: Arc<dyn FileSystem>) -> Self {
        Self { path: None, fs }
    }

    pub fn to_dir(log_dir: impl AsRef<Path>, fs: Arc<dyn FileSystem>) -> Self {
        Self {
            path: Some(log_dir.as_ref().join(CHECKPOINT_FILE)),
            fs,
        }
    }

    /// Enabled iff `LOG_DIR` is set.
    pub fn from_env(env: &EnvConfig, fs: Arc<dyn FileSystem>) -> Self {
        match &env.log_dir {
            Some(dir) => Self::to_dir(dir, fs),
            None => Self::disabled(fs),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Persist `snapshot`. Returns whether a file was written.
    pub fn write(&self, snapshot: &ExecutionSnapshot) -> bool {
        let Some(path) = &self.path else {
            return false;
        };

        let bytes = match serde_json::to_vec_pretty(snapshot) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(error = %e, "failed to serialize checkpoint");
                return false;
            }
        };

        match self.fs.write_atomic(path, &bytes) {
            Ok(()) => {
                debug!(path = %path.display(), status = ?snapshot.status, "checkpoint written");
                true
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to write checkpoint");
                false
            }
        }
    }
}
