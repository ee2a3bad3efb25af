// src/supervisor/outcome.rs

//! Exit-code classification and the `error.json` summary.

use std::path::{Path, PathBuf};
use std::process::ExitStatus;

use chrono::{Local, SecondsFormat};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::errors::Result;
use crate::fs::FileSystem;

pub const ERROR_SUMMARY_FILE: &str = "error.json";

/// Exit code of a child killed by SIGKILL, which in practice is the OOM killer.
pub const OOM_EXIT_CODE: i32 = 137;
/// Exit code of a child stopped by SIGTERM.
pub const SIGTERM_EXIT_CODE: i32 = 143;
/// Exit code reported when the pipeline command could not be started.
pub const SPAWN_FAILURE_EXIT_CODE: i32 = 127;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    Success,
    OomKilled,
    Terminated,
    Error,
}

impl Classification {
    pub fn of(exit_code: i32) -> Self {
        match exit_code {
            0 => Classification::Success,
            OOM_EXIT_CODE => Classification::OomKilled,
            SIGTERM_EXIT_CODE => Classification::Terminated,
            _ => Classification::Error,
        }
    }

    /// `error_type` written to `error.json`; `None` for success.
    pub fn error_type(self) -> Option<&'static str> {
        match self {
            Classification::Success => None,
            Classification::OomKilled => Some("OOM"),
            Classification::Terminated => Some("SIGTERM"),
            Classification::Error => Some("Error"),
        }
    }
}

/// Final result of a supervised run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunOutcome {
    pub exit_code: i32,
    pub classification: Classification,
    pub message: String,
    pub run_id: String,
}

impl RunOutcome {
    pub fn classify(exit_code: i32, run_id: impl Into<String>) -> Self {
        let classification = Classification::of(exit_code);
        let message = match classification {
            Classification::Success => "Process completed successfully".to_string(),
            Classification::OomKilled => "Process killed by OOM killer (SIGKILL)".to_string(),
            Classification::Terminated => "Process terminated by signal".to_string(),
            Classification::Error => format!("Process exited with code {exit_code}"),
        };

        Self {
            exit_code,
            classification,
            message,
            run_id: run_id.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.classification == Classification::Success
    }

    /// Summary to persist, or `None` for a successful run.
    pub fn error_summary(&self) -> Option<ErrorSummary> {
        let error_type = self.classification.error_type()?;
        Some(ErrorSummary {
            timestamp: Local::now().to_rfc3339_opts(SecondsFormat::Micros, false),
            exit_code: self.exit_code,
            error_type: error_type.to_string(),
            message: self.message.clone(),
            run_id: self.run_id.clone(),
        })
    }
}

/// Contents of `error.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorSummary {
    pub timestamp: String,
    pub exit_code: i32,
    pub error_type: String,
    pub message: String,
    pub run_id: String,
}

/// Write `error.json` into `log_dir` for a failed run.
///
/// Returns the path written, or `None` when the run succeeded.
pub fn write_error_summary(
    fs: &dyn FileSystem,
    log_dir: &Path,
    outcome: &RunOutcome,
) -> Result<Option<PathBuf>> {
    let Some(summary) = outcome.error_summary() else {
        return Ok(None);
    };

    let path = log_dir.join(ERROR_SUMMARY_FILE);
    let bytes = serde_json::to_vec_pretty(&summary)?;
    fs.write(&path, &bytes)?;
    info!(path = %path.display(), error_type = %summary.error_type, "wrote error summary");
    Ok(Some(path))
}

/// Exit code of a finished child. A child killed by signal `N` maps to
/// `128 + N`, the convention shells use.
pub fn exit_code_of(status: ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;

    match (status.code(), status.signal()) {
        (Some(code), _) => code,
        (None, Some(signal)) => 128 + signal,
        (None, None) => 1,
    }
}
