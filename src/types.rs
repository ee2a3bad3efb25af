// src/types.rs

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

/// Where the supervisor is running.
///
/// - `Local`: developer machine; logs go under `logs/`.
/// - `Cloud`: CI or a managed runner (`CI=true`); logs go under `/tmp/logs`
///   and are uploaded to durable storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    #[default]
    Local,
    Cloud,
}

impl ExecutionMode {
    /// Mode implied by the value of the `CI` environment variable.
    pub fn from_ci_flag(ci: Option<&str>) -> Self {
        match ci {
            Some(v) if v.trim().eq_ignore_ascii_case("true") => ExecutionMode::Cloud,
            _ => ExecutionMode::Local,
        }
    }

    pub fn is_cloud(self) -> bool {
        self == ExecutionMode::Cloud
    }
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionMode::Local => f.write_str("local"),
            ExecutionMode::Cloud => f.write_str("cloud"),
        }
    }
}

impl FromStr for ExecutionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "local" => Ok(ExecutionMode::Local),
            "cloud" => Ok(ExecutionMode::Cloud),
            other => Err(format!(
                "invalid execution mode: {other} (expected \"local\" or \"cloud\")"
            )),
        }
    }
}
