// src/config/model.rs

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

/// Supervisor configuration as read from a TOML file.
///
/// ```toml
/// [supervisor]
/// sample_interval_ms = 500
/// grace_period_secs = 10
/// profiler_join_timeout_ms = 2000
/// local_log_root = "logs"
/// cloud_log_root = "/tmp/logs"
///
/// [storage]
/// dir = "/mnt/bucket"
/// ```
///
/// All sections are optional and have reasonable defaults. This type is
/// unvalidated; convert it into a [`ConfigFile`] with `TryFrom`.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct RawConfigFile {
    #[serde(default)]
    pub supervisor: SupervisorSection,

    #[serde(default)]
    pub storage: StorageSection,
}

/// `[supervisor]` section.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SupervisorSection {
    /// Memory sampling interval in milliseconds.
    #[serde(default = "default_sample_interval_ms")]
    pub sample_interval_ms: u64,

    /// Time the child gets to exit after SIGTERM before it is killed.
    #[serde(default = "default_grace_period_secs")]
    pub grace_period_secs: u64,

    /// Upper bound on waiting for the profiler thread at shutdown.
    #[serde(default = "default_profiler_join_timeout_ms")]
    pub profiler_join_timeout_ms: u64,

    #[serde(default = "default_local_log_root")]
    pub local_log_root: PathBuf,

    #[serde(default = "default_cloud_log_root")]
    pub cloud_log_root: PathBuf,
}

fn default_sample_interval_ms() -> u64 {
    500
}

fn default_grace_period_secs() -> u64 {
    10
}

fn default_profiler_join_timeout_ms() -> u64 {
    2000
}

fn default_local_log_root() -> PathBuf {
    PathBuf::from("logs")
}

fn default_cloud_log_root() -> PathBuf {
    PathBuf::from("/tmp/logs")
}

impl Default for SupervisorSection {
    fn default() -> Self {
        Self {
            sample_interval_ms: default_sample_interval_ms(),
            grace_period_secs: default_grace_period_secs(),
            profiler_join_timeout_ms: default_profiler_join_timeout_ms(),
            local_log_root: default_local_log_root(),
            cloud_log_root: default_cloud_log_root(),
        }
    }
}

impl SupervisorSection {
    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms)
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(self.grace_period_secs)
    }

    pub fn profiler_join_timeout(&self) -> Duration {
        Duration::from_millis(self.profiler_join_timeout_ms)
    }
}

/// `[storage]` section. Without a `dir`, log upload is disabled unless
/// `RUNDAG_STORAGE_DIR` is set.
#[derive(Debug, Clone, PartialEq, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct StorageSection {
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

/// Validated configuration.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ConfigFile {
    pub supervisor: SupervisorSection,
    pub storage: StorageSection,
}

impl ConfigFile {
    /// Build without validation. Callers outside `config::validate` should
    /// go through `TryFrom<RawConfigFile>`.
    pub(crate) fn new_unchecked(supervisor: SupervisorSection, storage: StorageSection) -> Self {
        Self {
            supervisor,
            storage,
        }
    }
}
