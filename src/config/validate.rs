// src/config/validate.rs

use crate::config::model::{ConfigFile, RawConfigFile, SupervisorSection};
use crate::errors::{Result, RundagError};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = RundagError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_supervisor(&raw.supervisor)?;
        Ok(ConfigFile::new_unchecked(raw.supervisor, raw.storage))
    }
}

fn validate_supervisor(cfg: &SupervisorSection) -> Result<()> {
    if cfg.sample_interval_ms == 0 {
        return Err(RundagError::ConfigError(
            "[supervisor].sample_interval_ms must be >= 1 (got 0)".to_string(),
        ));
    }

    if cfg.profiler_join_timeout_ms == 0 {
        return Err(RundagError::ConfigError(
            "[supervisor].profiler_join_timeout_ms must be >= 1 (got 0)".to_string(),
        ));
    }

    for (key, root) in [
        ("local_log_root", &cfg.local_log_root),
        ("cloud_log_root", &cfg.cloud_log_root),
    ] {
        if root.as_os_str().is_empty() {
            return Err(RundagError::ConfigError(format!(
                "[supervisor].{key} must not be empty"
            )));
        }
    }

    Ok(())
}
