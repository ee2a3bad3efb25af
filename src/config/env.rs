// src/config/env.rs

//! Runtime settings taken from the process environment.
//!
//! The supervisor passes `RUN_ID`, `LOG_DIR` and `CONNECTOR_NAME` down to the
//! pipeline it spawns, so both sides read the same variables.

use std::path::PathBuf;

use crate::types::ExecutionMode;

pub const RUN_ID_VAR: &str = "RUN_ID";
pub const LOG_DIR_VAR: &str = "LOG_DIR";
pub const CI_VAR: &str = "CI";
pub const CONNECTOR_NAME_VAR: &str = "CONNECTOR_NAME";
pub const DATA_DIR_VAR: &str = "DATA_DIR";
pub const STORAGE_DIR_VAR: &str = "RUNDAG_STORAGE_DIR";
pub const LOG_LEVEL_VAR: &str = "RUNDAG_LOG";

const DEFAULT_RUN_ID: &str = "local-run";
const DEFAULT_CONNECTOR: &str = "unknown";
const DEFAULT_DATA_DIR: &str = "data";

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EnvConfig {
    pub run_id: Option<String>,
    /// Enables checkpointing when set.
    pub log_dir: Option<PathBuf>,
    pub mode: ExecutionMode,
    pub connector_name: Option<String>,
    /// Root of the raw asset store.
    pub data_dir: PathBuf,
    pub storage_dir: Option<PathBuf>,
    pub log_level: Option<String>,
}

impl EnvConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Self {
            run_id: get(RUN_ID_VAR),
            log_dir: get(LOG_DIR_VAR).map(PathBuf::from),
            mode: ExecutionMode::from_ci_flag(get(CI_VAR).as_deref()),
            connector_name: get(CONNECTOR_NAME_VAR),
            data_dir: get(DATA_DIR_VAR)
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR)),
            storage_dir: get(STORAGE_DIR_VAR).map(PathBuf::from),
            log_level: get(LOG_LEVEL_VAR),
        }
    }

    pub fn run_id_or_default(&self) -> &str {
        self.run_id.as_deref().unwrap_or(DEFAULT_RUN_ID)
    }

    pub fn connector_name_or_default(&self) -> &str {
        self.connector_name.as_deref().unwrap_or(DEFAULT_CONNECTOR)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn from_pairs(pairs: &[(&str, &str)]) -> EnvConfig {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        EnvConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn empty_environment_uses_defaults() {
        let env = from_pairs(&[]);
        assert_eq!(env.run_id_or_default(), "local-run");
        assert_eq!(env.connector_name_or_default(), "unknown");
        assert_eq!(env.data_dir, PathBuf::from("data"));
        assert_eq!(env.mode, ExecutionMode::Local);
        assert!(env.log_dir.is_none());
    }

    #[test]
    fn variables_are_read() {
        let env = from_pairs(&[
            ("RUN_ID", "20250101-120000"),
            ("LOG_DIR", "/tmp/logs/x"),
            ("CI", "true"),
            ("CONNECTOR_NAME", "wdi"),
            ("RUNDAG_STORAGE_DIR", "/mnt/bucket"),
            ("LOG_DIR_UNUSED", "ignored"),
        ]);
        assert_eq!(env.run_id_or_default(), "20250101-120000");
        assert_eq!(env.log_dir, Some(PathBuf::from("/tmp/logs/x")));
        assert_eq!(env.mode, ExecutionMode::Cloud);
        assert_eq!(env.connector_name_or_default(), "wdi");
        assert_eq!(env.storage_dir, Some(PathBuf::from("/mnt/bucket")));
    }

    #[test]
    fn blank_values_count_as_unset() {
        let env = from_pairs(&[("LOG_DIR", "  "), ("RUN_ID", "")]);
        assert!(env.log_dir.is_none());
        assert_eq!(env.run_id_or_default(), "local-run");
    }
}
