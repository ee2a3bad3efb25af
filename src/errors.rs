// src/errors.rs

//! Crate-wide error aliases and helpers.
//!
//! Only construction-time problems (bad graph, bad config) and IO surface as
//! errors. A node that fails is recorded in its task state instead.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RundagError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Cycle detected in DAG: {0}")]
    DagCycle(String),

    #[error("Duplicate node id: {0}")]
    DuplicateNode(String),

    #[error("Node '{node}' depends on unknown node '{dependency}'")]
    UnknownDependency { node: String, dependency: String },

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, RundagError>;
