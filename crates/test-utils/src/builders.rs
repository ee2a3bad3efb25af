#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use rundag::config::{ConfigFile, RawConfigFile};
use rundag::dag::DagGraph;
use rundag::pipeline::{Pipeline, PipelineBuilder};

/// Build a graph from `(id, deps)` pairs, panicking on invalid input.
pub fn graph(spec: &[(&str, &[&str])]) -> DagGraph {
    DagGraph::new(spec.iter().map(|(id, deps)| {
        (
            id.to_string(),
            deps.iter().map(|d| d.to_string()).collect(),
        )
    }))
    .expect("invalid test graph")
}

/// Builder for pipelines whose nodes only record that they ran.
pub struct RecordingPipelineBuilder {
    inner: PipelineBuilder,
    executed: Arc<Mutex<Vec<String>>>,
}

impl RecordingPipelineBuilder {
    pub fn new() -> Self {
        Self {
            inner: Pipeline::builder(),
            executed: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// A node that succeeds.
    pub fn ok(self, id: &str, deps: &[&str]) -> Self {
        self.node(id, deps, None)
    }

    /// A node that returns an error with `message`.
    pub fn failing(self, id: &str, deps: &[&str], message: &str) -> Self {
        self.node(id, deps, Some(message.to_string()))
    }

    fn node(mut self, id: &str, deps: &[&str], failure: Option<String>) -> Self {
        let executed = Arc::clone(&self.executed);
        let name = id.to_string();
        self.inner = self.inner.node(id, deps, move || {
            executed.lock().unwrap().push(name.clone());
            match &failure {
                Some(message) => Err(anyhow::anyhow!("{message}")),
                None => Ok(()),
            }
        });
        self
    }

    /// The pipeline plus the shared log of executed node IDs.
    pub fn build(self) -> (Pipeline, Arc<Mutex<Vec<String>>>) {
        let pipeline = self.inner.build().expect("invalid test pipeline");
        (pipeline, self.executed)
    }
}

impl Default for RecordingPipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for validated supervisor `ConfigFile`s.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile::default(),
        }
    }

    pub fn sample_interval_ms(mut self, ms: u64) -> Self {
        self.config.supervisor.sample_interval_ms = ms;
        self
    }

    pub fn grace_period_secs(mut self, secs: u64) -> Self {
        self.config.supervisor.grace_period_secs = secs;
        self
    }

    pub fn log_roots(mut self, local: impl Into<PathBuf>, cloud: impl Into<PathBuf>) -> Self {
        self.config.supervisor.local_log_root = local.into();
        self.config.supervisor.cloud_log_root = cloud.into();
        self
    }

    pub fn storage_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.storage.dir = Some(dir.into());
        self
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}
