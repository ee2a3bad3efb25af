// src/lib.rs

pub mod assets;
pub mod cli;
pub mod config;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod fs;
pub mod logging;
pub mod pipeline;
pub mod storage;
pub mod supervisor;
pub mod track;
pub mod types;

use anyhow::Result;
use tracing::info;

use crate::cli::{PipelineArgs, SupervisorArgs};
use crate::config::loader::{default_config_path, load_or_default};
use crate::config::EnvConfig;
use crate::dag::ExecutionSnapshot;
use crate::engine::Engine;
use crate::pipeline::Pipeline;
use crate::supervisor::{RunOutcome, Supervisor, SupervisorOptions};

/// Run a pipeline in this process.
///
/// Configuration comes from the environment (`LOG_DIR` enables
/// checkpointing) and `args` (targets, isolation). Node failures are in the
/// returned snapshot, not in the error.
pub async fn run_pipeline(pipeline: &Pipeline, args: &PipelineArgs) -> Result<ExecutionSnapshot> {
    let env = EnvConfig::from_env();
    let targets = args.targets();

    info!(
        run_id = %env.run_id_or_default(),
        connector = %env.connector_name_or_default(),
        isolate = args.isolate,
        targets = ?targets,
        "starting pipeline run"
    );

    let mut engine = Engine::from_env(pipeline, &env);
    let snapshot = engine.run(args.isolate, targets.as_deref()).await?;
    Ok(snapshot)
}

/// High-level entry point used by the `rundag` supervisor binary.
///
/// Loads `--config` (or `Rundag.toml`, defaults if missing), reads the
/// environment, and runs the pipeline command to completion.
pub async fn supervise(args: SupervisorArgs) -> Result<RunOutcome> {
    let config_path = args.config.clone().unwrap_or_else(default_config_path);
    let config = load_or_default(&config_path)?;
    let env = EnvConfig::from_env();

    let opts = SupervisorOptions::resolve(&args, &config, &env);
    Ok(Supervisor::new(opts).run().await)
}
