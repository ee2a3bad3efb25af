// src/engine/runtime.rs

use std::fmt;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::EnvConfig;
use crate::dag::{ExecutionSnapshot, Scheduler};
use crate::errors::Result;
use crate::exec::{InlineRunner, IsolatedRunner, NodeReport, NodeRunner};
use crate::fs::{FileSystem, RealFileSystem};
use crate::pipeline::Pipeline;

use super::checkpoint::Checkpointer;

/// Walks a pipeline's graph in order and executes each node.
///
/// The scheduler decides what may run and records results; this is the
/// async shell that hands jobs to a [`NodeRunner`] and checkpoints after
/// every node. Nodes run strictly one at a time.
pub struct Engine<'p> {
    pipeline: &'p Pipeline,
    scheduler: Scheduler,
    checkpointer: Checkpointer,
    isolated: Option<IsolatedRunner>,
}

impl fmt::Debug for Engine<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("scheduler", &self.scheduler)
            .field("checkpointer", &self.checkpointer)
            .finish_non_exhaustive()
    }
}

impl<'p> Engine<'p> {
    pub fn new(pipeline: &'p Pipeline, checkpointer: Checkpointer) -> Self {
        Self {
            pipeline,
            scheduler: Scheduler::new(pipeline.graph().clone()),
            checkpointer,
            isolated: None,
        }
    }

    /// Engine configured from `LOG_DIR`, writing through the real filesystem.
    pub fn from_env(pipeline: &'p Pipeline, env: &EnvConfig) -> Self {
        let fs: Arc<dyn FileSystem> = Arc::new(RealFileSystem);
        Self::new(pipeline, Checkpointer::from_env(env, fs))
    }

    /// Use `runner` for isolated runs instead of re-executing this binary.
    pub fn with_isolated_runner(mut self, runner: IsolatedRunner) -> Self {
        self.isolated = Some(runner);
        self
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn snapshot(&self) -> ExecutionSnapshot {
        self.scheduler.snapshot()
    }

    /// Run the pipeline, inline or with one child process per node.
    ///
    /// Node failures are recorded in the returned snapshot. The only error
    /// is failing to locate the current executable for isolated mode.
    pub async fn run(
        &mut self,
        isolate: bool,
        targets: Option<&[String]>,
    ) -> Result<ExecutionSnapshot> {
        if isolate {
            let mut runner = match self.isolated.take() {
                Some(runner) => runner,
                None => IsolatedRunner::current_exe()?,
            };
            let snapshot = self.run_with(&mut runner, targets).await;
            self.isolated = Some(runner);
            Ok(snapshot)
        } else {
            Ok(self.run_with(&mut InlineRunner, targets).await)
        }
    }

    /// Run the pipeline through an arbitrary runner.
    pub async fn run_with<R>(&mut self, runner: &mut R, targets: Option<&[String]>) -> ExecutionSnapshot
    where
        R: NodeRunner + ?Sized,
    {
        let plan = self.scheduler.plan(targets);
        info!(nodes = plan.len(), "pipeline run started");

        for id in plan.order() {
            let step = self.scheduler.step_begin(&plan, id);
            if !step.should_execute() {
                self.checkpoint();
                continue;
            }

            let report = match self.pipeline.job(id) {
                Some(job) => runner.run_node(job).await,
                None => {
                    warn!(node = %id, "no logic registered for node");
                    NodeReport::process_failure(format!(
                        "node '{id}' has no registered logic"
                    ))
                }
            };

            let step = self.scheduler.step_complete(&plan, id, report);
            self.checkpoint();

            if step.stop {
                debug!(node = %id, skipped = ?step.newly_skipped, "fail-fast stop");
                break;
            }
        }

        let snapshot = self.scheduler.snapshot();
        info!(
            status = ?snapshot.status,
            total_duration_secs = snapshot.total_duration,
            "pipeline run finished"
        );
        snapshot
    }

    fn checkpoint(&self) {
        self.checkpointer.write(&self.scheduler.snapshot());
    }
}
