// src/exec/backend.rs

//! Pluggable node runner abstraction.
//!
//! The engine talks to a `NodeRunner` instead of calling node logic
//! directly. This keeps the two execution strategies behind one seam and
//! makes it easy to swap in a fake runner in tests.
//!
//! - [`InlineRunner`] runs node logic in this process.
//! - [`IsolatedRunner`](super::isolated::IsolatedRunner) runs it in a fresh
//!   child process.

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use tracing::error;

use crate::dag::NodeId;
use crate::exec::fault::run_guarded;
use crate::exec::report::NodeReport;
use crate::pipeline::NodeFn;
use crate::track::TrackingScope;

/// Description of a node the engine wants executed now.
#[derive(Clone)]
pub struct NodeJob {
    pub id: NodeId,
    pub func: NodeFn,
}

impl fmt::Debug for NodeJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeJob")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

/// Trait abstracting how a single node is executed.
///
/// Implementations never fail: every problem, including being unable to run
/// the node at all, is expressed as a failed [`NodeReport`].
pub trait NodeRunner: Send {
    fn run_node(&mut self, job: NodeJob) -> Pin<Box<dyn Future<Output = NodeReport> + Send + '_>>;
}

/// Runs node logic in the current process on the blocking thread pool.
#[derive(Debug, Clone, Default)]
pub struct InlineRunner;

impl NodeRunner for InlineRunner {
    fn run_node(&mut self, job: NodeJob) -> Pin<Box<dyn Future<Output = NodeReport> + Send + '_>> {
        Box::pin(async move {
            let id = job.id.clone();
            let worker = tokio::task::spawn_blocking(move || run_tracked(&job.func));

            match worker.await {
                Ok(report) => report,
                Err(err) => {
                    error!(node = %id, error = %err, "inline worker lost");
                    NodeReport::process_failure(format!(
                        "inline worker for node '{id}' was lost: {err}"
                    ))
                }
            }
        })
    }
}

/// Run node logic with a fresh tracking context bound to this thread.
pub fn run_tracked(func: &NodeFn) -> NodeReport {
    let scope = TrackingScope::bind();
    let outcome = run_guarded(|| func());
    let io = scope.finish();
    NodeReport::from_outcome(io, outcome)
}
