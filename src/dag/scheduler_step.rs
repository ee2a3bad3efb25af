// src/dag/scheduler_step.rs

//! Step-by-step execution result types for the scheduler.

use crate::dag::graph::NodeId;
use crate::dag::task_state::TaskStatus;

/// Structured result of a single scheduler "step".
///
/// The engine uses it to decide whether to execute, checkpoint or stop, and
/// tests use it to step a run by hand.
#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerStep {
    /// Node this step acted on.
    pub node: NodeId,
    /// Status of that node after the step.
    pub status: TaskStatus,
    /// Nodes newly marked skipped because of this step.
    pub newly_skipped: Vec<NodeId>,
    /// Whether the run must stop after this step.
    pub stop: bool,
}

impl SchedulerStep {
    pub fn should_execute(&self) -> bool {
        self.status == TaskStatus::Running
    }
}
