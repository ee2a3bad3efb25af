// src/dag/task_state.rs

//! Per-node execution record.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::dag::graph::NodeId;

/// Lifecycle of one node within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Running,
    Done,
    Failed,
    Skipped,
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Done => "done",
            TaskStatus::Failed => "failed",
            TaskStatus::Skipped => "skipped",
        };
        f.write_str(s)
    }
}

impl TaskStatus {
    /// Whether the node has reached an end state for this run.
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Done | TaskStatus::Failed | TaskStatus::Skipped)
    }
}

/// Status, timing and recorded I/O of a node.
///
/// Only the engine mutates this, through the state manager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskState {
    pub id: NodeId,
    pub status: TaskStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    /// Seconds between `started_at` and `finished_at`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    #[serde(default)]
    pub reads: Vec<String>,
    #[serde(default)]
    pub writes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rows_written: Option<u64>,
    /// Failure message, or the skip reason for skipped nodes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
}

impl TaskState {
    pub fn new(id: impl Into<NodeId>) -> Self {
        Self {
            id: id.into(),
            status: TaskStatus::Pending,
            started_at: None,
            finished_at: None,
            duration: None,
            reads: Vec::new(),
            writes: Vec::new(),
            rows_written: None,
            error: None,
            error_detail: None,
        }
    }

    /// Duration in seconds, or zero if the node never ran.
    pub fn duration_secs(&self) -> f64 {
        self.duration.unwrap_or(0.0)
    }
}
