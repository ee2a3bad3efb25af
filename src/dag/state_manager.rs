// src/dag/state_manager.rs

//! State transitions for nodes in a run.

use std::collections::{HashMap, HashSet};

use chrono::Utc;
use tracing::{debug, warn};

use crate::dag::graph::{DagGraph, NodeId};
use crate::dag::task_state::{TaskState, TaskStatus};
use crate::exec::NodeReport;

/// Applies transitions to the task states owned by the scheduler.
///
/// `plan` is the set of nodes selected for the current run. Dependencies
/// outside it are presumed satisfied by a previous run.
pub struct StateManager<'a> {
    graph: &'a DagGraph,
    states: &'a mut [TaskState],
    index: &'a HashMap<NodeId, usize>,
    plan: &'a HashSet<NodeId>,
}

impl<'a> StateManager<'a> {
    pub fn new(
        graph: &'a DagGraph,
        states: &'a mut [TaskState],
        index: &'a HashMap<NodeId, usize>,
        plan: &'a HashSet<NodeId>,
    ) -> Self {
        Self {
            graph,
            states,
            index,
            plan,
        }
    }

    fn state_mut(&mut self, id: &str) -> Option<&mut TaskState> {
        let i = *self.index.get(id)?;
        self.states.get_mut(i)
    }

    fn status(&self, id: &str) -> Option<TaskStatus> {
        self.index.get(id).map(|&i| self.states[i].status)
    }

    /// First in-plan dependency of `id` that is not done, with its status.
    pub fn unsatisfied_dependency(&self, id: &str) -> Option<(NodeId, TaskStatus)> {
        self.graph
            .dependencies_of(id)
            .iter()
            .filter(|dep| self.plan.contains(dep.as_str()))
            .find_map(|dep| match self.status(dep) {
                Some(TaskStatus::Done) | None => None,
                Some(status) => Some((dep.clone(), status)),
            })
    }

    /// Move a node to running, clearing anything left from an earlier run.
    pub fn mark_running(&mut self, id: &str) {
        let Some(state) = self.state_mut(id) else {
            warn!(node = %id, "cannot start unknown node");
            return;
        };
        *state = TaskState::new(id);
        state.status = TaskStatus::Running;
        state.started_at = Some(Utc::now());
        debug!(node = %id, "marked running");
    }

    pub fn mark_skipped(&mut self, id: &str, reason: String) {
        let Some(state) = self.state_mut(id) else {
            warn!(node = %id, "cannot skip unknown node");
            return;
        };
        state.status = TaskStatus::Skipped;
        state.error = Some(reason);
        debug!(node = %id, "marked skipped");
    }

    /// Record a finished execution. Returns the resulting status.
    pub fn apply_report(&mut self, id: &str, report: NodeReport) -> TaskStatus {
        let Some(state) = self.state_mut(id) else {
            warn!(node = %id, "report for unknown node ignored");
            return TaskStatus::Pending;
        };

        let finished = Utc::now();
        let started = *state.started_at.get_or_insert(finished);
        state.finished_at = Some(finished);
        state.duration = Some(
            (finished - started)
                .to_std()
                .map(|d| d.as_secs_f64())
                .unwrap_or(0.0),
        );

        state.status = if report.is_done() {
            TaskStatus::Done
        } else {
            TaskStatus::Failed
        };
        state.reads = report.reads;
        state.writes = report.writes;
        state.rows_written = (report.rows_written > 0).then_some(report.rows_written);
        state.error = report.error;
        state.error_detail = report.trace;

        state.status
    }

    /// Skip every pending in-plan node downstream of `failed`.
    ///
    /// Returns the newly skipped nodes in execution order.
    pub fn skip_dependents(&mut self, failed: &str) -> Vec<NodeId> {
        let graph = self.graph;
        let mut newly_skipped = Vec::new();

        for dependent in graph.transitive_dependents(failed) {
            if !self.plan.contains(dependent) || self.status(dependent) != Some(TaskStatus::Pending)
            {
                continue;
            }
            self.mark_skipped(dependent, format!("dependency {failed} failed"));
            newly_skipped.push(dependent.to_string());
        }

        newly_skipped
    }
}
