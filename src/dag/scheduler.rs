// src/dag/scheduler.rs

use std::collections::{HashMap, HashSet};

use tracing::{debug, info, warn};

use crate::dag::graph::{DagGraph, NodeId};
use crate::dag::scheduler_step::SchedulerStep;
use crate::dag::snapshot::ExecutionSnapshot;
use crate::dag::state_manager::StateManager;
use crate::dag::task_state::{TaskState, TaskStatus};
use crate::exec::NodeReport;

/// Nodes selected for one run, in execution order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunPlan {
    order: Vec<NodeId>,
    members: HashSet<NodeId>,
}

impl RunPlan {
    fn new(order: Vec<NodeId>) -> Self {
        let members = order.iter().cloned().collect();
        Self { order, members }
    }

    pub fn order(&self) -> &[NodeId] {
        &self.order
    }

    pub fn contains(&self, id: &str) -> bool {
        self.members.contains(id)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// Scheduler holds the immutable DAG plus the mutable state of every node.
///
/// It is responsible for:
/// - choosing which nodes take part in a run
/// - refusing to start a node whose in-plan dependencies did not succeed
/// - recording execution results
/// - skipping everything downstream of a failure
#[derive(Debug)]
pub struct Scheduler {
    graph: DagGraph,
    /// Node states in insertion order.
    states: Vec<TaskState>,
    index: HashMap<NodeId, usize>,
}

impl Scheduler {
    /// Create a scheduler with every node pending.
    pub fn new(graph: DagGraph) -> Self {
        let states: Vec<TaskState> = graph.ids().map(TaskState::new).collect();
        let index = states
            .iter()
            .enumerate()
            .map(|(i, s)| (s.id.clone(), i))
            .collect();

        Self {
            graph,
            states,
            index,
        }
    }

    pub fn graph(&self) -> &DagGraph {
        &self.graph
    }

    /// All node states in insertion order.
    pub fn states(&self) -> &[TaskState] {
        &self.states
    }

    pub fn state_of(&self, id: &str) -> Option<&TaskState> {
        self.index.get(id).map(|&i| &self.states[i])
    }

    pub fn status_of(&self, id: &str) -> Option<TaskStatus> {
        self.state_of(id).map(|s| s.status)
    }

    /// Select the nodes to run.
    ///
    /// `None` or an empty target list selects the whole graph. Targets that
    /// match nothing produce an empty plan and a warning listing the
    /// available IDs.
    pub fn plan(&self, targets: Option<&[String]>) -> RunPlan {
        let order: Vec<NodeId> = match targets {
            Some(targets) if !targets.is_empty() => {
                let selected = self.graph.select_targets(targets);
                if selected.is_empty() {
                    let available: Vec<&str> = self.graph.ids().collect();
                    warn!(
                        targets = ?targets,
                        available = ?available,
                        "no nodes match the requested targets"
                    );
                }
                selected.into_iter().map(str::to_string).collect()
            }
            _ => self
                .graph
                .topological_order()
                .into_iter()
                .map(str::to_string)
                .collect(),
        };

        debug!(nodes = ?order, "run plan");
        RunPlan::new(order)
    }

    fn manager<'a>(&'a mut self, plan: &'a RunPlan) -> StateManager<'a> {
        StateManager::new(&self.graph, &mut self.states, &self.index, &plan.members)
    }

    /// Start `id`: mark it running, or skipped if an in-plan dependency did
    /// not succeed.
    pub fn step_begin(&mut self, plan: &RunPlan, id: &str) -> SchedulerStep {
        if !self.index.contains_key(id) {
            warn!(node = %id, "asked to start unknown node");
            return SchedulerStep {
                node: id.to_string(),
                status: TaskStatus::Pending,
                newly_skipped: Vec::new(),
                stop: false,
            };
        }

        let mut sm = self.manager(plan);
        if let Some((dep, status)) = sm.unsatisfied_dependency(id) {
            let reason = match status {
                TaskStatus::Failed => format!("dependency {dep} failed"),
                other => format!("dependency {dep} is {other}"),
            };
            info!(node = %id, reason = %reason, "skipping node");
            sm.mark_skipped(id, reason);
            return SchedulerStep {
                node: id.to_string(),
                status: TaskStatus::Skipped,
                newly_skipped: vec![id.to_string()],
                stop: false,
            };
        }

        sm.mark_running(id);
        info!(node = %id, "running node");
        SchedulerStep {
            node: id.to_string(),
            status: TaskStatus::Running,
            newly_skipped: Vec::new(),
            stop: false,
        }
    }

    /// Record the result of `id`. A failure skips its dependents and stops
    /// the run.
    pub fn step_complete(&mut self, plan: &RunPlan, id: &str, report: NodeReport) -> SchedulerStep {
        let mut sm = self.manager(plan);
        let status = sm.apply_report(id, report);

        let newly_skipped = if status == TaskStatus::Failed {
            sm.skip_dependents(id)
        } else {
            Vec::new()
        };

        match status {
            TaskStatus::Done => {
                let duration = self.state_of(id).map(TaskState::duration_secs);
                info!(node = %id, duration_secs = ?duration, "node done");
            }
            TaskStatus::Failed => {
                let error = self.state_of(id).and_then(|s| s.error.clone());
                warn!(
                    node = %id,
                    error = ?error,
                    skipped = ?newly_skipped,
                    "node failed; stopping run"
                );
            }
            _ => {}
        }

        SchedulerStep {
            node: id.to_string(),
            status,
            newly_skipped,
            stop: status == TaskStatus::Failed,
        }
    }

    /// Current state of the whole graph.
    pub fn snapshot(&self) -> ExecutionSnapshot {
        ExecutionSnapshot::new(self.states.clone(), self.graph.edges())
    }
}
