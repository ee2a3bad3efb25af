// src/dag/snapshot.rs

//! Serializable picture of a run, as written to `dag.json`.

use serde::{Deserialize, Serialize};

use crate::dag::graph::Edge;
use crate::dag::task_state::{TaskState, TaskStatus};

/// Status of the run as a whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregateStatus {
    Pending,
    Running,
    Done,
    Failed,
}

impl AggregateStatus {
    /// Any failure wins, then any running node. Otherwise the run is done
    /// only when every node is done.
    pub fn of(states: &[TaskState]) -> Self {
        if states.iter().any(|s| s.status == TaskStatus::Failed) {
            AggregateStatus::Failed
        } else if states.iter().any(|s| s.status == TaskStatus::Running) {
            AggregateStatus::Running
        } else if states.iter().all(|s| s.status == TaskStatus::Done) {
            AggregateStatus::Done
        } else {
            AggregateStatus::Pending
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionSnapshot {
    /// Node states in insertion order.
    pub nodes: Vec<TaskState>,
    pub edges: Vec<Edge>,
    pub status: AggregateStatus,
    /// Sum of node durations in seconds.
    pub total_duration: f64,
}

impl ExecutionSnapshot {
    pub fn new(nodes: Vec<TaskState>, edges: Vec<Edge>) -> Self {
        let status = AggregateStatus::of(&nodes);
        let total_duration = nodes.iter().map(TaskState::duration_secs).sum();
        Self {
            nodes,
            edges,
            status,
            total_duration,
        }
    }

    pub fn node(&self, id: &str) -> Option<&TaskState> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn status_of(&self, id: &str) -> Option<TaskStatus> {
        self.node(id).map(|n| n.status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(id: &str, status: TaskStatus, duration: Option<f64>) -> TaskState {
        let mut s = TaskState::new(id);
        s.status = status;
        s.duration = duration;
        s
    }

    #[test]
    fn aggregate_status_precedence() {
        use TaskStatus::*;

        let cases = [
            (vec![Done, Done], AggregateStatus::Done),
            (vec![Done, Pending], AggregateStatus::Pending),
            (vec![Done, Skipped], AggregateStatus::Pending),
            (vec![Running, Pending], AggregateStatus::Running),
            (vec![Running, Failed], AggregateStatus::Failed),
            (vec![Failed, Skipped], AggregateStatus::Failed),
            (vec![], AggregateStatus::Done),
        ];

        for (statuses, expected) in cases {
            let states: Vec<_> = statuses
                .iter()
                .enumerate()
                .map(|(i, s)| state(&format!("n{i}"), *s, None))
                .collect();
            assert_eq!(AggregateStatus::of(&states), expected, "{statuses:?}");
        }
    }

    #[test]
    fn total_duration_sums_nodes_that_ran() {
        let snap = ExecutionSnapshot::new(
            vec![
                state("a", TaskStatus::Done, Some(1.5)),
                state("b", TaskStatus::Done, Some(0.25)),
                state("c", TaskStatus::Pending, None),
            ],
            Vec::new(),
        );
        assert!((snap.total_duration - 1.75).abs() < f64::EPSILON);
        assert_eq!(snap.status, AggregateStatus::Pending);
        assert_eq!(snap.status_of("b"), Some(TaskStatus::Done));
        assert!(snap.node("zzz").is_none());
    }

    #[test]
    fn json_shape() {
        let snap = ExecutionSnapshot::new(
            vec![state("a", TaskStatus::Done, Some(1.0))],
            vec![Edge {
                from: "a".into(),
                to: "b".into(),
            }],
        );
        let json = serde_json::to_value(&snap).unwrap();
        assert_eq!(json["status"], "done");
        assert_eq!(json["edges"][0]["from"], "a");
        assert_eq!(json["nodes"][0]["id"], "a");
        assert_eq!(json["total_duration"], 1.0);
    }
}
