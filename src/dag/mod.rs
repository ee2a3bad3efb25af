// src/dag/mod.rs

//! DAG representation and scheduling.
//!
//! - [`graph`] holds the validated dependency graph and its execution order.
//! - [`scheduler`] contains the per-run state machine that decides whether
//!   a node may start and what a failure does to its dependents.
//! - [`task_state`] is the per-node record the scheduler maintains.
//! - [`scheduler_step`] defines the result type for scheduler steps.
//! - [`state_manager`] applies state transitions.
//! - [`snapshot`] is the serializable view written to checkpoints.

pub mod graph;
pub mod scheduler;
pub mod scheduler_step;
pub mod snapshot;
pub mod state_manager;
pub mod task_state;

pub use graph::{DagGraph, Edge, NodeId};
pub use scheduler::{RunPlan, Scheduler};
pub use scheduler_step::SchedulerStep;
pub use snapshot::{AggregateStatus, ExecutionSnapshot};
pub use task_state::{TaskState, TaskStatus};
