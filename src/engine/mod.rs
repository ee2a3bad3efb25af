// src/engine/mod.rs

//! Execution engine.
//!
//! The per-node state machine lives in [`crate::dag::Scheduler`]; this
//! module is the async shell around it:
//! - [`runtime`] drives a run and hands nodes to a runner
//! - [`checkpoint`] persists the snapshot after every node

pub mod checkpoint;
pub mod runtime;

pub use checkpoint::{Checkpointer, CHECKPOINT_FILE};
pub use runtime::Engine;
