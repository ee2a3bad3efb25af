// src/exec/mod.rs

//! Node execution layer.
//!
//! - [`backend`] provides the `NodeRunner` trait, the job type handed to
//!   runners, and the in-process `InlineRunner`.
//! - [`isolated`] runs a node in a fresh child process and contains the
//!   child-side entry point.
//! - [`fault`] turns node errors and panics into recorded failures.
//! - [`report`] is the per-node result both strategies produce.

pub mod backend;
pub mod fault;
pub mod isolated;
pub mod report;

pub use backend::{InlineRunner, NodeJob, NodeRunner};
pub use isolated::{serve_isolated_request, IsolatedRunner};
pub use report::{NodeReport, ReportStatus};
