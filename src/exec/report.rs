// src/exec/report.rs

//! Result of one node execution, as handed back to the engine.
//!
//! The same shape crosses the process boundary in the isolated strategy, so
//! it is serde-serializable.

use serde::{Deserialize, Serialize};

use crate::exec::fault::NodeFault;
use crate::track::IoRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportStatus {
    Done,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeReport {
    pub status: ReportStatus,
    #[serde(default)]
    pub reads: Vec<String>,
    #[serde(default)]
    pub writes: Vec<String>,
    #[serde(default)]
    pub rows_written: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace: Option<String>,
}

impl NodeReport {
    /// Combine what a node recorded with how it ended.
    pub fn from_outcome(io: IoRecord, outcome: Result<(), NodeFault>) -> Self {
        let (status, error, trace) = match outcome {
            Ok(()) => (ReportStatus::Done, None, None),
            Err(fault) => (ReportStatus::Failed, Some(fault.message), Some(fault.detail)),
        };

        Self {
            status,
            reads: io.reads,
            writes: io.writes,
            rows_written: io.rows_written,
            error,
            trace,
        }
    }

    /// Failure reported on behalf of a node whose execution never produced
    /// its own report (spawn error, crashed child, lost worker).
    pub fn process_failure(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            status: ReportStatus::Failed,
            reads: Vec::new(),
            writes: Vec::new(),
            rows_written: 0,
            error: Some(message.clone()),
            trace: Some(message),
        }
    }

    pub fn is_done(&self) -> bool {
        self.status == ReportStatus::Done
    }
}
