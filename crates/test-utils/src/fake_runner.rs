use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use rundag::exec::{NodeJob, NodeReport, NodeRunner, ReportStatus};

/// A fake runner that:
/// - records which nodes were handed to it, in order
/// - never calls the node logic
/// - reports success, unless a failure was scripted for the node.
#[derive(Debug, Default, Clone)]
pub struct FakeRunner {
    executed: Arc<Mutex<Vec<String>>>,
    failures: HashMap<String, String>,
}

impl FakeRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `id` fail with `message`.
    pub fn fail(mut self, id: &str, message: &str) -> Self {
        self.failures.insert(id.to_string(), message.to_string());
        self
    }

    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }
}

impl NodeRunner for FakeRunner {
    fn run_node(&mut self, job: NodeJob) -> Pin<Box<dyn Future<Output = NodeReport> + Send + '_>> {
        self.executed.lock().unwrap().push(job.id.clone());

        let report = match self.failures.get(&job.id) {
            Some(message) => NodeReport::process_failure(message.clone()),
            None => NodeReport {
                status: ReportStatus::Done,
                reads: Vec::new(),
                writes: vec![format!("raw/{}", job.id)],
                rows_written: 1,
                error: None,
                trace: None,
            },
        };

        Box::pin(async move { report })
    }
}
