// src/exec/isolated.rs

//! Isolated execution: one node per child process.
//!
//! The parent re-executes a pipeline binary with [`ISOLATED_NODE_ENV`] and
//! [`RESULT_PATH_ENV`] set. The binary calls [`serve_isolated_request`]
//! before doing anything else, runs just that node, writes a [`NodeReport`]
//! as JSON to the result path and exits. Whatever memory the node used is
//! returned to the OS with the process.

use std::ffi::OsString;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::process::{ExitCode, ExitStatus, Stdio};
use std::sync::Arc;

use tokio::process::Command;
use tracing::{debug, error, info, warn};

use crate::errors::Result;
use crate::exec::backend::{run_tracked, NodeJob, NodeRunner};
use crate::exec::report::NodeReport;
use crate::fs::{FileSystem, RealFileSystem};
use crate::pipeline::Pipeline;

/// Node the child process should run.
pub const ISOLATED_NODE_ENV: &str = "RUNDAG_ISOLATED_NODE";
/// File the child writes its report to.
pub const RESULT_PATH_ENV: &str = "RUNDAG_RESULT_PATH";

/// Runs each node in a freshly spawned process and waits for it.
#[derive(Debug, Clone)]
pub struct IsolatedRunner {
    program: PathBuf,
    args: Vec<OsString>,
    fs: Arc<dyn FileSystem>,
}

impl IsolatedRunner {
    /// Re-execute the running binary.
    pub fn current_exe() -> Result<Self> {
        Ok(Self::with_program(std::env::current_exe()?, Vec::<OsString>::new()))
    }

    /// Execute `program args...` as the child pipeline binary.
    pub fn with_program<I, S>(program: impl Into<PathBuf>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            fs: Arc::new(RealFileSystem),
        }
    }

    async fn run_in_child(&self, job: &NodeJob) -> NodeReport {
        let result_file = match tempfile::Builder::new()
            .prefix("rundag-node-")
            .suffix(".json")
            .tempfile()
        {
            Ok(f) => f,
            Err(e) => {
                return NodeReport::process_failure(format!(
                    "creating result file for node '{}': {e}",
                    job.id
                ));
            }
        };
        let result_path = result_file.path().to_path_buf();

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .env(ISOLATED_NODE_ENV, &job.id)
            .env(RESULT_PATH_ENV, &result_path)
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                error!(node = %job.id, program = ?self.program, error = %e, "failed to spawn isolated process");
                return NodeReport::process_failure(format!(
                    "spawning isolated process for node '{}': {e}",
                    job.id
                ));
            }
        };

        debug!(node = %job.id, pid = ?child.id(), "isolated process started");

        let status = match child.wait().await {
            Ok(status) => status,
            Err(e) => {
                return NodeReport::process_failure(format!(
                    "waiting for isolated process of node '{}': {e}",
                    job.id
                ));
            }
        };

        info!(node = %job.id, status = %status, "isolated process exited");

        let report = self
            .fs
            .read_to_string(&result_path)
            .ok()
            .and_then(|raw| serde_json::from_str::<NodeReport>(&raw).ok());

        match report {
            Some(report) => report,
            None => {
                warn!(node = %job.id, status = %status, "isolated process reported no result");
                NodeReport::process_failure(format!(
                    "isolated process for node '{}' {} without reporting a result",
                    job.id,
                    describe_status(status)
                ))
            }
        }
    }
}

impl NodeRunner for IsolatedRunner {
    fn run_node(&mut self, job: NodeJob) -> Pin<Box<dyn Future<Output = NodeReport> + Send + '_>> {
        Box::pin(async move { self.run_in_child(&job).await })
    }
}

fn describe_status(status: ExitStatus) -> String {
    use std::os::unix::process::ExitStatusExt;

    match (status.code(), status.signal()) {
        (Some(code), _) => format!("exited with code {code}"),
        (None, Some(signal)) => format!("was killed by signal {signal}"),
        (None, None) => "ended with an unknown status".to_string(),
    }
}

/// Child-side entry point for isolated execution.
///
/// Returns `None` when this process was not started as an isolated node, in
/// which case the caller carries on as a normal pipeline run. Otherwise runs
/// the requested node and returns the exit code the process should use.
pub fn serve_isolated_request(pipeline: &Pipeline) -> Option<ExitCode> {
    let node_id = std::env::var(ISOLATED_NODE_ENV).ok()?;
    let result_path = std::env::var_os(RESULT_PATH_ENV).map(PathBuf::from);
    Some(serve_node(pipeline, &node_id, result_path, &RealFileSystem))
}

fn serve_node(
    pipeline: &Pipeline,
    node_id: &str,
    result_path: Option<PathBuf>,
    fs: &dyn FileSystem,
) -> ExitCode {
    let Some(result_path) = result_path else {
        error!(node = %node_id, "isolated node started without {RESULT_PATH_ENV}");
        return ExitCode::from(2);
    };

    let report = match pipeline.node_fn(node_id) {
        Some(func) => run_tracked(func),
        None => NodeReport::process_failure(format!(
            "node '{node_id}' is not registered in this pipeline"
        )),
    };

    let written = serde_json::to_vec(&report)
        .map_err(anyhow::Error::from)
        .and_then(|bytes| fs.write(&result_path, &bytes));
    if let Err(e) = written {
        error!(node = %node_id, error = %e, "failed to write isolated node report");
        return ExitCode::from(2);
    }

    if report.is_done() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;
    use crate::fs::mock::MockFileSystem;
    use crate::track::track_write;

    fn pipeline() -> Pipeline {
        Pipeline::builder()
            .node("ingest.run", &[], || {
                track_write("raw/wdi", Some(5));
                Ok(())
            })
            .node("tables.run", &["ingest.run"], || anyhow::bail!("no rows"))
            .build()
            .unwrap()
    }

    fn written_report(fs: &MockFileSystem, path: &Path) -> NodeReport {
        serde_json::from_str(&fs.read_to_string(path).unwrap()).unwrap()
    }

    #[test]
    fn child_writes_done_report() {
        let fs = MockFileSystem::new();
        let path = PathBuf::from("/tmp/report.json");

        let code = serve_node(&pipeline(), "ingest.run", Some(path.clone()), &fs);
        assert_eq!(code, ExitCode::SUCCESS);

        let report = written_report(&fs, &path);
        assert!(report.is_done());
        assert_eq!(report.writes, vec!["raw/wdi"]);
        assert_eq!(report.rows_written, 5);
    }

    #[test]
    fn child_writes_failed_report_for_errors_and_unknown_nodes() {
        let fs = MockFileSystem::new();
        let path = PathBuf::from("/tmp/report.json");

        assert_eq!(
            serve_node(&pipeline(), "tables.run", Some(path.clone()), &fs),
            ExitCode::FAILURE
        );
        assert_eq!(written_report(&fs, &path).error.as_deref(), Some("no rows"));

        assert_eq!(
            serve_node(&pipeline(), "missing.run", Some(path.clone()), &fs),
            ExitCode::FAILURE
        );
        assert!(
            written_report(&fs, &path)
                .error
                .unwrap()
                .contains("not registered")
        );
    }

    #[tokio::test]
    async fn child_that_reports_nothing_is_a_process_failure() {
        let mut runner = IsolatedRunner::with_program("sh", ["-c", "exit 9"]);
        let func: crate::pipeline::NodeFn = Arc::new(|| Ok(()));
        let report = runner
            .run_node(NodeJob {
                id: "ingest.run".into(),
                func,
            })
            .await;

        assert!(!report.is_done());
        let error = report.error.unwrap();
        assert!(error.contains("exited with code 9"), "{error}");
        assert!(error.contains("without reporting a result"));
    }

    #[tokio::test]
    async fn child_report_is_read_back() {
        let script = format!(
            r#"printf '{{"status":"done","reads":["a"],"writes":["b"],"rows_written":3}}' > "${}""#,
            RESULT_PATH_ENV
        );
        let mut runner = IsolatedRunner::with_program("sh", ["-c".to_string(), script]);
        let func: crate::pipeline::NodeFn = Arc::new(|| Ok(()));
        let report = runner
            .run_node(NodeJob {
                id: "ingest.run".into(),
                func,
            })
            .await;

        assert!(report.is_done());
        assert_eq!(report.reads, vec!["a"]);
        assert_eq!(report.writes, vec!["b"]);
        assert_eq!(report.rows_written, 3);
    }
}
