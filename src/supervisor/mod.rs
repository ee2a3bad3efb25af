// src/supervisor/mod.rs

//! Process supervisor.
//!
//! Runs a pipeline command as a child process and acts as its operating
//! environment:
//! - assigns a run ID and a fresh log directory, passed down via env vars
//! - samples the child's memory into `memory.csv` ([`profiler`])
//! - forwards SIGTERM / Ctrl-C with a grace period before SIGKILL
//! - classifies the exit code and writes `error.json` ([`outcome`])
//! - uploads the log directory to durable storage ([`upload`])

pub mod outcome;
pub mod profiler;
pub mod upload;

use std::fmt;
use std::io;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use nix::sys::signal::{kill, Signal as NixSignal};
use nix::unistd::Pid;
use tokio::process::{Child, Command};
use tokio::signal::unix::{signal, Signal, SignalKind};
use tracing::{error, info, warn};

use crate::cli::SupervisorArgs;
use crate::config::env::{CONNECTOR_NAME_VAR, LOG_DIR_VAR, RUN_ID_VAR};
use crate::config::{ConfigFile, EnvConfig};
use crate::fs::{FileSystem, RealFileSystem};
use crate::storage::{DirectoryStorage, Storage};
use crate::types::ExecutionMode;

pub use outcome::{exit_code_of, Classification, RunOutcome, SPAWN_FAILURE_EXIT_CODE};
pub use profiler::{MemoryLog, MemoryProfiler, ProcessTable, ProfileSummary, SysinfoProcessTable};
pub use upload::{upload_logs, UploadSummary};

/// Everything the supervisor needs for one run, fully resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct SupervisorOptions {
    /// Program followed by its arguments.
    pub command: Vec<String>,
    pub run_id: String,
    pub log_dir: PathBuf,
    pub connector_name: String,
    pub mode: ExecutionMode,
    pub sample_interval: Duration,
    pub grace_period: Duration,
    pub profiler_join_timeout: Duration,
    /// Durable storage root; `None` disables log upload.
    pub storage_dir: Option<PathBuf>,
}

impl SupervisorOptions {
    /// Combine CLI flags, the config file and the environment.
    ///
    /// Log upload is only configured in cloud mode.
    pub fn resolve(args: &SupervisorArgs, config: &ConfigFile, env: &EnvConfig) -> Self {
        let run_id = args
            .run_id
            .clone()
            .or_else(|| env.run_id.clone())
            .unwrap_or_else(|| Local::now().format("%Y%m%d-%H%M%S").to_string());

        let log_root = match env.mode {
            ExecutionMode::Cloud => &config.supervisor.cloud_log_root,
            ExecutionMode::Local => &config.supervisor.local_log_root,
        };

        let connector_name = env
            .connector_name
            .clone()
            .or_else(current_dir_name)
            .unwrap_or_else(|| "unknown".to_string());

        let mut command = args.command.clone();
        if args.ingest_only {
            command.push("--ingest-only".to_string());
        }

        let storage_dir = if env.mode.is_cloud() {
            env.storage_dir.clone().or_else(|| config.storage.dir.clone())
        } else {
            None
        };

        Self {
            command,
            log_dir: log_root.join(&run_id),
            run_id,
            connector_name,
            mode: env.mode,
            sample_interval: config.supervisor.sample_interval(),
            grace_period: config.supervisor.grace_period(),
            profiler_join_timeout: config.supervisor.profiler_join_timeout(),
            storage_dir,
        }
    }
}

fn current_dir_name() -> Option<String> {
    let dir = std::env::current_dir().ok()?;
    dir.file_name().map(|n| n.to_string_lossy().into_owned())
}

/// Runs one supervised pipeline process.
pub struct Supervisor {
    opts: SupervisorOptions,
    fs: Arc<dyn FileSystem>,
    storage: Option<Arc<dyn Storage>>,
    process_table: Option<Box<dyn ProcessTable>>,
}

impl fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Supervisor")
            .field("opts", &self.opts)
            .field("storage", &self.storage)
            .finish_non_exhaustive()
    }
}

impl Supervisor {
    pub fn new(opts: SupervisorOptions) -> Self {
        let storage = opts
            .storage_dir
            .clone()
            .map(|dir| Arc::new(DirectoryStorage::new(dir)) as Arc<dyn Storage>);
        Self {
            opts,
            fs: Arc::new(RealFileSystem),
            storage,
            process_table: None,
        }
    }

    /// Upload logs to `storage` regardless of the configured mode.
    pub fn with_storage(mut self, storage: Arc<dyn Storage>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Sample memory from `table` instead of the live OS process table.
    pub fn with_process_table(mut self, table: Box<dyn ProcessTable>) -> Self {
        self.process_table = Some(table);
        self
    }

    pub fn options(&self) -> &SupervisorOptions {
        &self.opts
    }

    /// Run the child to completion and classify how it ended.
    ///
    /// Never fails: a child that cannot be started is reported with exit
    /// code 127. Logs are uploaded whatever the outcome.
    pub async fn run(mut self) -> RunOutcome {
        let opts = self.opts.clone();
        info!(
            run_id = %opts.run_id,
            log_dir = %opts.log_dir.display(),
            mode = %opts.mode,
            command = ?opts.command,
            "starting pipeline"
        );

        if let Err(e) = self.fs.create_dir_all(&opts.log_dir) {
            warn!(log_dir = %opts.log_dir.display(), error = %e, "failed to create log directory");
        }

        // Listen before spawning so an early SIGTERM is still forwarded.
        let exit_code = match ShutdownSignals::install() {
            Err(e) => {
                error!(error = %e, "failed to install signal handlers");
                1
            }
            Ok(mut signals) => match self.spawn_child() {
                Ok(child) => self.supervise(child, &mut signals).await,
                Err(e) => {
                    error!(command = ?opts.command, error = %e, "failed to start pipeline");
                    SPAWN_FAILURE_EXIT_CODE
                }
            },
        };

        let outcome = RunOutcome::classify(exit_code, opts.run_id.clone());
        match outcome.classification {
            Classification::Success => info!(exit_code, "pipeline completed successfully"),
            _ => error!(
                exit_code,
                classification = ?outcome.classification,
                message = %outcome.message,
                "pipeline failed"
            ),
        }

        if let Err(e) = outcome::write_error_summary(self.fs.as_ref(), &opts.log_dir, &outcome) {
            warn!(error = %e, "failed to write error summary");
        }

        if let Some(storage) = &self.storage {
            let summary = upload_logs(
                self.fs.as_ref(),
                storage.as_ref(),
                &opts.log_dir,
                &opts.connector_name,
                &opts.run_id,
            );
            info!(
                uploaded = summary.uploaded.len(),
                failed = summary.failed.len(),
                "log upload finished"
            );
        }

        outcome
    }

    fn spawn_child(&self) -> io::Result<Child> {
        let Some((program, args)) = self.opts.command.split_first() else {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "empty command"));
        };

        Command::new(program)
            .args(args)
            .env(RUN_ID_VAR, &self.opts.run_id)
            .env(LOG_DIR_VAR, &self.opts.log_dir)
            .env(CONNECTOR_NAME_VAR, &self.opts.connector_name)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
    }

    async fn supervise(&mut self, mut child: Child, signals: &mut ShutdownSignals) -> i32 {
        let profiler = child.id().and_then(|pid| self.start_profiler(pid));

        let status = wait_with_signals(&mut child, signals, self.opts.grace_period).await;

        if let Some(profiler) = profiler {
            match profiler.stop() {
                Some(summary) => info!(
                    samples = summary.samples,
                    peak_rss_mb = summary.peak_rss_bytes / (1024 * 1024),
                    "memory profile complete"
                ),
                None => warn!("memory profile incomplete"),
            }
        }

        match status {
            Ok(status) => exit_code_of(status),
            Err(e) => {
                error!(error = %e, "failed to wait for pipeline");
                1
            }
        }
    }

    fn start_profiler(&mut self, pid: u32) -> Option<MemoryProfiler> {
        let log = match MemoryLog::create(&self.opts.log_dir) {
            Ok(log) => log,
            Err(e) => {
                warn!(error = %e, "memory profiling disabled");
                return None;
            }
        };
        let table = self
            .process_table
            .take()
            .unwrap_or_else(|| Box::new(SysinfoProcessTable::new()));

        match MemoryProfiler::start(
            table,
            pid,
            log,
            self.opts.sample_interval,
            self.opts.profiler_join_timeout,
        ) {
            Ok(profiler) => Some(profiler),
            Err(e) => {
                warn!(error = %e, "failed to start memory profiler");
                None
            }
        }
    }
}

/// SIGTERM and SIGINT listeners for the supervisor process.
#[derive(Debug)]
pub struct ShutdownSignals {
    term: Signal,
    int: Signal,
}

impl ShutdownSignals {
    pub fn install() -> io::Result<Self> {
        Ok(Self {
            term: signal(SignalKind::terminate())?,
            int: signal(SignalKind::interrupt())?,
        })
    }

    /// Wait for the next termination signal and return its name.
    pub async fn recv(&mut self) -> &'static str {
        tokio::select! {
            _ = self.term.recv() => "SIGTERM",
            _ = self.int.recv() => "SIGINT",
        }
    }
}

enum Waited {
    Exited(io::Result<ExitStatus>),
    Signalled(&'static str),
}

/// Wait for `child`, terminating it gracefully if this process receives
/// SIGTERM or Ctrl-C first.
pub async fn wait_with_signals(
    child: &mut Child,
    signals: &mut ShutdownSignals,
    grace: Duration,
) -> io::Result<ExitStatus> {
    let waited = tokio::select! {
        status = child.wait() => Waited::Exited(status),
        name = signals.recv() => Waited::Signalled(name),
    };

    match waited {
        Waited::Exited(status) => status,
        Waited::Signalled(name) => {
            warn!(signal = name, "received termination signal; stopping pipeline");
            terminate_gracefully(child, grace).await
        }
    }
}

/// Send SIGTERM, wait up to `grace`, then SIGKILL.
pub async fn terminate_gracefully(child: &mut Child, grace: Duration) -> io::Result<ExitStatus> {
    if let Some(pid) = child.id() {
        if let Err(e) = kill(Pid::from_raw(pid as i32), NixSignal::SIGTERM) {
            warn!(pid, error = %e, "failed to send SIGTERM");
        }
    }

    match tokio::time::timeout(grace, child.wait()).await {
        Ok(status) => status,
        Err(_) => {
            warn!(grace_secs = grace.as_secs_f64(), "grace period elapsed; killing pipeline");
            child.kill().await?;
            child.wait().await
        }
    }
}
