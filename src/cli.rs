// src/cli.rs

//! CLI argument parsing using `clap`.
//!
//! Two surfaces share this module:
//! - [`SupervisorArgs`] for the `rundag` supervisor binary.
//! - [`PipelineArgs`] for pipeline binaries built on the library.

use std::path::PathBuf;

use clap::{Args, Parser, ValueEnum};

/// Command-line arguments for the `rundag` supervisor.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "rundag",
    version,
    about = "Run a pipeline command under supervision: memory profiling, signal forwarding and log upload.",
    long_about = None
)]
pub struct SupervisorArgs {
    /// Only run the ingestion phase (passes `--ingest-only` to the pipeline).
    #[arg(long)]
    pub ingest_only: bool,

    /// Run identifier. Defaults to `RUN_ID`, then the local time.
    #[arg(long, value_name = "ID")]
    pub run_id: Option<String>,

    /// Path to the supervisor config file (TOML).
    ///
    /// Default: `Rundag.toml` in the current working directory. A missing
    /// file means built-in defaults.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(flatten)]
    pub logging: LoggingArgs,

    /// Pipeline command to run, e.g. `-- ./target/release/my-pipeline`.
    #[arg(
        required = true,
        trailing_var_arg = true,
        allow_hyphen_values = true,
        value_name = "COMMAND"
    )]
    pub command: Vec<String>,
}

/// Command-line arguments understood by pipeline binaries.
#[derive(Debug, Clone, Default, Parser)]
#[command(about = "Run the nodes of this pipeline in dependency order.", long_about = None)]
pub struct PipelineArgs {
    /// Restrict the run to nodes matching this group, ID or short name.
    /// May be repeated.
    #[arg(long = "target", value_name = "TARGET")]
    pub targets: Vec<String>,

    /// Run every node in its own child process.
    #[arg(long)]
    pub isolate: bool,

    /// Only run the `ingest` group.
    #[arg(long)]
    pub ingest_only: bool,

    #[command(flatten)]
    pub logging: LoggingArgs,
}

impl PipelineArgs {
    /// Effective targets; `None` runs the whole graph.
    pub fn targets(&self) -> Option<Vec<String>> {
        let mut targets = self.targets.clone();
        if self.ingest_only && !targets.iter().any(|t| t == "ingest") {
            targets.push("ingest".to_string());
        }
        (!targets.is_empty()).then_some(targets)
    }
}

#[derive(Debug, Clone, Default, Args)]
pub struct LoggingArgs {
    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `RUNDAG_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `SupervisorArgs::parse()`.
pub fn parse() -> SupervisorArgs {
    SupervisorArgs::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn supervisor_takes_trailing_command_with_flags() {
        let args = SupervisorArgs::try_parse_from([
            "rundag",
            "--run-id",
            "r1",
            "--",
            "my-pipeline",
            "--isolate",
            "--target",
            "tables",
        ])
        .unwrap();

        assert_eq!(args.run_id.as_deref(), Some("r1"));
        assert!(!args.ingest_only);
        assert_eq!(
            args.command,
            vec!["my-pipeline", "--isolate", "--target", "tables"]
        );
    }

    #[test]
    fn supervisor_requires_a_command() {
        assert!(SupervisorArgs::try_parse_from(["rundag", "--ingest-only"]).is_err());
    }

    #[test]
    fn pipeline_targets() {
        let args = PipelineArgs::try_parse_from(["p"]).unwrap();
        assert_eq!(args.targets(), None);

        let args = PipelineArgs::try_parse_from(["p", "--ingest-only"]).unwrap();
        assert_eq!(args.targets(), Some(vec!["ingest".to_string()]));

        let args =
            PipelineArgs::try_parse_from(["p", "--target", "a", "--target", "b.run", "--isolate"])
                .unwrap();
        assert!(args.isolate);
        assert_eq!(args.targets(), Some(vec!["a".to_string(), "b.run".to_string()]));
    }

    #[test]
    fn log_level_parses() {
        let args = PipelineArgs::try_parse_from(["p", "--log-level", "debug"]).unwrap();
        assert_eq!(args.logging.log_level, Some(LogLevel::Debug));
    }
}
