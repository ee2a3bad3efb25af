use std::fs;
use std::io::{self, Write};
use std::path::Path;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use rundag::storage::DirectoryStorage;
use rundag::supervisor::outcome::ErrorSummary;
use rundag::supervisor::profiler::{MemoryLog, MemoryProfiler};
use rundag::supervisor::{terminate_gracefully, Classification, Supervisor, SupervisorOptions};
use rundag::types::ExecutionMode;
use rundag_test_utils::fake_process_table::{FakeProcessTable, Frame};
use rundag_test_utils::{init_tracing, with_timeout};
use tokio::process::Command;

fn options(log_dir: &Path, script: &str) -> SupervisorOptions {
    SupervisorOptions {
        command: vec!["sh".into(), "-c".into(), script.into()],
        run_id: "r1".into(),
        log_dir: log_dir.to_path_buf(),
        connector_name: "wdi".into(),
        mode: ExecutionMode::Local,
        sample_interval: Duration::from_millis(20),
        grace_period: Duration::from_secs(2),
        profiler_join_timeout: Duration::from_secs(2),
        storage_dir: None,
    }
}

fn read_summary(log_dir: &Path) -> ErrorSummary {
    serde_json::from_str(&fs::read_to_string(log_dir.join("error.json")).unwrap()).unwrap()
}

#[tokio::test]
async fn successful_child_sees_run_env_and_logs_are_uploaded() {
    init_tracing();
    let tmp = tempfile::tempdir().unwrap();
    let log_dir = tmp.path().join("logs/r1");
    let bucket = tmp.path().join("bucket");

    let script = r#"
        test "$RUN_ID" = r1 || exit 5
        test "$CONNECTOR_NAME" = wdi || exit 6
        mkdir -p "$LOG_DIR/nodes" && echo ok > "$LOG_DIR/nodes/ingest.log"
    "#;
    let outcome = with_timeout(
        Supervisor::new(options(&log_dir, script))
            .with_storage(Arc::new(DirectoryStorage::new(&bucket)))
            .run(),
    )
    .await;

    assert_eq!(outcome.exit_code, 0);
    assert_eq!(outcome.classification, Classification::Success);
    assert!(!log_dir.join("error.json").exists());

    let header = fs::read_to_string(log_dir.join("memory.csv")).unwrap();
    assert!(header.starts_with("timestamp,rss_mb,vms_mb,pct"));

    let uploaded = bucket.join("wdi/logs/r1");
    assert_eq!(
        fs::read_to_string(uploaded.join("nodes/ingest.log")).unwrap(),
        "ok\n"
    );
    assert!(uploaded.join("memory.csv").exists());
}

#[tokio::test]
async fn failing_child_gets_error_summary_and_exit_code_preserved() {
    init_tracing();
    let tmp = tempfile::tempdir().unwrap();
    let log_dir = tmp.path().join("logs/r1");

    let outcome = with_timeout(Supervisor::new(options(&log_dir, "exit 3")).run()).await;

    assert_eq!(outcome.exit_code, 3);
    assert_eq!(outcome.classification, Classification::Error);
    let summary = read_summary(&log_dir);
    assert_eq!(summary.exit_code, 3);
    assert_eq!(summary.error_type, "Error");
    assert_eq!(summary.message, "Process exited with code 3");
    assert_eq!(summary.run_id, "r1");
}

#[tokio::test]
async fn child_killed_by_sigkill_is_classified_as_oom() {
    init_tracing();
    let tmp = tempfile::tempdir().unwrap();
    let log_dir = tmp.path().join("logs/r1");

    let outcome = with_timeout(Supervisor::new(options(&log_dir, "kill -9 $$")).run()).await;

    assert_eq!(outcome.exit_code, 137);
    assert_eq!(outcome.classification, Classification::OomKilled);
    assert_eq!(read_summary(&log_dir).error_type, "OOM");
}

#[tokio::test]
async fn unstartable_command_exits_127() {
    init_tracing();
    let tmp = tempfile::tempdir().unwrap();
    let log_dir = tmp.path().join("logs/r1");
    let mut opts = options(&log_dir, "");
    opts.command = vec!["/definitely/not/a/program".into()];

    let outcome = with_timeout(Supervisor::new(opts).run()).await;

    assert_eq!(outcome.exit_code, 127);
    assert_eq!(read_summary(&log_dir).message, "Process exited with code 127");
}

#[tokio::test]
async fn sigterm_within_grace_period_gives_143() {
    init_tracing();
    let mut child = Command::new("sleep")
        .arg("30")
        .stdout(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .unwrap();

    let status = with_timeout(terminate_gracefully(&mut child, Duration::from_secs(5)))
        .await
        .unwrap();

    assert_eq!(rundag::supervisor::exit_code_of(status), 143);
}

#[tokio::test]
async fn child_ignoring_sigterm_is_killed_after_grace_period() {
    init_tracing();
    let mut child = Command::new("sh")
        .args(["-c", "trap '' TERM; while true; do sleep 1; done"])
        .kill_on_drop(true)
        .spawn()
        .unwrap();
    // Let the shell install its trap.
    tokio::time::sleep(Duration::from_millis(300)).await;

    let status = with_timeout(terminate_gracefully(&mut child, Duration::from_millis(300)))
        .await
        .unwrap();

    assert_eq!(rundag::supervisor::exit_code_of(status), 137);
}

#[derive(Clone, Default)]
struct SharedBuf(Arc<Mutex<Vec<u8>>>);

impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[test]
fn profiler_keeps_sampling_while_processes_come_and_go() {
    init_tracing();
    let table = FakeProcessTable::new(vec![
        Frame::new().process(1, None, 10).process(2, Some(1), 5),
        Frame::new().process(1, None, 10),
        Frame::new(),
        Frame::new().process(1, None, 12),
    ]);
    let buf = SharedBuf::default();

    let profiler = MemoryProfiler::start(
        Box::new(table),
        1,
        MemoryLog::new(buf.clone()).unwrap(),
        Duration::from_millis(5),
        Duration::from_secs(2),
    )
    .unwrap();
    thread::sleep(Duration::from_millis(100));
    let summary = profiler.stop().unwrap();

    let csv = String::from_utf8(buf.0.lock().unwrap().clone()).unwrap();
    let rows: Vec<&str> = csv.lines().skip(1).collect();

    assert!(rows.len() >= 3, "{csv}");
    assert!(rows[0].contains(",15.0,30.0,"), "{}", rows[0]);
    assert!(rows[1].contains(",10.0,20.0,"), "{}", rows[1]);
    // The empty frame produced no row; sampling resumed afterwards.
    assert!(rows[2].contains(",12.0,24.0,"), "{}", rows[2]);
    assert_eq!(summary.samples as usize, rows.len());
    assert_eq!(summary.peak_rss_bytes, 15 * 1024 * 1024);
}

/// `rundag` binary with a config rooting local logs at `log_root`.
fn rundag_command(work: &Path, log_root: &Path, run_id: &str, script: &str) -> std::process::Command {
    let config = work.join("Rundag.toml");
    fs::write(
        &config,
        format!(
            "[supervisor]\nsample_interval_ms = 20\nlocal_log_root = {:?}\n",
            log_root.display().to_string()
        ),
    )
    .unwrap();

    let mut cmd = std::process::Command::new(env!("CARGO_BIN_EXE_rundag"));
    cmd.args(["--run-id", run_id, "--config"])
        .arg(&config)
        .args(["--", "sh", "-c", script])
        .env_remove("CI")
        .env_remove("RUN_ID")
        .env_remove("RUNDAG_STORAGE_DIR");
    cmd
}

#[test]
fn supervisor_binary_propagates_exit_code_and_writes_logs() {
    let tmp = tempfile::tempdir().unwrap();
    let log_root = tmp.path().join("logs");

    let status = rundag_command(tmp.path(), &log_root, "bin-run", "exit 4")
        .status()
        .unwrap();

    assert_eq!(status.code(), Some(4));
    let log_dir = log_root.join("bin-run");
    let summary = read_summary(&log_dir);
    assert_eq!(summary.exit_code, 4);
    assert_eq!(summary.run_id, "bin-run");
    let csv = fs::read_to_string(log_dir.join("memory.csv")).unwrap();
    assert!(csv.starts_with("timestamp,rss_mb,vms_mb,pct\n"));
}

#[test]
fn cloud_mode_resolves_storage_and_log_root_from_config() {
    use clap::Parser;
    use rundag::cli::SupervisorArgs;
    use rundag::config::EnvConfig;
    use rundag_test_utils::builders::ConfigFileBuilder;

    let config = ConfigFileBuilder::new()
        .sample_interval_ms(50)
        .grace_period_secs(3)
        .log_roots("local-logs", "/var/run/logs")
        .storage_dir("/mnt/bucket")
        .build();
    let env = EnvConfig::from_lookup(|key| match key {
        "CI" => Some("TRUE".to_string()),
        "CONNECTOR_NAME" => Some("wdi".to_string()),
        _ => None,
    });
    let args = SupervisorArgs::try_parse_from(["rundag", "--run-id", "r9", "--", "pipe"]).unwrap();

    let opts = SupervisorOptions::resolve(&args, &config, &env);

    assert_eq!(opts.mode, ExecutionMode::Cloud);
    assert_eq!(opts.log_dir, Path::new("/var/run/logs/r9"));
    assert_eq!(opts.storage_dir.as_deref(), Some(Path::new("/mnt/bucket")));
    assert_eq!(opts.sample_interval, Duration::from_millis(50));
    assert_eq!(opts.grace_period, Duration::from_secs(3));
}

#[test]
fn sigterm_to_supervisor_is_forwarded_to_the_pipeline() {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;
    use std::time::Instant;

    let tmp = tempfile::tempdir().unwrap();
    let log_root = tmp.path().join("logs");
    let log_dir = log_root.join("term-run");
    let started = log_dir.join("started");

    let mut supervisor = rundag_command(
        tmp.path(),
        &log_root,
        "term-run",
        r#"touch "$LOG_DIR/started"; exec sleep 30"#,
    )
    .spawn()
    .unwrap();

    // Signal as soon as the pipeline is up, while the profiler may still be
    // starting.
    let deadline = Instant::now() + Duration::from_secs(10);
    while !started.exists() {
        assert!(Instant::now() < deadline, "pipeline never started");
        thread::sleep(Duration::from_millis(5));
    }
    kill(Pid::from_raw(supervisor.id() as i32), Signal::SIGTERM).unwrap();

    let status = supervisor.wait().unwrap();
    assert_eq!(status.code(), Some(143));

    let summary = read_summary(&log_dir);
    assert_eq!(summary.exit_code, 143);
    assert_eq!(summary.error_type, "SIGTERM");
    assert_eq!(summary.message, "Process terminated by signal");
    assert_eq!(summary.run_id, "term-run");
}
