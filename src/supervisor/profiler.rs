// src/supervisor/profiler.rs

//! Background memory sampling of the supervised process tree.
//!
//! Every interval the profiler refreshes the process table, sums memory over
//! the root process and all of its live descendants, and appends one row to
//! `memory.csv`. It runs on a plain OS thread so sampling keeps going while
//! the async side is blocked waiting on the child.

use std::collections::HashSet;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use chrono::{DateTime, Local, SecondsFormat};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use sysinfo::{Pid, ProcessesToUpdate, System};
use tracing::{debug, warn};

pub const MEMORY_LOG_FILE: &str = "memory.csv";
const MEMORY_LOG_HEADER: &str = "timestamp,rss_mb,vms_mb,pct";

/// Memory figures of a single process, in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProcessMemory {
    pub rss_bytes: u64,
    pub vms_bytes: u64,
}

/// Read access to the OS process table.
pub trait ProcessTable: Send {
    /// Re-read memory figures and the parent/child relation.
    fn refresh(&mut self);

    /// Physical memory of the machine, in bytes.
    fn total_memory(&self) -> u64;

    /// `None` once the process has exited.
    fn memory_of(&self, pid: u32) -> Option<ProcessMemory>;

    /// Direct children of `pid`.
    fn children_of(&self, pid: u32) -> Vec<u32>;
}

/// [`ProcessTable`] backed by `sysinfo`.
pub struct SysinfoProcessTable {
    system: System,
}

impl SysinfoProcessTable {
    pub fn new() -> Self {
        let mut table = Self {
            system: System::new(),
        };
        table.refresh();
        table
    }
}

impl Default for SysinfoProcessTable {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessTable for SysinfoProcessTable {
    fn refresh(&mut self) {
        self.system.refresh_memory();
        self.system.refresh_processes(ProcessesToUpdate::All, true);
    }

    fn total_memory(&self) -> u64 {
        self.system.total_memory()
    }

    fn memory_of(&self, pid: u32) -> Option<ProcessMemory> {
        let process = self.system.process(Pid::from_u32(pid))?;
        Some(ProcessMemory {
            rss_bytes: process.memory(),
            vms_bytes: process.virtual_memory(),
        })
    }

    fn children_of(&self, pid: u32) -> Vec<u32> {
        let parent = Pid::from_u32(pid);
        // Threads show up as processes on Linux; only count real children.
        self.system
            .processes()
            .iter()
            .filter(|(_, p)| p.parent() == Some(parent) && p.thread_kind().is_none())
            .map(|(child, _)| child.as_u32())
            .collect()
    }
}

/// Memory of a process tree at one point in time.
#[derive(Debug, Clone, PartialEq)]
pub struct MemorySample {
    pub timestamp: DateTime<Local>,
    pub rss_bytes: u64,
    pub vms_bytes: u64,
    /// Share of physical memory, summed over the tree.
    pub percent: f64,
}

impl MemorySample {
    /// `memory.csv` row, sizes in MiB.
    pub fn csv_row(&self) -> String {
        format!(
            "{},{:.1},{:.1},{:.1}",
            self.timestamp.to_rfc3339_opts(SecondsFormat::Micros, false),
            mib(self.rss_bytes),
            mib(self.vms_bytes),
            self.percent
        )
    }
}

fn mib(bytes: u64) -> f64 {
    bytes as f64 / (1024.0 * 1024.0)
}

/// Sum memory over `root` and all live descendants.
///
/// Returns `None` if `root` itself is gone. Descendants that vanish between
/// listing and reading are left out.
pub fn sample_tree(table: &dyn ProcessTable, root: u32) -> Option<MemorySample> {
    let root_mem = table.memory_of(root)?;

    let mut rss = root_mem.rss_bytes;
    let mut vms = root_mem.vms_bytes;
    let mut seen: HashSet<u32> = HashSet::from([root]);
    let mut stack = table.children_of(root);

    while let Some(pid) = stack.pop() {
        if !seen.insert(pid) {
            continue;
        }
        if let Some(mem) = table.memory_of(pid) {
            rss += mem.rss_bytes;
            vms += mem.vms_bytes;
        }
        stack.extend(table.children_of(pid));
    }

    let total = table.total_memory();
    let percent = if total == 0 {
        0.0
    } else {
        rss as f64 / total as f64 * 100.0
    };

    Some(MemorySample {
        timestamp: Local::now(),
        rss_bytes: rss,
        vms_bytes: vms,
        percent,
    })
}

/// CSV time series of [`MemorySample`]s.
#[derive(Debug)]
pub struct MemoryLog<W: Write> {
    writer: W,
}

impl MemoryLog<BufWriter<File>> {
    /// Create `<log_dir>/memory.csv`, truncating any previous file.
    pub fn create(log_dir: &Path) -> io::Result<Self> {
        let file = File::create(log_dir.join(MEMORY_LOG_FILE))?;
        Self::new(BufWriter::new(file))
    }
}

impl<W: Write> MemoryLog<W> {
    /// Wrap `writer` and write the header.
    pub fn new(mut writer: W) -> io::Result<Self> {
        writeln!(writer, "{MEMORY_LOG_HEADER}")?;
        writer.flush()?;
        Ok(Self { writer })
    }

    pub fn append(&mut self, sample: &MemorySample) -> io::Result<()> {
        writeln!(self.writer, "{}", sample.csv_row())?;
        self.writer.flush()
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

/// What the profiler saw over its lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProfileSummary {
    pub samples: u64,
    pub peak_rss_bytes: u64,
}

/// Handle to the sampling thread.
pub struct MemoryProfiler {
    stop_tx: Option<Sender<()>>,
    done_rx: Receiver<ProfileSummary>,
    handle: Option<JoinHandle<()>>,
    join_timeout: Duration,
}

impl MemoryProfiler {
    /// Start sampling `pid` every `interval`.
    pub fn start<W>(
        mut table: Box<dyn ProcessTable>,
        pid: u32,
        mut log: MemoryLog<W>,
        interval: Duration,
        join_timeout: Duration,
    ) -> io::Result<Self>
    where
        W: Write + Send + 'static,
    {
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let (done_tx, done_rx) = bounded::<ProfileSummary>(1);

        let handle = thread::Builder::new()
            .name("rundag-profiler".to_string())
            .spawn(move || {
                let mut summary = ProfileSummary::default();
                let mut write_failed = false;

                loop {
                    table.refresh();
                    if let Some(sample) = sample_tree(table.as_ref(), pid) {
                        summary.samples += 1;
                        summary.peak_rss_bytes = summary.peak_rss_bytes.max(sample.rss_bytes);
                        if let Err(e) = log.append(&sample) {
                            if !write_failed {
                                warn!(error = %e, "failed to append memory sample");
                                write_failed = true;
                            }
                        }
                    }

                    match stop_rx.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => continue,
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }

                debug!(samples = summary.samples, "profiler stopped");
                let _ = done_tx.send(summary);
            })?;

        debug!(pid, interval_ms = interval.as_millis() as u64, "profiler started");

        Ok(Self {
            stop_tx: Some(stop_tx),
            done_rx,
            handle: Some(handle),
            join_timeout,
        })
    }

    /// Stop sampling and wait for the thread, at most `join_timeout`.
    ///
    /// Returns `None` if the thread did not finish in time; it is then left
    /// to finish on its own.
    pub fn stop(mut self) -> Option<ProfileSummary> {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.try_send(());
        }

        match self.done_rx.recv_timeout(self.join_timeout) {
            Ok(summary) => {
                if let Some(handle) = self.handle.take() {
                    let _ = handle.join();
                }
                Some(summary)
            }
            Err(_) => {
                warn!(
                    timeout_ms = self.join_timeout.as_millis() as u64,
                    "profiler thread did not stop in time; detaching"
                );
                self.handle.take();
                None
            }
        }
    }
}

impl Drop for MemoryProfiler {
    fn drop(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.try_send(());
        }
    }
}
