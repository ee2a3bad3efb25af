use std::collections::HashMap;

use rundag::supervisor::profiler::{ProcessMemory, ProcessTable};

/// One state of the fake process table.
#[derive(Debug, Clone, Default)]
pub struct Frame {
    processes: HashMap<u32, (Option<u32>, ProcessMemory)>,
}

impl Frame {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `pid` (child of `parent`) using `rss_mib` resident memory.
    pub fn process(mut self, pid: u32, parent: Option<u32>, rss_mib: u64) -> Self {
        let rss_bytes = rss_mib * 1024 * 1024;
        self.processes.insert(
            pid,
            (
                parent,
                ProcessMemory {
                    rss_bytes,
                    vms_bytes: rss_bytes * 2,
                },
            ),
        );
        self
    }
}

/// A scripted process table. Every `refresh` moves to the next frame; the
/// last frame repeats forever.
#[derive(Debug, Clone)]
pub struct FakeProcessTable {
    frames: Vec<Frame>,
    current: Option<usize>,
    total_memory: u64,
}

impl FakeProcessTable {
    pub fn new(frames: Vec<Frame>) -> Self {
        Self {
            frames,
            current: None,
            total_memory: 8 * 1024 * 1024 * 1024,
        }
    }

    fn frame(&self) -> Option<&Frame> {
        self.current.and_then(|i| self.frames.get(i))
    }
}

impl ProcessTable for FakeProcessTable {
    fn refresh(&mut self) {
        let next = self.current.map_or(0, |i| i + 1);
        if next < self.frames.len() {
            self.current = Some(next);
        }
    }

    fn total_memory(&self) -> u64 {
        self.total_memory
    }

    fn memory_of(&self, pid: u32) -> Option<ProcessMemory> {
        self.frame()?.processes.get(&pid).map(|(_, mem)| *mem)
    }

    fn children_of(&self, pid: u32) -> Vec<u32> {
        let Some(frame) = self.frame() else {
            return Vec::new();
        };
        let mut children: Vec<u32> = frame
            .processes
            .iter()
            .filter(|(_, (parent, _))| *parent == Some(pid))
            .map(|(child, _)| *child)
            .collect();
        children.sort_unstable();
        children
    }
}
