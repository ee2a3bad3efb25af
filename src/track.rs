// src/track.rs

//! I/O tracking context.
//!
//! While a node runs, the engine binds an [`IoRecord`] to the current thread.
//! Any code the node calls, however deep, can then report the assets it
//! touched with [`track_read`] / [`track_write`] without the node having to
//! thread a handle through its helpers. Outside a binding both calls are
//! no-ops, so IO helpers can track unconditionally.
//!
//! The binding is thread-local: node code that hands work to other threads
//! must report from the node's own thread.

use std::cell::RefCell;

use serde::{Deserialize, Serialize};

thread_local! {
    static CURRENT: RefCell<Option<IoRecord>> = const { RefCell::new(None) };
}

/// Reads and writes reported by one node execution.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IoRecord {
    pub reads: Vec<String>,
    pub writes: Vec<String>,
    pub rows_written: u64,
}

/// Record that the running node read `asset`.
pub fn track_read(asset: &str) {
    CURRENT.with(|cell| {
        if let Some(record) = cell.borrow_mut().as_mut() {
            record.reads.push(asset.to_string());
        }
    });
}

/// Record that the running node wrote `asset`, optionally with a row count.
///
/// Row counts accumulate across writes; zero or `None` adds nothing.
pub fn track_write(asset: &str, rows: Option<u64>) {
    CURRENT.with(|cell| {
        if let Some(record) = cell.borrow_mut().as_mut() {
            record.writes.push(asset.to_string());
            if let Some(rows) = rows.filter(|r| *r > 0) {
                record.rows_written += rows;
            }
        }
    });
}

/// Whether a node is currently bound on this thread.
pub fn is_bound() -> bool {
    CURRENT.with(|cell| cell.borrow().is_some())
}

/// Binding of a fresh [`IoRecord`] to the current thread.
///
/// Dropping the scope clears the binding, including during unwinding, so a
/// panicking node never leaks its record into the next one.
#[derive(Debug)]
pub struct TrackingScope {
    _not_send: std::marker::PhantomData<*const ()>,
}

impl TrackingScope {
    /// Bind an empty record, replacing any previous binding.
    pub fn bind() -> Self {
        CURRENT.with(|cell| *cell.borrow_mut() = Some(IoRecord::default()));
        Self {
            _not_send: std::marker::PhantomData,
        }
    }

    /// Clear the binding and return what was recorded.
    pub fn finish(self) -> IoRecord {
        CURRENT
            .with(|cell| cell.borrow_mut().take())
            .unwrap_or_default()
    }
}

impl Drop for TrackingScope {
    fn drop(&mut self) {
        CURRENT.with(|cell| cell.borrow_mut().take());
    }
}
