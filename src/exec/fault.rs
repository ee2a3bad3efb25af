// src/exec/fault.rs

//! Containment of node failures.
//!
//! Node logic may fail by returning an error or by panicking. Both are turned
//! into a [`NodeFault`] carrying a one-line message and a detailed trace, and
//! neither escapes into the engine.

use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::{Cell, RefCell};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Once;

thread_local! {
    static CAPTURING: Cell<bool> = const { Cell::new(false) };
    static LAST_PANIC_TRACE: RefCell<Option<String>> = const { RefCell::new(None) };
}

static HOOK: Once = Once::new();

/// A node's failure as recorded in its task state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeFault {
    pub message: String,
    pub detail: String,
}

/// Run node logic, converting errors and panics into a [`NodeFault`].
pub fn run_guarded<F>(f: F) -> Result<(), NodeFault>
where
    F: FnOnce() -> anyhow::Result<()>,
{
    install_panic_hook();

    CAPTURING.with(|c| c.set(true));
    let outcome = panic::catch_unwind(AssertUnwindSafe(f));
    CAPTURING.with(|c| c.set(false));

    match outcome {
        Ok(Ok(())) => Ok(()),
        Ok(Err(err)) => Err(NodeFault {
            message: format!("{err:#}"),
            detail: format!("{err:?}"),
        }),
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            let detail = LAST_PANIC_TRACE
                .with(|t| t.borrow_mut().take())
                .unwrap_or_else(|| format!("panic: {message}"));
            Err(NodeFault { message, detail })
        }
    }
}

/// Chain a panic hook that stores a backtrace for guarded panics.
///
/// Panics outside [`run_guarded`] still reach the previous hook unchanged.
fn install_panic_hook() {
    HOOK.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            if CAPTURING.with(|c| c.get()) {
                let trace = Backtrace::force_capture();
                LAST_PANIC_TRACE.with(|t| *t.borrow_mut() = Some(format!("{info}\n{trace}")));
            } else {
                previous(info);
            }
        }));
    });
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "node panicked with a non-string payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn ok_passes_through() {
        assert_eq!(run_guarded(|| Ok(())), Ok(()));
    }

    #[test]
    fn error_chain_is_kept() {
        let fault = run_guarded(|| {
            Err(anyhow::anyhow!("file missing")).context("loading raw asset 'wdi'")
        })
        .unwrap_err();

        assert_eq!(fault.message, "loading raw asset 'wdi': file missing");
        assert!(fault.detail.contains("Caused by"));
    }

    #[test]
    fn panic_is_contained_with_trace() {
        let fault = run_guarded(|| panic!("index out of range")).unwrap_err();
        assert_eq!(fault.message, "index out of range");
        assert!(fault.detail.contains("index out of range"));

        let fault = run_guarded(|| {
            let n = 7;
            panic!("bad row {n}")
        })
        .unwrap_err();
        assert_eq!(fault.message, "bad row 7");
    }
}
