//! Panic hook recording the unwind trace of captured panics.
//!
//! The hook is installed once per process and chains to whatever hook was
//! set before it. It only intercepts panics on threads that are currently
//! inside a capture; every other panic reaches the previous hook unchanged.

use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::{Cell, RefCell};
use std::panic;
use std::sync::Once;

/// What the hook saw when a captured panic started
#[derive(Debug)]
pub struct PanicRecord {
    pub message: String,
    pub location: Option<String>,
    pub backtrace: Backtrace,
}

thread_local! {
    static CAPTURE_DEPTH: Cell<usize> = const { Cell::new(0) };
    static LAST_PANIC: RefCell<Option<PanicRecord>> = const { RefCell::new(None) };
}

static INSTALL: Once = Once::new();

pub fn install() {
    INSTALL.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            if CAPTURE_DEPTH.with(Cell::get) == 0 {
                previous(info);
                return;
            }

            let record = PanicRecord {
                message: payload_message(info.payload()),
                location: info.location().map(|l| l.to_string()),
                backtrace: Backtrace::force_capture(),
            };
            LAST_PANIC.with(|slot| *slot.borrow_mut() = Some(record));
        }));
        tracing::debug!("crash capture panic hook installed");
    });
}

/// Marks the current thread as capturing for as long as it lives
pub struct CaptureScope {
    _private: (),
}

impl CaptureScope {
    pub fn enter() -> Self {
        CAPTURE_DEPTH.with(|depth| depth.set(depth.get() + 1));
        LAST_PANIC.with(|slot| slot.borrow_mut().take());
        CaptureScope { _private: () }
    }
}

impl Drop for CaptureScope {
    fn drop(&mut self) {
        CAPTURE_DEPTH.with(|depth| depth.set(depth.get().saturating_sub(1)));
    }
}

/// Take the record of the most recent captured panic on this thread
pub fn take_last() -> Option<PanicRecord> {
    LAST_PANIC.with(|slot| slot.borrow_mut().take())
}

/// Best-effort text of a panic payload
pub fn payload_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Box<dyn Any>".to_string()
    }
}
