//! Call frames extracted from `std::backtrace::Backtrace`.
//!
//! Backtraces list the innermost frame first. Everything returned from this
//! module is ordered outermost first, the way a traceback reads.

use crate::report::simplify_path;
use std::backtrace::{Backtrace, BacktraceStatus};
use std::fmt;

/// Name of the function that runs the target under `catch_unwind`.
/// Frames at or beyond it belong to the wrapper, not to the failure.
pub(super) const BOUNDARY_MARKER: &str = "capture_boundary";

/// One resolved stack frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub symbol: String,
    /// `file:line:column`, when debug info is available
    pub location: Option<String>,
}

impl Frame {
    pub fn new(symbol: impl Into<String>, location: Option<String>) -> Self {
        Frame {
            symbol: symbol.into(),
            location,
        }
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.location {
            Some(location) => write!(
                f,
                "  at {} ({})",
                format_function(&self.symbol),
                simplify_path(location)
            ),
            None => write!(f, "  at {}", format_function(&self.symbol)),
        }
    }
}

/// Parse the `Display` output of a captured backtrace, innermost first
pub fn parse_backtrace(text: &str) -> Vec<Frame> {
    let mut frames: Vec<Frame> = Vec::new();

    for line in text.lines() {
        let line = line.trim();
        if let Some(location) = line.strip_prefix("at ") {
            if let Some(frame) = frames.last_mut()
                && frame.location.is_none()
            {
                frame.location = Some(location.to_string());
            }
            continue;
        }

        if let Some((index, symbol)) = line.split_once(": ")
            && !index.is_empty()
            && index.chars().all(|c| c.is_ascii_digit())
        {
            frames.push(Frame::new(symbol.trim(), None));
        }
    }

    frames
}

fn captured_frames(backtrace: &Backtrace) -> Vec<Frame> {
    if backtrace.status() != BacktraceStatus::Captured {
        return Vec::new();
    }
    parse_backtrace(&backtrace.to_string())
}

/// Frames of the calling thread above the wrapper, outermost first
pub fn static_context(backtrace: &Backtrace) -> Vec<Frame> {
    let mut frames = captured_frames(backtrace);
    trim_context(&mut frames);
    frames.reverse();
    frames
}

/// Frames between the failure site and the catch point, outermost first
pub fn propagation(backtrace: &Backtrace) -> Vec<Frame> {
    let mut frames = captured_frames(backtrace);
    trim_propagation(&mut frames);
    frames.reverse();
    frames
}

fn trim_context(frames: &mut Vec<Frame>) {
    let start = frames
        .iter()
        .position(|f| !is_wrapper_frame(&f.symbol) && !is_runtime_frame(&f.symbol))
        .unwrap_or(frames.len());
    frames.drain(..start);

    if let Some(end) = frames
        .iter()
        .position(|f| f.symbol.contains("__rust_begin_short_backtrace"))
    {
        frames.truncate(end);
    }
}

fn trim_propagation(frames: &mut Vec<Frame>) {
    if let Some(end) = frames
        .iter()
        .position(|f| is_catch_frame(&f.symbol) || f.symbol.contains(BOUNDARY_MARKER))
    {
        frames.truncate(end);
    }

    // The hook and the unwinder sit above the panic entry point
    if let Some(entry) = frames.iter().rposition(|f| is_panic_entry(&f.symbol)) {
        frames.drain(..=entry);
    }

    frames.retain(|f| {
        !is_runtime_frame(&f.symbol) && !is_wrapper_frame(&f.symbol) && !is_shim_frame(&f.symbol)
    });
}

/// Frames belonging to the crash-capture machinery itself
fn is_wrapper_frame(symbol: &str) -> bool {
    symbol.starts_with("callwrap::crash::") && !symbol.starts_with("callwrap::crash::tests")
}

/// Backtrace, panic and error-construction machinery
fn is_runtime_frame(symbol: &str) -> bool {
    const PREFIXES: &[&str] = &[
        "std::backtrace",
        "std::panicking",
        "std::panic::",
        "std::sys::backtrace",
        "core::panicking",
        "core::result::unwrap_failed",
        "core::option::unwrap_failed",
        "core::option::expect_failed",
        "rust_begin_unwind",
        "__rustc::rust_begin_unwind",
        "<alloc::boxed::Box<F,A> as core::ops::function::Fn",
        "anyhow::",
        "<anyhow::",
        "<T as core::convert::Into",
        "<core::result::Result<T,F> as core::ops::try_trait::FromResidual",
    ];
    PREFIXES.iter().any(|p| symbol.starts_with(p)) || symbol.contains("PanicHookInfo")
}

/// Where user code hands over to the panic runtime
fn is_panic_entry(symbol: &str) -> bool {
    symbol.starts_with("core::panicking::")
        || symbol.starts_with("std::panicking::begin_panic")
        || symbol.starts_with("std::rt::panic")
        || symbol == "rust_begin_unwind"
        || symbol == "__rustc::rust_begin_unwind"
        || symbol.starts_with("core::result::unwrap_failed")
        || symbol.starts_with("core::option::unwrap_failed")
        || symbol.starts_with("core::option::expect_failed")
}

fn is_catch_frame(symbol: &str) -> bool {
    symbol.starts_with("std::panicking::try")
        || symbol.starts_with("std::panicking::catch_unwind")
        || symbol.starts_with("std::panic::catch_unwind")
        || symbol == "__rust_try"
}

/// Call-operator glue between the wrapper and the target
fn is_shim_frame(symbol: &str) -> bool {
    symbol.starts_with("<core::panic::unwind_safe::AssertUnwindSafe<F> as core::ops::function::FnOnce")
}

/// Strip the hash suffix (e.g., "::h1234567890abcdef")
fn format_function(func: &str) -> &str {
    if let Some(idx) = func.rfind("::h") {
        let suffix = &func[idx + 3..];
        if suffix.len() == 16 && suffix.chars().all(|c| c.is_ascii_hexdigit()) {
            return &func[..idx];
        }
    }
    func
}

#[cfg(test)]
mod tests {
    use super::*;

    const PANIC_TRACE: &str = "\
   0: std::backtrace::Backtrace::force_capture
             at /rustc/abc/library/std/src/backtrace.rs:296:9
   1: callwrap::crash::hook::install::{{closure}}
             at ./src/crash/hook.rs:40:31
   2: <alloc::boxed::Box<dyn for<'a, 'b> core::ops::function::Fn<(&'a std::panic::PanicHookInfo<'b>,), Output = ()> + core::marker::Send + core::marker::Sync> as core::ops::function::Fn<(&std::panic::PanicHookInfo,)>>::call
             at /rustc/abc/library/alloc/src/boxed.rs:2220:9
   3: std::panicking::panic_with_hook
             at /rustc/abc/library/std/src/panicking.rs:833:13
   4: std::panicking::panic_handler::{closure#0}
             at /rustc/abc/library/std/src/panicking.rs:691:13
   5: std::sys::backtrace::__rust_end_short_backtrace::<std::panicking::panic_handler::{closure#0}, !>
             at /rustc/abc/library/std/src/sys/backtrace.rs:174:18
   6: __rustc::rust_begin_unwind
             at /rustc/abc/library/std/src/panicking.rs:689:5
   7: core::panicking::panic_fmt
             at /rustc/abc/library/core/src/panicking.rs:80:14
   8: core::panicking::panic_const::panic_const_div_by_zero
             at /rustc/abc/library/core/src/panicking.rs:175:17
   9: demo::divide
             at ./src/main.rs:12:5
  10: demo::main::{closure#0}
             at ./src/main.rs:20:30
  11: <core::panic::unwind_safe::AssertUnwindSafe<F> as core::ops::function::FnOnce<()>>::call_once
             at /rustc/abc/library/core/src/panic/unwind_safe.rs:272:9
  12: std::panicking::catch_unwind::do_call::<core::panic::unwind_safe::AssertUnwindSafe<F>, i32>
             at /rustc/abc/library/std/src/panicking.rs:581:40
  13: __rust_try
  14: std::panicking::catch_unwind::<i32, core::panic::unwind_safe::AssertUnwindSafe<F>>
             at /rustc/abc/library/std/src/panicking.rs:544:19
  15: std::panic::catch_unwind::<core::panic::unwind_safe::AssertUnwindSafe<F>, i32>
             at /rustc/abc/library/std/src/panic.rs:359:14
  16: callwrap::crash::capture_boundary::<F, i32>
             at ./src/crash/mod.rs:200:5
  17: demo::main
             at ./src/main.rs:20:5
";

    const UNWRAP_TRACE: &str = "\
   0: std::backtrace::Backtrace::force_capture
   1: callwrap::crash::hook::install::{{closure}}
   2: std::panicking::panic_with_hook
   3: std::panicking::panic_handler::{closure#0}
   4: std::sys::backtrace::__rust_end_short_backtrace::<std::panicking::panic_handler::{closure#0}, !>
   5: __rustc::rust_begin_unwind
   6: core::panicking::panic_fmt
   7: core::result::unwrap_failed
   8: core::result::Result<T,E>::unwrap
   9: demo::parse_port
  10: std::panicking::catch_unwind::do_call
  11: callwrap::crash::capture_boundary
";

    const CONTEXT_TRACE: &str = "\
   0: callwrap::crash::CrashCapture::capture
             at ./src/crash/mod.rs:120:25
   1: callwrap::crash::CrashCapture::wrap::{{closure}}
             at ./src/crash/mod.rs:90:24
   2: demo::run_scenario
             at ./src/main.rs:30:9
   3: demo::main
             at ./src/main.rs:10:5
   4: core::ops::function::FnOnce::call_once
             at /rustc/abc/library/core/src/ops/function.rs:250:5
   5: std::sys::backtrace::__rust_begin_short_backtrace
             at /rustc/abc/library/std/src/sys/backtrace.rs:152:18
   6: std::rt::lang_start
   7: main
";

    #[test]
    fn test_parse_frames_with_and_without_locations() {
        let frames = parse_backtrace(CONTEXT_TRACE);
        assert_eq!(frames.len(), 8);
        assert_eq!(frames[2].symbol, "demo::run_scenario");
        assert_eq!(frames[2].location.as_deref(), Some("./src/main.rs:30:9"));
        assert_eq!(frames[6].location, None);
    }

    #[test]
    fn test_context_drops_wrapper_and_runtime_frames() {
        let mut frames = parse_backtrace(CONTEXT_TRACE);
        trim_context(&mut frames);
        frames.reverse();

        let symbols: Vec<_> = frames.iter().map(|f| f.symbol.as_str()).collect();
        assert_eq!(
            symbols,
            ["core::ops::function::FnOnce::call_once", "demo::main", "demo::run_scenario"]
        );
    }

    #[test]
    fn test_propagation_stops_at_catch_point() {
        let mut frames = parse_backtrace(PANIC_TRACE);
        trim_propagation(&mut frames);
        frames.reverse();

        let symbols: Vec<_> = frames.iter().map(|f| f.symbol.as_str()).collect();
        assert_eq!(symbols, ["demo::main::{closure#0}", "demo::divide"]);
    }

    #[test]
    fn test_propagation_drops_panic_runtime_after_unwrap() {
        let mut frames = parse_backtrace(UNWRAP_TRACE);
        trim_propagation(&mut frames);
        frames.reverse();

        let symbols: Vec<_> = frames.iter().map(|f| f.symbol.as_str()).collect();
        assert_eq!(
            symbols,
            ["demo::parse_port", "core::result::Result<T,E>::unwrap"]
        );
    }

    #[test]
    fn test_frame_display() {
        let frame = Frame::new(
            "demo::divide::h0123456789abcdef",
            Some("./src/main.rs:12:5".to_string()),
        );
        assert_eq!(frame.to_string(), "  at demo::divide (src/main.rs:12:5)");
        assert_eq!(Frame::new("main", None).to_string(), "  at main");
    }

    #[test]
    fn test_disabled_backtrace_has_no_frames() {
        assert!(static_context(&Backtrace::disabled()).is_empty());
        assert!(propagation(&Backtrace::disabled()).is_empty());
    }
}
