//! Crash capture for high-risk code paths.
//!
//! A call wrapped by [`CrashCapture`] never unwinds into its caller. When the
//! target panics (or, for [`CrashCapture::wrap_result`], returns an error),
//! the full traceback goes to the host log sink one line at a time, the host
//! warning surface gets a single generic notice, and the call yields `None`.
//! Program state touched by the failed call is not repaired.

mod diagnostic;
mod frames;
mod hook;

pub use diagnostic::{Diagnostic, Failure};
pub use frames::Frame;

use crate::config::CrashConfig;
use crate::host::{LogSink, StderrWarning, TracingLog, WarningSurface};
use std::backtrace::Backtrace;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

/// Result of a captured call
#[derive(Debug)]
pub enum Outcome<R> {
    Success(R),
    /// The call failed; the diagnostic has already been reported
    Suppressed(Diagnostic),
}

impl<R> Outcome<R> {
    pub fn is_suppressed(&self) -> bool {
        matches!(self, Outcome::Suppressed(_))
    }

    pub fn diagnostic(&self) -> Option<&Diagnostic> {
        match self {
            Outcome::Suppressed(diagnostic) => Some(diagnostic),
            Outcome::Success(_) => None,
        }
    }

    pub fn into_option(self) -> Option<R> {
        match self {
            Outcome::Success(value) => Some(value),
            Outcome::Suppressed(_) => None,
        }
    }
}

/// Wraps callables so their failures are reported instead of propagated
#[derive(Clone)]
pub struct CrashCapture {
    log: Arc<dyn LogSink>,
    warning: Arc<dyn WarningSurface>,
    config: CrashConfig,
}

impl CrashCapture {
    pub fn new(log: impl LogSink + 'static, warning: impl WarningSurface + 'static) -> Self {
        CrashCapture {
            log: Arc::new(log),
            warning: Arc::new(warning),
            config: CrashConfig::default(),
        }
    }

    pub fn with_config(mut self, config: CrashConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &CrashConfig {
        &self.config
    }

    /// Wrap `f`; a panic in `f` is reported and turned into `None`
    pub fn wrap<A, R, F>(&self, f: F) -> impl Fn(A) -> Option<R> + use<A, R, F>
    where
        F: Fn(A) -> R,
    {
        let capture = self.clone();
        move |args: A| capture.capture(|| f(args)).into_option()
    }

    /// Wrap a fallible `f`; panics and `Err` results are reported and turned into `None`
    pub fn wrap_result<A, T, E, F>(&self, f: F) -> impl Fn(A) -> Option<T> + use<A, T, E, F>
    where
        F: Fn(A) -> Result<T, E>,
        E: Into<anyhow::Error>,
    {
        let capture = self.clone();
        move |args: A| capture.capture_result(|| f(args)).into_option()
    }

    /// Run `f` once, reporting a panic instead of propagating it
    pub fn capture<R>(&self, f: impl FnOnce() -> R) -> Outcome<R> {
        hook::install();
        match capture_boundary(f) {
            Ok(value) => Outcome::Success(value),
            Err(payload) => {
                let context = frames::static_context(&Backtrace::force_capture());
                let diagnostic = panic_diagnostic(context, payload.as_ref());
                self.report(&diagnostic);
                Outcome::Suppressed(diagnostic)
            }
        }
    }

    /// Run a fallible `f` once, reporting a panic or an `Err` instead of propagating it
    pub fn capture_result<T, E>(&self, f: impl FnOnce() -> Result<T, E>) -> Outcome<T>
    where
        E: Into<anyhow::Error>,
    {
        match self.capture(f) {
            Outcome::Success(Ok(value)) => Outcome::Success(value),
            Outcome::Success(Err(error)) => {
                let error: anyhow::Error = error.into();
                let context = frames::static_context(&Backtrace::force_capture());
                let diagnostic = Diagnostic::new(
                    context,
                    frames::propagation(error.backtrace()),
                    Failure::Error {
                        message: error.to_string(),
                        causes: error.chain().skip(1).map(|c| c.to_string()).collect(),
                    },
                );
                self.report(&diagnostic);
                Outcome::Suppressed(diagnostic)
            }
            Outcome::Suppressed(diagnostic) => Outcome::Suppressed(diagnostic),
        }
    }

    fn report(&self, diagnostic: &Diagnostic) {
        let lines = diagnostic.lines();
        tracing::warn!(
            context = diagnostic.context.len(),
            propagation = diagnostic.propagation.len(),
            "suppressed failure in wrapped call: {}",
            diagnostic.failure.message()
        );

        self.log.log(&self.config.intro);
        self.log.log("");
        for line in &lines {
            self.log.log(line);
        }

        self.warning.warning(&self.config.warning);
    }
}

impl Default for CrashCapture {
    /// Logs through `tracing` and warns on stderr
    fn default() -> Self {
        CrashCapture::new(TracingLog, StderrWarning)
    }
}

impl fmt::Debug for CrashCapture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CrashCapture")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Wrap `f` with a default [`CrashCapture`]
pub fn catch_errors<A, R, F>(f: F) -> impl Fn(A) -> Option<R> + use<A, R, F>
where
    F: Fn(A) -> R,
{
    CrashCapture::default().wrap(f)
}

#[inline(never)]
fn capture_boundary<R>(f: impl FnOnce() -> R) -> std::thread::Result<R> {
    let _scope = hook::CaptureScope::enter();
    let result = panic::catch_unwind(AssertUnwindSafe(f));
    if result.is_ok() {
        // panics the target caught itself are not ours to report
        hook::take_last();
    }
    result
}

fn panic_diagnostic(context: Vec<frames::Frame>, payload: &(dyn std::any::Any + Send)) -> Diagnostic {
    let message = hook::payload_message(payload);
    // `resume_unwind` skips the hook, leaving the record of an earlier caught panic
    match hook::take_last().filter(|record| record.message == message) {
        Some(record) => Diagnostic::new(
            context,
            frames::propagation(&record.backtrace),
            Failure::Panic {
                message: record.message,
                location: record.location,
            },
        ),
        // Panic raised without our hook, or resumed without running it
        None => Diagnostic::new(
            context,
            Vec::new(),
            Failure::Panic {
                message,
                location: None,
            },
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_WARNING;
    use crate::host::Recorder;

    fn recorder() -> (CrashCapture, Recorder) {
        let host = Recorder::new();
        (CrashCapture::new(host.clone(), host.clone()), host)
    }

    #[inline(never)]
    fn divide(a: i32, b: i32) -> i32 {
        a / b
    }

    #[test]
    fn test_success_passes_value_through() {
        let (capture, host) = recorder();
        let double = capture.wrap(|x: i32| x * 2);

        assert_eq!(double(21), Some(42));
        assert!(host.lines().is_empty());
        assert!(host.warnings().is_empty());
    }

    #[test]
    fn test_division_panic_is_suppressed_and_reported() {
        let (capture, host) = recorder();
        let zero = std::hint::black_box(0);
        let crash = capture.wrap(move |()| divide(1, zero));

        assert_eq!(crash(()), None);

        let lines = host.lines();
        assert_eq!(lines[0], crate::config::DEFAULT_INTRO);
        assert_eq!(lines[1], "");
        assert!(lines.len() >= 4);
        assert!(lines[2].starts_with("Traceback captured"));
        let last = lines.last().unwrap();
        assert!(last.starts_with("panicked at"));
        assert!(last.contains("divide by zero"));

        assert_eq!(host.warnings(), vec![DEFAULT_WARNING]);
    }

    #[test]
    fn test_outcome_exposes_diagnostic() {
        let (capture, host) = recorder();
        let outcome = capture.capture(|| -> u8 { panic!("bad state: {}", 7) });

        assert!(outcome.is_suppressed());
        let diagnostic = outcome.diagnostic().unwrap();
        assert_eq!(diagnostic.failure.message(), "bad state: 7");
        match &diagnostic.failure {
            Failure::Panic { location, .. } => {
                assert!(location.as_deref().unwrap().contains("crash/mod.rs"))
            }
            other => panic!("unexpected failure {other:?}"),
        }
        assert_eq!(host.warnings().len(), 1);
    }

    #[test]
    fn test_wrapper_frames_not_in_context() {
        let (capture, _host) = recorder();
        let outcome = capture.capture(|| -> u8 { panic!("boom") });
        let diagnostic = outcome.diagnostic().unwrap();

        for frame in diagnostic.context.iter().chain(&diagnostic.propagation) {
            assert!(!frame.symbol.starts_with("callwrap::crash::CrashCapture"));
            assert!(!frame.symbol.contains(frames::BOUNDARY_MARKER));
        }
    }

    #[test]
    fn test_each_failure_warns_once() {
        let (capture, host) = recorder();
        let crash = capture.wrap(|n: u32| -> u32 { panic!("failure {n}") });

        assert_eq!(crash(1), None);
        assert_eq!(crash(2), None);
        assert_eq!(host.warnings().len(), 2);

        let failures = host
            .lines()
            .iter()
            .filter(|l| l.starts_with("panicked at"))
            .count();
        assert_eq!(failures, 2);
    }

    #[test]
    fn test_wrap_result_reports_error_chain() {
        let (capture, host) = recorder();
        let load = capture.wrap_result(|path: &str| -> anyhow::Result<usize> {
            let inner = std::io::Error::new(std::io::ErrorKind::NotFound, "no such file");
            Err(anyhow::Error::new(inner).context(format!("loading {path}")))
        });

        assert_eq!(load("db.bin"), None);

        let lines = host.lines();
        assert!(lines.contains(&"error: loading db.bin".to_string()));
        assert!(lines.contains(&"caused by: no such file".to_string()));
        assert_eq!(host.warnings().len(), 1);
    }

    #[test]
    fn test_wrap_result_success() {
        let (capture, host) = recorder();
        let parse = capture.wrap_result(|s: &str| s.parse::<i64>());

        assert_eq!(parse("42"), Some(42));
        assert_eq!(parse("forty-two"), None);
        assert_eq!(host.warnings().len(), 1);
    }

    #[test]
    fn test_custom_messages() {
        let (capture, host) = recorder();
        let capture = capture.with_config(CrashConfig::default().intro("oops").warning("sorry"));
        let crash = capture.wrap(|_: ()| -> u8 { panic!("x") });

        assert_eq!(crash(()), None);
        assert_eq!(host.lines()[0], "oops");
        assert_eq!(host.warnings(), vec!["sorry"]);
    }

    #[test]
    fn test_catch_errors_with_default_host() {
        let safe_div = catch_errors(|(a, b): (i32, i32)| a / b);
        assert_eq!(safe_div((10, 2)), Some(5));
        assert_eq!(safe_div((1, std::hint::black_box(0))), None);
    }

    #[test]
    fn test_resumed_unwind_does_not_reuse_caught_panic() {
        let (capture, _host) = recorder();
        let outcome = capture.capture(|| -> u8 {
            let caught = std::panic::catch_unwind(|| -> u8 { panic!("handled inside") });
            assert!(caught.is_err());
            std::panic::resume_unwind(Box::new("resumed"))
        });

        let diagnostic = outcome.diagnostic().unwrap();
        assert_eq!(diagnostic.failure.message(), "resumed");
        match &diagnostic.failure {
            Failure::Panic { location, .. } => assert!(location.is_none()),
            other => panic!("unexpected failure {other:?}"),
        }
    }

    #[test]
    fn test_caught_panic_leaves_no_record_after_success() {
        let (capture, host) = recorder();
        let outcome = capture.capture(|| {
            std::panic::catch_unwind(|| -> u8 { panic!("handled inside") }).is_err()
        });

        assert!(matches!(outcome, Outcome::Success(true)));
        assert!(hook::take_last().is_none());
        assert!(host.warnings().is_empty());
    }

    #[test]
    fn test_nested_capture_reports_inner_failure_only() {
        let (outer, outer_host) = recorder();
        let (inner, inner_host) = recorder();

        let risky = inner.wrap(|_: ()| -> u8 { panic!("inner") });
        let safe = outer.wrap(move |_: ()| risky(()));

        assert_eq!(safe(()), Some(None));
        assert!(outer_host.warnings().is_empty());
        assert_eq!(inner_host.warnings().len(), 1);
    }
}
