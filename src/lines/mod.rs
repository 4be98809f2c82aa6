//! Per-statement profiling of single invocations.
//!
//! Statements are marked with [`stmt!`](crate::stmt). When the statement
//! capability is available (the `statements` feature, not switched off with
//! `CALLWRAP_STATEMENTS=0`), every call of a wrapped function gets a fresh
//! context and prints its own per-statement report, even when the call
//! panics. Without the capability the wrapper is a plain passthrough.

#[cfg(feature = "statements")]
mod tracker;

#[cfg(feature = "statements")]
pub use tracker::{LineTracker, checkpoint, default_backend};

// Stubs when the statement backend is not compiled
#[cfg(not(feature = "statements"))]
mod stub;

#[cfg(not(feature = "statements"))]
pub use stub::{checkpoint, default_backend};

use crate::config::{ENV_STATEMENTS, is_disabled_value};
use crate::report::{LineReport, ReportSink, StdoutSink, Unit};
use std::fmt;
use std::panic::Location;
use std::sync::{Arc, OnceLock};

/// Check if the statement backend is available at compile time
pub const fn statements_compiled() -> bool {
    cfg!(feature = "statements")
}

static CAPABILITY: OnceLock<bool> = OnceLock::new();

/// Whether statement profiling is available in this process.
///
/// Evaluated on first use and cached for the lifetime of the process.
pub fn capability() -> bool {
    *CAPABILITY.get_or_init(|| {
        let env = std::env::var(ENV_STATEMENTS).ok();
        let available = capability_from(statements_compiled(), env.as_deref());
        tracing::info!(available, "statement profiling capability");
        available
    })
}

/// Capability decision for a build and a `CALLWRAP_STATEMENTS` value
pub fn capability_from(compiled: bool, env: Option<&str>) -> bool {
    compiled && !env.is_some_and(is_disabled_value)
}

/// A statement-level profiling facility
pub trait StatementBackend: Send + Sync {
    fn name(&self) -> &str;

    /// A fresh, disabled context
    fn create_context(&self) -> Box<dyn StatementContext>;
}

/// Profiling state for one invocation
pub trait StatementContext {
    /// Register the function being profiled
    fn add_function(&mut self, target: &Unit);
    fn enable(&mut self);
    fn disable(&mut self);
    /// Report for the registered function, if any was registered
    fn report(&self) -> Option<LineReport>;
}

/// Statement profiler selected once at construction
#[derive(Clone)]
pub enum StatementProfiler {
    Enhanced {
        backend: Arc<dyn StatementBackend>,
        sink: Arc<dyn ReportSink>,
    },
    Passthrough,
}

impl StatementProfiler {
    /// Use the built-in backend if the capability is present, reporting to stdout
    pub fn detect() -> Self {
        if capability() {
            Self::with_backend(default_backend(), StdoutSink)
        } else {
            StatementProfiler::Passthrough
        }
    }

    /// Use `backend` if given, otherwise pass calls straight through
    pub fn with_backend(
        backend: Option<Arc<dyn StatementBackend>>,
        sink: impl ReportSink + 'static,
    ) -> Self {
        match backend {
            Some(backend) => {
                tracing::debug!(backend = backend.name(), "statement profiling enabled");
                StatementProfiler::Enhanced {
                    backend,
                    sink: Arc::new(sink),
                }
            }
            None => StatementProfiler::Passthrough,
        }
    }

    pub fn is_enhanced(&self) -> bool {
        matches!(self, StatementProfiler::Enhanced { .. })
    }

    /// Wrap `f` so every call is profiled per statement
    #[track_caller]
    pub fn wrap<A, R, F>(&self, name: &str, f: F) -> impl Fn(A) -> R + use<A, R, F>
    where
        F: Fn(A) -> R,
    {
        let location = Location::caller();
        let unit = Unit::new(name, location.file(), location.line());
        let profiler = self.clone();
        move |args: A| profiler.invoke(&unit, || f(args))
    }

    /// Profile a single call of `f`
    #[track_caller]
    pub fn run<R>(&self, name: &str, f: impl FnOnce() -> R) -> R {
        let location = Location::caller();
        self.invoke(&Unit::new(name, location.file(), location.line()), f)
    }

    fn invoke<R>(&self, unit: &Unit, f: impl FnOnce() -> R) -> R {
        match self {
            StatementProfiler::Passthrough => f(),
            StatementProfiler::Enhanced { backend, sink } => {
                let mut context = backend.create_context();
                context.add_function(unit);
                context.enable();
                let _release = ReleaseGuard {
                    context,
                    sink: sink.as_ref(),
                };
                f()
            }
        }
    }
}

impl fmt::Debug for StatementProfiler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatementProfiler::Enhanced { backend, .. } => f
                .debug_struct("Enhanced")
                .field("backend", &backend.name())
                .finish(),
            StatementProfiler::Passthrough => f.write_str("Passthrough"),
        }
    }
}

/// Disables the context and emits its report on every exit path
struct ReleaseGuard<'a> {
    context: Box<dyn StatementContext>,
    sink: &'a dyn ReportSink,
}

impl Drop for ReleaseGuard<'_> {
    fn drop(&mut self) {
        self.context.disable();
        if let Some(report) = self.context.report() {
            self.sink.emit(&report.to_string());
        }
    }
}

/// Mark a statement for the statement profiler
#[macro_export]
macro_rules! stmt {
    () => {
        $crate::lines::checkpoint(file!(), line!())
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::MemorySink;
    use std::panic::{AssertUnwindSafe, catch_unwind};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Backend that records lifecycle calls instead of timing anything
    #[derive(Default)]
    struct ScriptedBackend {
        events: Arc<Mutex<Vec<String>>>,
    }

    struct ScriptedContext {
        events: Arc<Mutex<Vec<String>>>,
        target: Option<Unit>,
    }

    impl StatementBackend for ScriptedBackend {
        fn name(&self) -> &str {
            "scripted"
        }

        fn create_context(&self) -> Box<dyn StatementContext> {
            self.events.lock().unwrap().push("create".to_string());
            Box::new(ScriptedContext {
                events: Arc::clone(&self.events),
                target: None,
            })
        }
    }

    impl StatementContext for ScriptedContext {
        fn add_function(&mut self, target: &Unit) {
            self.events.lock().unwrap().push(format!("add {}", target.name));
            self.target = Some(target.clone());
        }

        fn enable(&mut self) {
            self.events.lock().unwrap().push("enable".to_string());
        }

        fn disable(&mut self) {
            self.events.lock().unwrap().push("disable".to_string());
        }

        fn report(&self) -> Option<LineReport> {
            self.target
                .clone()
                .map(|t| LineReport::new(t, Duration::ZERO, Vec::new()))
        }
    }

    fn scripted() -> (StatementProfiler, Arc<Mutex<Vec<String>>>, MemorySink) {
        let backend = ScriptedBackend::default();
        let events = Arc::clone(&backend.events);
        let sink = MemorySink::new();
        let profiler = StatementProfiler::with_backend(Some(Arc::new(backend)), sink.clone());
        (profiler, events, sink)
    }

    #[test]
    fn test_passthrough_returns_value_without_output() {
        let sink = MemorySink::new();
        let profiler = StatementProfiler::with_backend(None, sink.clone());
        assert!(!profiler.is_enhanced());

        let ok = profiler.wrap("ok", |()| "ok");
        assert_eq!(ok(()), "ok");
        assert!(sink.is_empty());
    }

    #[test]
    fn test_passthrough_propagates_panics() {
        let profiler = StatementProfiler::Passthrough;
        let boom = profiler.wrap("boom", |_: ()| -> u8 { panic!("boom") });
        assert!(catch_unwind(AssertUnwindSafe(|| boom(()))).is_err());
    }

    #[test]
    fn test_enhanced_lifecycle_and_single_report() {
        let (profiler, events, sink) = scripted();
        let triple = profiler.wrap("triple", |x: u32| x * 3);

        assert_eq!(triple(7), 21);
        assert_eq!(
            *events.lock().unwrap(),
            ["create", "add triple", "enable", "disable"]
        );
        assert_eq!(sink.len(), 1);
        assert!(sink.last().unwrap().contains("(triple)"));
    }

    #[test]
    fn test_fresh_context_per_call() {
        let (profiler, events, sink) = scripted();
        let id = profiler.wrap("id", |x: u8| x);
        id(1);
        id(2);

        let creates = events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| *e == "create")
            .count();
        assert_eq!(creates, 2);
        assert_eq!(sink.len(), 2);
    }

    #[test]
    fn test_report_emitted_before_panic_reaches_caller() {
        let (profiler, events, sink) = scripted();
        let boom = profiler.wrap("boom", |_: ()| -> u8 { panic!("boom") });

        let result = catch_unwind(AssertUnwindSafe(|| boom(())));
        assert!(result.is_err());
        assert_eq!(sink.len(), 1);
        assert_eq!(events.lock().unwrap().last().unwrap(), "disable");
    }

    #[test]
    fn test_capability_switch() {
        assert!(capability_from(true, None));
        assert!(capability_from(true, Some("1")));
        assert!(capability_from(true, Some("yes")));
        for off in ["0", "false", "OFF", " no "] {
            assert!(!capability_from(true, Some(off)), "{off}");
        }
        assert!(!capability_from(false, None));
        assert!(!capability_from(false, Some("1")));
    }

    #[test]
    fn test_capability_is_stable() {
        let first = capability();
        assert_eq!(capability(), first);
        if !statements_compiled() {
            assert!(!first);
            assert!(!StatementProfiler::detect().is_enhanced());
        }
    }
}
