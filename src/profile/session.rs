use crate::config::ProfileConfig;
use crate::error::{Error, Result};
use crate::report::{ProfileReport, ReportSink, StatRow, StdoutSink, Unit};
use std::collections::HashMap;
use std::fmt;
use std::panic::Location;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use std::thread::ThreadId;
use std::time::Duration;

/// Accumulator of call-time statistics shared by every wrapper built on it.
///
/// Cloning is cheap and yields a handle to the same session. Statistics grow
/// across all wrapped calls until [`ProfileSession::reset`].
#[derive(Clone)]
pub struct ProfileSession {
    inner: Arc<Inner>,
}

struct Inner {
    enabled: AtomicBool,
    config: ProfileConfig,
    sink: Arc<dyn ReportSink>,
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    stats: HashMap<Unit, UnitStats>,
    /// Open scopes per thread, innermost last
    stacks: HashMap<ThreadId, Vec<OpenScope>>,
    next_scope: u64,
}

#[derive(Debug, Default, Clone, Copy)]
struct UnitStats {
    calls: u64,
    primitive_calls: u64,
    self_time: Duration,
    cumulative_time: Duration,
}

struct OpenScope {
    id: u64,
    unit: Unit,
    start: Duration,
    children: Duration,
}

static GLOBAL: OnceLock<ProfileSession> = OnceLock::new();

impl ProfileSession {
    /// Session reporting to stdout
    pub fn new(config: ProfileConfig) -> Result<Self> {
        Self::with_sink(config, StdoutSink)
    }

    pub fn with_sink(config: ProfileConfig, sink: impl ReportSink + 'static) -> Result<Self> {
        config.clock.probe()?;
        Ok(ProfileSession {
            inner: Arc::new(Inner {
                enabled: AtomicBool::new(false),
                config,
                sink: Arc::new(sink),
                state: Mutex::new(State::default()),
            }),
        })
    }

    /// The process-wide session, configured from `CALLWRAP_*` variables on first use
    pub fn global() -> &'static ProfileSession {
        GLOBAL.get_or_init(|| {
            ProfileConfig::from_env()
                .and_then(ProfileSession::new)
                .unwrap_or_else(|e| {
                    tracing::warn!("falling back to default profiling config: {}", e);
                    ProfileSession::default()
                })
        })
    }

    pub fn config(&self) -> &ProfileConfig {
        &self.inner.config
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.enabled.load(Ordering::SeqCst)
    }

    /// Start sampling. Fails if sampling is already on.
    pub fn enable(&self) -> Result<()> {
        self.inner
            .enabled
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map_err(|_| Error::SessionAlreadyEnabled)?;
        tracing::debug!("profiling session enabled");
        Ok(())
    }

    /// Stop sampling. Fails if sampling is already off.
    pub fn disable(&self) -> Result<()> {
        self.inner
            .enabled
            .compare_exchange(true, false, Ordering::SeqCst, Ordering::SeqCst)
            .map_err(|_| Error::SessionNotEnabled)?;
        tracing::debug!("profiling session disabled");
        Ok(())
    }

    /// Open a nested unit on the current thread.
    ///
    /// The unit is recorded when the returned guard drops. While the session
    /// is disabled the guard is inert.
    #[track_caller]
    pub fn enter(&self, name: impl Into<String>) -> ScopeGuard {
        let location = Location::caller();
        self.open(Unit::new(name, location.file(), location.line()))
    }

    pub(super) fn open(&self, unit: Unit) -> ScopeGuard {
        if !self.is_enabled() {
            return ScopeGuard { open: None };
        }

        let start = self.inner.config.clock.now();
        let thread = std::thread::current().id();
        let mut state = self.state();
        let id = state.next_scope;
        state.next_scope += 1;
        state.stacks.entry(thread).or_default().push(OpenScope {
            id,
            unit,
            start,
            children: Duration::ZERO,
        });

        ScopeGuard {
            open: Some((self.clone(), thread, id)),
        }
    }

    fn close(&self, thread: ThreadId, id: u64) {
        let end = self.inner.config.clock.now();
        let mut state = self.state();
        let State { stats, stacks, .. } = &mut *state;

        let Some(stack) = stacks.get_mut(&thread) else {
            return;
        };
        // Guards may drop out of order; scopes opened later stay open
        let Some(pos) = stack.iter().rposition(|open| open.id == id) else {
            return;
        };
        let scope = stack.remove(pos);

        let elapsed = end.saturating_sub(scope.start);
        let recursive = stack[..pos].iter().any(|open| open.unit == scope.unit);
        if let Some(parent) = pos.checked_sub(1).and_then(|i| stack.get_mut(i)) {
            parent.children += elapsed;
        }
        if stack.is_empty() {
            stacks.remove(&thread);
        }

        let entry = stats.entry(scope.unit).or_default();
        entry.calls += 1;
        entry.self_time += elapsed.saturating_sub(scope.children);
        if !recursive {
            entry.primitive_calls += 1;
            entry.cumulative_time += elapsed;
        }
    }

    /// Current statistics, sorted and filtered per the session config
    pub fn snapshot(&self) -> ProfileReport {
        let rows = self
            .state()
            .stats
            .iter()
            .map(|(unit, stats)| StatRow {
                unit: unit.clone(),
                calls: stats.calls,
                primitive_calls: stats.primitive_calls,
                self_time: stats.self_time,
                cumulative_time: stats.cumulative_time,
            })
            .collect();

        let config = &self.inner.config;
        ProfileReport::build(
            rows,
            config.clock,
            config.sort,
            config.limit,
            config.min_self_time,
        )
    }

    /// Render the current statistics to the session's report sink
    pub fn print_stats(&self) {
        let report = self.snapshot();
        self.inner.sink.emit(&report.to_string());
    }

    /// Drop all accumulated statistics
    pub fn reset(&self) {
        self.state().stats.clear();
    }

    /// Run `f` as a sampled call of `unit`.
    ///
    /// The outermost call enables sampling and reports afterwards, on every
    /// exit path. Calls made while sampling is already on only record a scope.
    pub(super) fn run<R>(&self, unit: &Unit, f: impl FnOnce() -> R) -> R {
        if self.enable().is_err() {
            let _scope = self.open(unit.clone());
            return f();
        }

        let _sampling = SamplingGuard { session: self };
        let _scope = self.open(unit.clone());
        f()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.inner.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for ProfileSession {
    fn default() -> Self {
        ProfileSession {
            inner: Arc::new(Inner {
                enabled: AtomicBool::new(false),
                config: ProfileConfig::default(),
                sink: Arc::new(StdoutSink),
                state: Mutex::new(State::default()),
            }),
        }
    }
}

impl fmt::Debug for ProfileSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProfileSession")
            .field("enabled", &self.is_enabled())
            .field("config", &self.inner.config)
            .field("units", &self.state().stats.len())
            .finish()
    }
}

/// Records a unit on drop
#[must_use = "the scope is recorded when the guard drops; bind it with `let _guard = ...`"]
pub struct ScopeGuard {
    open: Option<(ProfileSession, ThreadId, u64)>,
}

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        if let Some((session, thread, id)) = self.open.take() {
            session.close(thread, id);
        }
    }
}

/// Disables sampling and emits the report when the outermost call ends
struct SamplingGuard<'a> {
    session: &'a ProfileSession,
}

impl Drop for SamplingGuard<'_> {
    fn drop(&mut self) {
        if self.session.disable().is_ok() {
            self.session.print_stats();
        }
    }
}
