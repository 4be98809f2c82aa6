//! Checkpoint-based statement timing.
//!
//! Each enabled context is pushed onto a thread-local stack. A checkpoint
//! closes the previous checkpoint of the innermost context, so the time
//! between two `stmt!` markers is charged to the first one.

use super::{StatementBackend, StatementContext};
use crate::report::{LineReport, LineStat, Unit};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;
use std::time::{Duration, Instant};

type LineKey = (&'static str, u32);

thread_local! {
    static ACTIVE: RefCell<Vec<Rc<RefCell<Timings>>>> = const { RefCell::new(Vec::new()) };
}

#[derive(Default)]
struct Timings {
    lines: HashMap<LineKey, (u64, Duration)>,
    /// Checkpoint currently running and when it was reached
    last: Option<(LineKey, Instant)>,
}

impl Timings {
    fn hit(&mut self, key: LineKey, now: Instant) {
        self.close_last(now);
        self.lines.entry(key).or_default().0 += 1;
        self.last = Some((key, now));
    }

    fn close_last(&mut self, now: Instant) {
        if let Some((key, since)) = self.last.take() {
            self.lines.entry(key).or_default().1 += now.saturating_duration_since(since);
        }
    }
}

/// Record a checkpoint for the innermost enabled context on this thread
pub fn checkpoint(file: &'static str, line: u32) {
    let now = Instant::now();
    ACTIVE.with(|active| {
        if let Some(top) = active.borrow().last() {
            top.borrow_mut().hit((file, line), now);
        }
    });
}

/// The built-in backend
pub fn default_backend() -> Option<Arc<dyn StatementBackend>> {
    Some(Arc::new(LineTracker))
}

/// Backend timing `stmt!` checkpoints
#[derive(Debug, Clone, Copy, Default)]
pub struct LineTracker;

impl StatementBackend for LineTracker {
    fn name(&self) -> &str {
        "line-tracker"
    }

    fn create_context(&self) -> Box<dyn StatementContext> {
        Box::new(TrackerContext::default())
    }
}

#[derive(Default)]
struct TrackerContext {
    target: Option<Unit>,
    timings: Rc<RefCell<Timings>>,
    started: Option<Instant>,
    elapsed: Duration,
}

impl StatementContext for TrackerContext {
    fn add_function(&mut self, target: &Unit) {
        self.target = Some(target.clone());
    }

    fn enable(&mut self) {
        if self.started.is_some() {
            return;
        }
        ACTIVE.with(|active| active.borrow_mut().push(Rc::clone(&self.timings)));
        self.started = Some(Instant::now());
    }

    fn disable(&mut self) {
        let Some(started) = self.started.take() else {
            return;
        };
        let now = Instant::now();
        self.timings.borrow_mut().close_last(now);
        self.elapsed += now.saturating_duration_since(started);

        ACTIVE.with(|active| {
            let mut active = active.borrow_mut();
            if let Some(pos) = active.iter().rposition(|t| Rc::ptr_eq(t, &self.timings)) {
                active.remove(pos);
            }
        });
        tracing::debug!(
            lines = self.timings.borrow().lines.len(),
            elapsed = ?self.elapsed,
            "statement context disabled"
        );
    }

    fn report(&self) -> Option<LineReport> {
        let target = self.target.clone()?;
        let lines = self
            .timings
            .borrow()
            .lines
            .iter()
            .map(|(&(file, line), &(hits, time))| LineStat {
                file,
                line,
                hits,
                time,
                contents: None,
            })
            .collect();

        let mut report = LineReport::new(target, self.elapsed, lines);
        report.attach_sources();
        Some(report)
    }
}

impl Drop for TrackerContext {
    fn drop(&mut self) {
        // Never leave a dead context on the thread-local stack
        self.disable();
    }
}
