//! Capabilities consumed from the host application.
//!
//! The crash-capture wrapper only ever talks to a line-oriented log sink and
//! a warning surface. Closures implement both traits, so a host can pass
//! `|line: &str| console.print(line)` directly.

use std::sync::{Arc, Mutex};

/// Receives one line of diagnostic text per call
pub trait LogSink: Send + Sync {
    fn log(&self, line: &str);
}

/// Shows a short user-facing message
pub trait WarningSurface: Send + Sync {
    fn warning(&self, message: &str);
}

impl<F> LogSink for F
where
    F: Fn(&str) + Send + Sync,
{
    fn log(&self, line: &str) {
        self(line)
    }
}

impl<F> WarningSurface for F
where
    F: Fn(&str) + Send + Sync,
{
    fn warning(&self, message: &str) {
        self(message)
    }
}

/// Log sink that forwards every line as a `tracing` event
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLog;

impl LogSink for TracingLog {
    fn log(&self, line: &str) {
        tracing::error!(target: "callwrap::crash", "{}", line);
    }
}

/// Warning surface that prints a framed notice on stderr
#[derive(Debug, Clone, Copy, Default)]
pub struct StderrWarning;

impl WarningSurface for StderrWarning {
    fn warning(&self, message: &str) {
        let width = message.lines().map(str::len).max().unwrap_or(0);
        eprintln!("{}", "=".repeat(width));
        eprintln!("{}", message);
        eprintln!("{}", "=".repeat(width));
    }
}

/// In-memory host that records everything it receives
#[derive(Debug, Clone, Default)]
pub struct Recorder {
    lines: Arc<Mutex<Vec<String>>>,
    warnings: Arc<Mutex<Vec<String>>>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Logged lines, in order
    pub fn lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Warning messages, in order
    pub fn warnings(&self) -> Vec<String> {
        self.warnings
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn clear(&self) {
        self.lines.lock().unwrap_or_else(|e| e.into_inner()).clear();
        self.warnings
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }
}

impl LogSink for Recorder {
    fn log(&self, line: &str) {
        self.lines
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(line.to_string());
    }
}

impl WarningSurface for Recorder {
    fn warning(&self, message: &str) {
        self.warnings
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(message.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recorder_keeps_order() {
        let host = Recorder::new();
        host.log("first");
        host.log("second");
        host.warning("careful");

        assert_eq!(host.lines(), vec!["first", "second"]);
        assert_eq!(host.warnings(), vec!["careful"]);

        host.clear();
        assert!(host.lines().is_empty());
        assert!(host.warnings().is_empty());
    }

    #[test]
    fn test_closure_sinks() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = {
            let seen = Arc::clone(&seen);
            move |line: &str| seen.lock().unwrap().push(line.to_uppercase())
        };

        LogSink::log(&sink, "hello");
        WarningSurface::warning(&sink, "bye");
        assert_eq!(*seen.lock().unwrap(), vec!["HELLO", "BYE"]);
    }
}
