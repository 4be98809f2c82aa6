use std::io::Write;
use std::sync::{Arc, Mutex};

/// Destination for rendered reports
pub trait ReportSink: Send + Sync {
    fn emit(&self, text: &str);
}

/// Writes reports to standard output
#[derive(Debug, Clone, Copy, Default)]
pub struct StdoutSink;

impl ReportSink for StdoutSink {
    fn emit(&self, text: &str) {
        let mut out = std::io::stdout().lock();
        // stdout may already be closed; reporting is best-effort
        let _ = writeln!(out, "{}", text);
        let _ = out.flush();
    }
}

/// Keeps every emitted report in memory
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    reports: Arc<Mutex<Vec<String>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reports(&self) -> Vec<String> {
        self.reports
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn len(&self) -> usize {
        self.reports.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Most recent report, if any
    pub fn last(&self) -> Option<String> {
        self.reports
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .last()
            .cloned()
    }
}

impl ReportSink for MemorySink {
    fn emit(&self, text: &str) {
        self.reports
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(text.to_string());
    }
}
