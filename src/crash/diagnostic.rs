use super::frames::Frame;
use crate::report::simplify_path;
use chrono::{DateTime, Local};
use std::fmt;

/// How the wrapped call failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Failure {
    Panic {
        message: String,
        location: Option<String>,
    },
    Error {
        message: String,
        /// Source chain below the top-level error
        causes: Vec<String>,
    },
}

impl Failure {
    pub fn message(&self) -> &str {
        match self {
            Failure::Panic { message, .. } | Failure::Error { message, .. } => message,
        }
    }

    fn lines(&self) -> Vec<String> {
        let text = match self {
            Failure::Panic {
                message,
                location: Some(location),
            } => format!("panicked at {}: {}", simplify_path(location), message),
            Failure::Panic {
                message,
                location: None,
            } => format!("panicked: {}", message),
            Failure::Error { message, causes } => {
                let mut text = format!("error: {}", message);
                for cause in causes {
                    text.push_str("\ncaused by: ");
                    text.push_str(cause);
                }
                text
            }
        };
        text.lines().map(str::to_string).collect()
    }
}

/// Everything known about one suppressed failure
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub captured_at: DateTime<Local>,
    /// Frames active where the wrapper invoked the target, outermost first
    pub context: Vec<Frame>,
    /// Frames the failure passed through, outermost first
    pub propagation: Vec<Frame>,
    pub failure: Failure,
}

impl Diagnostic {
    pub fn new(context: Vec<Frame>, propagation: Vec<Frame>, failure: Failure) -> Self {
        Diagnostic {
            captured_at: Local::now(),
            context,
            propagation,
            failure,
        }
    }

    /// The diagnostic as individual log lines
    pub fn lines(&self) -> Vec<String> {
        let mut lines = Vec::with_capacity(self.context.len() + self.propagation.len() + 2);
        lines.push(format!(
            "Traceback captured {} (most recent call last):",
            self.captured_at.format("%Y-%m-%d %H:%M:%S%.3f")
        ));
        lines.extend(self.context.iter().map(Frame::to_string));
        lines.extend(self.propagation.iter().map(Frame::to_string));
        lines.extend(self.failure.lines());
        lines
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.lines().join("\n"))
    }
}
