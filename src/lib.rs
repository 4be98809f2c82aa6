//! Profiling and crash-capture wrappers for host-embedded code.
//!
//! - [`profile`] samples calls into a shared [`ProfileSession`] and prints
//!   aggregate statistics after each call.
//! - [`StatementProfiler`] reports per-statement timings for one call when
//!   the statement capability is available, and is a passthrough otherwise.
//! - [`CrashCapture`] turns failures into a logged traceback, one warning on
//!   the host, and a `None` result.

pub mod cli;
pub mod commands;
pub mod config;
pub mod crash;
pub mod error;
pub mod host;
pub mod lines;
pub mod logging;
pub mod profile;
pub mod report;

pub use crash::{CrashCapture, Outcome, catch_errors};
pub use error::{Error, Result};
pub use lines::StatementProfiler;
pub use profile::{ProfileSession, profile};
