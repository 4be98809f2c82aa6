//! Configuration for the profiling and crash-capture wrappers.
//!
//! Every knob has a builder method; `from_env` layers `CALLWRAP_*`
//! environment overrides on top of the defaults.

use crate::error::{Error, Result};
use crate::profile::Clock;
use clap::ValueEnum;
use std::str::FromStr;
use std::time::Duration;

pub const ENV_SORT: &str = "CALLWRAP_SORT";
pub const ENV_LIMIT: &str = "CALLWRAP_LIMIT";
pub const ENV_MIN_TIME: &str = "CALLWRAP_MIN_TIME";
pub const ENV_CLOCK: &str = "CALLWRAP_CLOCK";
pub const ENV_STATEMENTS: &str = "CALLWRAP_STATEMENTS";

/// Column an aggregate report is sorted by (always descending, except `Name`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum SortKey {
    /// Time spent in the unit itself, excluding callees
    #[default]
    #[value(alias = "tottime")]
    SelfTime,
    /// Time spent in the unit including callees
    #[value(alias = "cumtime")]
    Cumulative,
    /// Number of calls
    #[value(alias = "ncalls")]
    Calls,
    /// Unit name, ascending
    Name,
}

impl FromStr for SortKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        <SortKey as ValueEnum>::from_str(s.trim(), true)
            .map_err(|e| Error::InvalidArgument(format!("sort key: {e}")))
    }
}

/// Settings for an aggregate profiling session and its reports
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileConfig {
    pub sort: SortKey,
    /// Maximum number of rows in a report (`None` prints all)
    pub limit: Option<usize>,
    /// Rows whose self time is below this are omitted
    pub min_self_time: Duration,
    pub clock: Clock,
}

impl Default for ProfileConfig {
    fn default() -> Self {
        ProfileConfig {
            sort: SortKey::SelfTime,
            limit: None,
            min_self_time: Duration::ZERO,
            clock: Clock::Wall,
        }
    }
}

impl ProfileConfig {
    pub fn sort(mut self, sort: SortKey) -> Self {
        self.sort = sort;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn min_self_time(mut self, min: Duration) -> Self {
        self.min_self_time = min;
        self
    }

    pub fn clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Defaults overridden by `CALLWRAP_*` environment variables
    pub fn from_env() -> Result<Self> {
        Self::default().apply_env(|var| std::env::var(var).ok())
    }

    /// Apply overrides from an arbitrary variable lookup
    pub fn apply_env(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(value) = lookup(ENV_SORT) {
            self.sort = value.parse().map_err(|e: Error| Error::InvalidEnv {
                var: ENV_SORT,
                value: value.clone(),
                reason: e.to_string(),
            })?;
        }

        if let Some(value) = lookup(ENV_LIMIT) {
            let limit = value.trim().parse::<usize>().map_err(|e| Error::InvalidEnv {
                var: ENV_LIMIT,
                value: value.clone(),
                reason: e.to_string(),
            })?;
            self.limit = (limit > 0).then_some(limit);
        }

        if let Some(value) = lookup(ENV_MIN_TIME) {
            self.min_self_time = parse_duration(&value).map_err(|e| Error::InvalidEnv {
                var: ENV_MIN_TIME,
                value: value.clone(),
                reason: e.to_string(),
            })?;
        }

        if let Some(value) = lookup(ENV_CLOCK) {
            self.clock = <Clock as ValueEnum>::from_str(value.trim(), true).map_err(|reason| {
                Error::InvalidEnv {
                    var: ENV_CLOCK,
                    value: value.clone(),
                    reason,
                }
            })?;
        }

        Ok(self)
    }
}

/// Messages used by the crash-capture wrapper
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrashConfig {
    /// First line written to the log sink for every captured failure
    pub intro: String,
    /// Message shown once on the host warning surface
    pub warning: String,
}

pub const DEFAULT_INTRO: &str =
    "callwrap caught an error... please file an issue with this traceback:";

pub const DEFAULT_WARNING: &str = "Something went wrong in a wrapped operation :-(\n\n\
     Please file an issue with the traceback from the log console.";

impl Default for CrashConfig {
    fn default() -> Self {
        CrashConfig {
            intro: DEFAULT_INTRO.to_string(),
            warning: DEFAULT_WARNING.to_string(),
        }
    }
}

impl CrashConfig {
    pub fn intro(mut self, intro: impl Into<String>) -> Self {
        self.intro = intro.into();
        self
    }

    pub fn warning(mut self, warning: impl Into<String>) -> Self {
        self.warning = warning.into();
        self
    }
}

/// Whether an environment value switches a feature off
pub fn is_disabled_value(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "0" | "false" | "off" | "no"
    )
}

pub fn parse_duration(s: &str) -> std::result::Result<Duration, humantime::DurationError> {
    humantime::parse_duration(s.trim())
}
