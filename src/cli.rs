use crate::config::{ProfileConfig, SortKey};
use crate::error::Result;
use crate::profile::Clock;
use clap::{Parser, Subcommand, ValueEnum};
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "callwrap")]
#[command(about = "Run demo workloads through the callwrap profiling and crash-capture wrappers")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Log filter used when CALLWRAP_LOG is unset
    #[arg(long, global = true, default_value = "info")]
    pub log: String,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a workload under the aggregate profiler
    Profile {
        /// Input passed to the wrapped function
        #[arg(default_value = "21")]
        value: i64,

        /// Number of wrapped calls
        #[arg(long, short = 'n', default_value = "1")]
        repeat: usize,

        /// Report sort key
        #[arg(long, short = 's', value_enum)]
        sort: Option<SortKey>,

        /// Maximum number of report rows
        #[arg(long, short = 'l')]
        limit: Option<usize>,

        /// Hide rows with less self time than this
        #[arg(long, value_parser = parse_duration)]
        min_time: Option<Duration>,

        /// Time source
        #[arg(long, value_enum)]
        clock: Option<Clock>,
    },

    /// Run a workload under the statement profiler
    Lines {
        /// Collatz start value
        #[arg(default_value = "27")]
        start: u64,
    },

    /// Run a failing workload under crash capture
    Crash {
        /// Kind of failure to trigger
        #[arg(value_enum, default_value = "divide")]
        kind: CrashKind,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum CrashKind {
    /// Integer division by zero
    Divide,
    /// `unwrap` on a parse error
    Unwrap,
    /// An error returned through `Result`
    Error,
}

impl Cli {
    /// Validate CLI arguments
    pub fn validate(&self) -> std::result::Result<(), String> {
        if let Command::Profile { repeat, limit, .. } = &self.command {
            if *repeat == 0 {
                return Err("--repeat must be at least 1".to_string());
            }
            if *limit == Some(0) {
                return Err("--limit must be at least 1".to_string());
            }
        }
        Ok(())
    }
}

/// Environment config with command-line overrides applied on top
pub fn profile_config(
    sort: Option<SortKey>,
    limit: Option<usize>,
    min_time: Option<Duration>,
    clock: Option<Clock>,
) -> Result<ProfileConfig> {
    let mut config = ProfileConfig::from_env()?;
    if let Some(sort) = sort {
        config = config.sort(sort);
    }
    if let Some(limit) = limit {
        config = config.limit(limit);
    }
    if let Some(min) = min_time {
        config = config.min_self_time(min);
    }
    if let Some(clock) = clock {
        config = config.clock(clock);
    }
    Ok(config)
}

fn parse_duration(s: &str) -> std::result::Result<Duration, String> {
    crate::config::parse_duration(s).map_err(|e| e.to_string())
}
