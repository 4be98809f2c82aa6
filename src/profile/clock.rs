use crate::error::{Error, Result};
use clap::ValueEnum;
use std::fmt;
use std::sync::OnceLock;
use std::time::{Duration, Instant};

/// Time source used to measure profiled units
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, ValueEnum)]
pub enum Clock {
    /// Monotonic wall-clock time
    #[default]
    Wall,
    /// CPU time consumed by the calling thread
    ThreadCpu,
}

static EPOCH: OnceLock<Instant> = OnceLock::new();

impl Clock {
    /// Check that the clock can be read on this platform
    pub fn probe(self) -> Result<Self> {
        self.read().map(|_| self)
    }

    /// Current reading; only differences between readings are meaningful
    pub fn read(self) -> Result<Duration> {
        match self {
            Clock::Wall => Ok(EPOCH.get_or_init(Instant::now).elapsed()),
            Clock::ThreadCpu => thread_cpu_time(),
        }
    }

    /// Like `read`, with unreadable clocks reporting zero
    pub fn now(self) -> Duration {
        self.read().unwrap_or_default()
    }
}

impl fmt::Display for Clock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Clock::Wall => f.write_str("wall"),
            Clock::ThreadCpu => f.write_str("thread cpu"),
        }
    }
}

#[cfg(target_os = "linux")]
fn thread_cpu_time() -> Result<Duration> {
    use nix::time::{ClockId, clock_gettime};

    clock_gettime(ClockId::CLOCK_THREAD_CPUTIME_ID)
        .map(Duration::from)
        .map_err(|e| Error::Clock(format!("CLOCK_THREAD_CPUTIME_ID: {e}")))
}

#[cfg(not(target_os = "linux"))]
fn thread_cpu_time() -> Result<Duration> {
    Err(Error::UnsupportedPlatform(
        "thread CPU clock is only available on Linux".to_string(),
    ))
}
