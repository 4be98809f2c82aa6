use crate::error::{Error, Result};
use crate::lines::StatementProfiler;
use crate::stmt;

/// Run the lines command - one statement report per call
pub fn run(start: u64) -> Result<u64> {
    let profiler = StatementProfiler::detect();
    if !profiler.is_enhanced() {
        eprintln!("Statement profiling unavailable; running without it");
    }

    let steps = profiler.wrap("collatz_steps", collatz_steps);
    steps(start).ok_or_else(|| {
        Error::InvalidArgument(format!("collatz sequence from {start} overflows u64"))
    })
}

/// Steps to reach 1, or `None` if the sequence leaves the u64 range
fn collatz_steps(start: u64) -> Option<u64> {
    stmt!();
    let mut n = start.max(1);
    let mut steps = 0;
    while n != 1 {
        stmt!();
        n = if n % 2 == 0 {
            n / 2
        } else {
            n.checked_mul(3)?.checked_add(1)?
        };
        stmt!();
        steps += 1;
    }
    stmt!();
    Some(steps)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collatz_steps() {
        assert_eq!(collatz_steps(1), Some(0));
        assert_eq!(collatz_steps(6), Some(8));
        assert_eq!(run(27).unwrap(), 111);
    }

    #[test]
    fn test_overflowing_start_is_rejected() {
        assert_eq!(collatz_steps(u64::MAX), None);
        let err = run(u64::MAX).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }
}
