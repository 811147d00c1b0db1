//! Retry policies for recoverable failures
//!
//! The benchmark step absorbs transient failures by retrying with a bounded
//! number of attempts. The policy only computes how many attempts are allowed
//! and how long to wait after each failed one. Callers own the loop so they
//! can log every attempt.

use std::time::Duration;

/// Bounded retry configuration with a fixed wait after each failed attempt
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of attempts (not retries after the first)
    pub max_attempts: u32,
    /// Delay after every failed attempt
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::fixed(
            crate::defaults::DEFAULT_BENCH_RETRIES,
            crate::defaults::DEFAULT_BENCH_RETRY_WAIT,
        )
    }
}

impl RetryPolicy {
    /// `max_attempts` attempts, `delay` after each failure
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self { max_attempts, delay }
    }

    /// Delay to wait after failed attempt number `attempt` (1-based)
    pub fn delay_after(&self, _attempt: u32) -> Duration {
        self.delay
    }

    /// Iterate over attempt numbers, 1-based
    pub fn attempts(&self) -> std::ops::RangeInclusive<u32> {
        1..=self.max_attempts
    }

    /// Total time spent sleeping if every attempt fails
    pub fn worst_case_wait(&self) -> Duration {
        self.attempts().map(|a| self.delay_after(a)).sum()
    }
}
