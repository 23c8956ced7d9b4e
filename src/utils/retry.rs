//! Fixed-interval retry policies for polling loops.

use crate::constants::{
    LOCK_RETRY_INTERVAL_MS, LOCK_TIMEOUT_MS, PROBE_BUDGET_MS, PROBE_INTERVAL_MS,
};
use std::time::Duration;
use tokio_retry::strategy::FixedInterval;

/// Shortest delay a policy will use between attempts.
pub const MIN_RETRY_INTERVAL: Duration = Duration::from_millis(1);

/// How often to retry and for how long.
///
/// Used by both the lock manager (exclusive-create attempts) and the
/// consistency prober (`exists` polls). Loops measure elapsed time with
/// [`tokio::time::Instant`], so tests can drive them with a paused clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Delay between two attempts.
    pub interval: Duration,
    /// Total time allowed before giving up.
    pub budget: Duration,
}

impl RetryPolicy {
    /// A zero `interval` is raised to [`MIN_RETRY_INTERVAL`] so the polling
    /// loops always advance the clock.
    pub const fn new(interval: Duration, budget: Duration) -> Self {
        let interval = if interval.is_zero() { MIN_RETRY_INTERVAL } else { interval };
        Self {
            interval,
            budget,
        }
    }

    /// Policy used for lock acquisition: 100ms attempts for up to 50s.
    pub const fn lock_default() -> Self {
        Self::new(
            Duration::from_millis(LOCK_RETRY_INTERVAL_MS),
            Duration::from_millis(LOCK_TIMEOUT_MS),
        )
    }

    /// Policy used while waiting for consistency: 100ms polls for up to 10s.
    pub const fn probe_default() -> Self {
        Self::new(
            Duration::from_millis(PROBE_INTERVAL_MS),
            Duration::from_millis(PROBE_BUDGET_MS),
        )
    }

    /// Infinite iterator of delays between attempts.
    ///
    /// Termination is driven by the budget, not by the iterator.
    pub fn delays(&self) -> FixedInterval {
        FixedInterval::new(self.interval)
    }

    /// Upper bound on the number of attempts made within the budget.
    pub fn max_attempts(&self) -> u64 {
        (self.budget.as_millis() / self.interval.as_millis().max(1)) as u64 + 1
    }

    /// Remaining budget after `elapsed`, saturating at zero.
    pub fn remaining(&self, elapsed: Duration) -> Duration {
        self.budget.saturating_sub(elapsed)
    }
}
