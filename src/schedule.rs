//! Round alignment across cooperating processes.
//!
//! Processes started by hand on different nodes drift apart by seconds. To
//! make them contend on the same document at the same moment, each one sleeps
//! until the next wall-clock minute boundary before starting a round. Clocks
//! on the nodes are assumed to be NTP-synchronized; the remaining skew is what
//! bounds how tightly the rounds overlap.

use chrono::{Local, NaiveDateTime, TimeDelta, Timelike};
use std::time::Duration;
use tracing::debug;

/// Source of local wall-clock time.
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;
}

/// The machine's local clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// Time left until the next `hh:mm:00.000`.
///
/// A time already sitting exactly on a boundary needs no wait.
pub fn delay_until_next_minute<T: Timelike>(now: &T) -> Duration {
    // Leap seconds report nanosecond() >= 1e9
    let nanos = now.nanosecond().min(999_999_999);
    let into_minute = Duration::from_secs(u64::from(now.second())) + Duration::from_nanos(u64::from(nanos));

    if into_minute.is_zero() {
        return Duration::ZERO;
    }

    Duration::from_secs(60).saturating_sub(into_minute)
}

/// Sleeps callers until the start of the next round.
#[derive(Debug, Clone, Default)]
pub struct RoundScheduler<C = SystemClock> {
    clock: C,
}

impl RoundScheduler<SystemClock> {
    pub fn new() -> Self {
        Self {
            clock: SystemClock,
        }
    }
}

impl<C: Clock> RoundScheduler<C> {
    pub fn with_clock(clock: C) -> Self {
        Self {
            clock,
        }
    }

    pub fn now(&self) -> NaiveDateTime {
        self.clock.now()
    }

    /// Block until the wall clock reaches the next minute boundary.
    ///
    /// Returns the wall-clock time the round starts at, which names the
    /// round's document.
    pub async fn wait_till_next_round_minute(&self) -> NaiveDateTime {
        let now = self.clock.now();
        let delay = delay_until_next_minute(&now);
        debug!(now = %now, wait_ms = delay.as_millis() as u64, "Waiting for next round minute");

        tokio::time::sleep(delay).await;

        let step = TimeDelta::from_std(delay).unwrap_or(TimeDelta::zero());
        now.checked_add_signed(step).unwrap_or(now)
    }
}
