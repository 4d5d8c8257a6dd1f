//! Monotonic time sources
//!
//! Every timestamp in the crate is seconds relative to a clock-specific
//! anchor. Using [`Instant`] instead of wall time keeps NTP adjustments from
//! opening or closing circuits early.

use parking_lot::Mutex;
use std::time::Instant;

/// Source of monotonic time, in seconds
pub trait Clock: Send + Sync + std::fmt::Debug {
    /// Seconds elapsed since this clock's anchor
    fn monotonic_time(&self) -> f64;
}

/// Clock anchored at its creation [`Instant`]
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    start_time: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn monotonic_time(&self) -> f64 {
        self.start_time.elapsed().as_secs_f64()
    }
}

/// Clock that only moves when told to
///
/// Useful for driving window eviction and cooldown expiry in tests without
/// sleeping.
///
/// ```rust
/// use rate_breaker::{Clock, ManualClock};
///
/// let clock = ManualClock::new();
/// clock.advance(2.5);
/// assert_eq!(clock.monotonic_time(), 2.5);
/// ```
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Mutex<f64>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move the clock forward by `seconds`
    pub fn advance(&self, seconds: f64) {
        *self.now.lock() += seconds;
    }

    /// Jump to an absolute time; moving backwards is ignored
    pub fn set(&self, seconds: f64) {
        let mut now = self.now.lock();
        if seconds > *now {
            *now = seconds;
        }
    }
}

impl Clock for ManualClock {
    fn monotonic_time(&self) -> f64 {
        *self.now.lock()
    }
}
