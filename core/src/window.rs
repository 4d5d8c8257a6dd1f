//! Rolling measurement windows
//!
//! A window keeps the recent history of outcomes the state machine judges
//! the dependency by. Two implementations ship with the crate:
//! - [`FixedWindow`]: the last N outcomes, in a ring of slots
//! - [`TimeWindow`](crate::TimeWindow): outcomes from the last stretch of
//!   wall-clock-relevant time, in expiring buckets

use crate::{Aggregate, Outcome, errors::ConfigError, errors::WindowError};
use parking_lot::Mutex;

/// Default number of slots for [`FixedWindow`]
pub const DEFAULT_WINDOW_SIZE: usize = 100;

/// Capability shared by all measurement windows
///
/// Implementations use interior mutability: the same window is shared
/// between the state machine and its guards.
pub trait Window: Send + Sync + std::fmt::Debug {
    /// Log the outcome of one request
    fn log_reading(&self, outcome: Outcome);

    /// Snapshot of the totals currently inside the window
    fn overall_aggregate(&self) -> Aggregate;

    /// Drop all history
    fn reset(&self);
}

#[derive(Debug)]
struct Ring {
    head: usize,
    slots: Vec<Aggregate>,
    total: Aggregate,
}

impl Ring {
    fn new(size: usize) -> Self {
        Self {
            head: 0,
            slots: vec![Aggregate::default(); size],
            total: Aggregate::default(),
        }
    }

    /// Advance the head, evicting whatever the new head slot held
    fn slide(&mut self) {
        let tail = (self.head + 1) % self.slots.len();
        let evicted = self.slots[tail];
        self.total.erase(&evicted);
        self.slots[tail].reset();
        self.head = tail;
    }
}

/// Window over the last `window_size` outcomes
///
/// Every reading slides the ring by one slot before it is written, so once
/// the ring is full each new reading pushes the oldest one out of the
/// running total. Never allocates after construction.
#[derive(Debug)]
pub struct FixedWindow {
    window_size: usize,
    ring: Mutex<Ring>,
}

impl FixedWindow {
    /// Create a window holding the last `window_size` outcomes
    pub fn new(window_size: usize) -> Result<Self, ConfigError> {
        if window_size == 0 {
            return Err(ConfigError::invalid("window_size", window_size));
        }

        Ok(Self {
            window_size,
            ring: Mutex::new(Ring::new(window_size)),
        })
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    /// The most recently written slot on its own
    ///
    /// Fails with [`WindowError::Empty`] when nothing is in the window, so
    /// "never logged" is not mistaken for an all-zero reading.
    pub fn latest_measurement(&self) -> Result<Aggregate, WindowError> {
        let ring = self.ring.lock();
        if ring.total.is_empty() {
            return Err(WindowError::Empty);
        }
        Ok(ring.slots[ring.head])
    }
}

impl Default for FixedWindow {
    fn default() -> Self {
        Self {
            window_size: DEFAULT_WINDOW_SIZE,
            ring: Mutex::new(Ring::new(DEFAULT_WINDOW_SIZE)),
        }
    }
}

impl Window for FixedWindow {
    fn log_reading(&self, outcome: Outcome) {
        let mut ring = self.ring.lock();
        ring.slide();
        let head = ring.head;
        ring.slots[head].record(outcome);
        ring.total.record(outcome);
    }

    fn overall_aggregate(&self) -> Aggregate {
        self.ring.lock().total
    }

    fn reset(&self) {
        *self.ring.lock() = Ring::new(self.window_size);
    }
}
