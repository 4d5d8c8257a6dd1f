//! Time-bucketed measurement window with background eviction

use crate::{
    Aggregate, Outcome,
    clock::{Clock, MonotonicClock},
    errors::{ConfigError, WindowError},
    window::Window,
};
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// Default pause between two eviction sweeps
pub const DEFAULT_SWEEP_INTERVAL_SECS: f64 = 2.0;

#[derive(Debug, Clone, Copy)]
struct Bucket {
    started_at: f64,
    aggregate: Aggregate,
}

#[derive(Debug, Default)]
struct Buckets {
    partials: VecDeque<Bucket>,
    total: Aggregate,
}

impl Buckets {
    /// Bucket covering `now`, opening a new one if the newest has closed
    fn current(&mut self, now: f64, bucket_secs: f64) -> &mut Bucket {
        let reuse = self
            .partials
            .back()
            .is_some_and(|newest| now < newest.started_at + bucket_secs);

        if !reuse {
            self.partials.push_back(Bucket {
                started_at: now,
                aggregate: Aggregate::default(),
            });
        }

        // either reused or just pushed, so never empty here
        let last = self.partials.len() - 1;
        &mut self.partials[last]
    }

    /// Drop buckets whose whole span is older than the retention
    fn evict_expired(&mut self, now: f64, bucket_secs: f64, retention_secs: f64) -> usize {
        let mut evicted = 0;
        while let Some(oldest) = self.partials.front() {
            if oldest.started_at + bucket_secs + retention_secs > now {
                break;
            }
            let aggregate = oldest.aggregate;
            self.partials.pop_front();
            self.total.erase(&aggregate);
            evicted += 1;
        }
        evicted
    }
}

#[derive(Debug)]
struct Shared {
    buckets: Mutex<Buckets>,
    clock: Arc<dyn Clock>,
    retention_secs: f64,
    bucket_secs: f64,
}

impl Shared {
    fn sweep(&self) -> usize {
        let now = self.clock.monotonic_time();
        let evicted =
            self.buckets
                .lock()
                .evict_expired(now, self.bucket_secs, self.retention_secs);
        if evicted > 0 {
            tracing::debug!(evicted, "evicted expired window buckets");
        }
        evicted
    }
}

#[derive(Debug, Default)]
struct StopSignal {
    stopped: Mutex<bool>,
    condvar: Condvar,
}

#[derive(Debug)]
struct Sweeper {
    signal: Arc<StopSignal>,
    handle: JoinHandle<()>,
}

/// Window over the outcomes of the last `retention_secs` seconds
///
/// Readings land in buckets spanning `bucket_secs`. A background thread
/// wakes every sweep interval and drops buckets that have aged out, so old
/// failures decay even while no traffic arrives. The thread lives until
/// [`TimeWindow::stop`] is called or the window is dropped.
///
/// A bucket goes only once its whole span is older than the retention, so a
/// reading is kept for between `retention_secs` and
/// `retention_secs + bucket_secs` depending on where it fell in its bucket.
///
/// Logging, eviction and snapshots all go through one lock over the bucket
/// list and the running total.
#[derive(Debug)]
pub struct TimeWindow {
    shared: Arc<Shared>,
    sweeper: Mutex<Option<Sweeper>>,
}

impl TimeWindow {
    /// Create a window on the monotonic clock with the default sweep interval
    pub fn new(retention_secs: f64, bucket_secs: f64) -> Result<Self, ConfigError> {
        Self::with_clock(
            retention_secs,
            bucket_secs,
            DEFAULT_SWEEP_INTERVAL_SECS,
            Arc::new(MonotonicClock::new()),
        )
    }

    /// Create a window on a custom clock and sweep interval
    pub fn with_clock(
        retention_secs: f64,
        bucket_secs: f64,
        sweep_interval_secs: f64,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ConfigError> {
        if !(retention_secs.is_finite() && retention_secs > 0.0) {
            return Err(ConfigError::invalid("retention_secs", retention_secs));
        }
        if !(bucket_secs.is_finite() && bucket_secs > 0.0 && bucket_secs <= retention_secs) {
            return Err(ConfigError::invalid("bucket_secs", bucket_secs));
        }
        let Some(sweep_interval) = Duration::try_from_secs_f64(sweep_interval_secs)
            .ok()
            .filter(|interval| !interval.is_zero())
        else {
            return Err(ConfigError::invalid(
                "sweep_interval_secs",
                sweep_interval_secs,
            ));
        };
        if bucket_secs > retention_secs / 4.0 {
            tracing::warn!(
                retention_secs,
                bucket_secs,
                "bucket span above a quarter of the retention makes eviction coarse"
            );
        }

        let shared = Arc::new(Shared {
            buckets: Mutex::new(Buckets::default()),
            clock,
            retention_secs,
            bucket_secs,
        });
        let sweeper = spawn_sweeper(&shared, sweep_interval);

        Ok(Self {
            shared,
            sweeper: Mutex::new(sweeper),
        })
    }

    pub fn retention_secs(&self) -> f64 {
        self.shared.retention_secs
    }

    pub fn bucket_secs(&self) -> f64 {
        self.shared.bucket_secs
    }

    /// Run one eviction pass now, returning how many buckets were dropped
    pub fn sweep(&self) -> usize {
        self.shared.sweep()
    }

    /// Number of buckets currently retained
    pub fn bucket_count(&self) -> usize {
        self.shared.buckets.lock().partials.len()
    }

    /// The newest bucket on its own
    pub fn latest_measurement(&self) -> Result<Aggregate, WindowError> {
        let buckets = self.shared.buckets.lock();
        match buckets.partials.back() {
            Some(newest) if !buckets.total.is_empty() => Ok(newest.aggregate),
            _ => Err(WindowError::Empty),
        }
    }

    /// Stop the background sweeper and wait for it to exit
    ///
    /// Idempotent. Readings are still accepted afterwards, but nothing
    /// expires until [`TimeWindow::sweep`] is called by hand.
    pub fn stop(&self) {
        let Some(sweeper) = self.sweeper.lock().take() else {
            return;
        };

        *sweeper.signal.stopped.lock() = true;
        sweeper.signal.condvar.notify_all();
        if sweeper.handle.join().is_err() {
            tracing::error!("window sweeper thread panicked");
        }
    }

    pub fn is_sweeping(&self) -> bool {
        self.sweeper.lock().is_some()
    }
}

impl Window for TimeWindow {
    fn log_reading(&self, outcome: Outcome) {
        let now = self.shared.clock.monotonic_time();
        let mut buckets = self.shared.buckets.lock();
        buckets.current(now, self.shared.bucket_secs).aggregate.record(outcome);
        buckets.total.record(outcome);
    }

    fn overall_aggregate(&self) -> Aggregate {
        self.shared.buckets.lock().total
    }

    fn reset(&self) {
        *self.shared.buckets.lock() = Buckets::default();
    }
}

impl Drop for TimeWindow {
    fn drop(&mut self) {
        self.stop();
    }
}

fn spawn_sweeper(shared: &Arc<Shared>, interval: Duration) -> Option<Sweeper> {
    let signal = Arc::new(StopSignal::default());
    let thread_signal = Arc::clone(&signal);
    let thread_shared = Arc::clone(shared);

    let spawned = std::thread::Builder::new()
        .name("window-sweeper".to_string())
        .spawn(move || {
            let mut stopped = thread_signal.stopped.lock();
            while !*stopped {
                let timed_out = thread_signal
                    .condvar
                    .wait_for(&mut stopped, interval)
                    .timed_out();
                if timed_out && !*stopped {
                    thread_shared.sweep();
                }
            }
        });

    match spawned {
        Ok(handle) => Some(Sweeper { signal, handle }),
        Err(e) => {
            tracing::error!(error = %e, "failed to spawn window sweeper; buckets expire only on sweep()");
            None
        }
    }
}
