//! Re-armable cooldown timer, one background thread per breaker

use parking_lot::{Condvar, Mutex, MutexGuard};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy)]
struct Deadline {
    opened_at: f64,
    due: Instant,
}

#[derive(Debug, Default)]
struct Schedule {
    deadline: Option<Deadline>,
    stopped: bool,
}

#[derive(Debug, Default)]
struct Signal {
    schedule: Mutex<Schedule>,
    condvar: Condvar,
}

/// Waits out the cooldown of the newest open episode
///
/// Arming replaces any pending deadline, so re-opening the circuit never
/// stacks up sleeping threads. When a deadline comes due the callback gets
/// the episode's `opened_at`; returning `Some(secs)` waits that much longer
/// for the same episode unless a newer one was armed meanwhile.
///
/// The callback runs without the timer's lock held.
#[derive(Debug)]
pub(crate) struct CooldownTimer {
    signal: Arc<Signal>,
    handle: Option<JoinHandle<()>>,
}

impl CooldownTimer {
    pub(crate) fn spawn<F>(name: &str, on_due: F) -> std::io::Result<Self>
    where
        F: FnMut(f64) -> Option<f64> + Send + 'static,
    {
        let signal = Arc::new(Signal::default());
        let thread_signal = Arc::clone(&signal);
        let handle = std::thread::Builder::new()
            .name(format!("cooldown-{name}"))
            .spawn(move || run(&thread_signal, on_due))?;

        Ok(Self {
            signal,
            handle: Some(handle),
        })
    }

    /// Fire for `opened_at` after `wait_secs`, dropping any earlier deadline
    ///
    /// Returns false when the wait cannot be scheduled.
    pub(crate) fn arm(&self, opened_at: f64, wait_secs: f64) -> bool {
        let Some(due) = due_after(wait_secs) else {
            return false;
        };
        self.signal.schedule.lock().deadline = Some(Deadline { opened_at, due });
        self.signal.condvar.notify_one();
        true
    }

    /// Stop the thread and wait for it to exit. Idempotent.
    pub(crate) fn stop(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };

        self.signal.schedule.lock().stopped = true;
        self.signal.condvar.notify_all();
        if handle.join().is_err() {
            tracing::error!("cooldown timer thread panicked");
        }
    }

    #[cfg(test)]
    pub(crate) fn thread_id(&self) -> Option<std::thread::ThreadId> {
        self.handle.as_ref().map(|handle| handle.thread().id())
    }
}

impl Drop for CooldownTimer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn due_after(wait_secs: f64) -> Option<Instant> {
    let wait = Duration::try_from_secs_f64(wait_secs.max(0.001)).ok()?;
    Instant::now().checked_add(wait)
}

fn run<F>(signal: &Signal, mut on_due: F)
where
    F: FnMut(f64) -> Option<f64>,
{
    let mut schedule = signal.schedule.lock();
    loop {
        if schedule.stopped {
            return;
        }
        let Some(deadline) = schedule.deadline else {
            signal.condvar.wait(&mut schedule);
            continue;
        };
        if Instant::now() < deadline.due {
            signal.condvar.wait_until(&mut schedule, deadline.due);
            continue;
        }

        schedule.deadline = None;
        let more = MutexGuard::unlocked(&mut schedule, || on_due(deadline.opened_at));

        if let Some(wait_secs) = more
            && schedule.deadline.is_none()
            && let Some(due) = due_after(wait_secs)
        {
            schedule.deadline = Some(Deadline {
                opened_at: deadline.opened_at,
                due,
            });
        }
    }
}
