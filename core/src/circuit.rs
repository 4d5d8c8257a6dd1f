//! Circuit breaker façade
//!
//! Serializes admission, the protected call, outcome reporting and
//! notification behind one lock per breaker, and drives the cooldown timer.
//!
//! The lock is held while the handler runs, so at most one protected call
//! proceeds at a time per breaker. This keeps the check-call-record sequence
//! atomic with respect to other callers and to the cooldown timer; callers
//! that need parallelism run one breaker per resource, or accept the
//! bottleneck.

use crate::{
    Aggregate, State,
    builder::CircuitBuilder,
    callbacks::Callbacks,
    classifier::{OutcomeContext, SuccessClassifier},
    config::Thresholds,
    cooldown::CooldownTimer,
    errors::{CircuitError, ConfigError},
    machine::{CircuitContext, StateMachine},
};
use parking_lot::Mutex;
use std::any::Any;
use std::sync::{Arc, Weak};

struct Inner {
    machine: StateMachine,
    classifier: Arc<dyn SuccessClassifier>,
    callbacks: Callbacks,
}

impl Inner {
    fn notify(&self, from: State, to: State) {
        tracing::info!(circuit = %self.machine.name(), %from, %to, "circuit state changed");
        self.callbacks
            .trigger(self.machine.name(), from, to, self.machine.aggregate());
    }
}

/// Circuit breaker public API
///
/// Cheap to share: wrap it in an [`Arc`] and call it from any thread.
pub struct CircuitBreaker {
    inner: Arc<Mutex<Inner>>,
    // spawned on the first trip; locked after `inner`
    timer: Mutex<Option<CooldownTimer>>,
}

impl CircuitBreaker {
    /// Create a circuit breaker over `context` (use builder() for more options)
    pub fn new(
        context: CircuitContext,
        classifier: Arc<dyn SuccessClassifier>,
        callbacks: Callbacks,
    ) -> Result<Self, ConfigError> {
        context.thresholds.validate()?;

        let inner = Inner {
            machine: StateMachine::new(context),
            classifier,
            callbacks,
        };
        Ok(Self {
            inner: Arc::new(Mutex::new(inner)),
            timer: Mutex::new(None),
        })
    }

    /// Create a new circuit breaker builder
    pub fn builder(name: impl Into<String>) -> CircuitBuilder {
        CircuitBuilder::new(name)
    }

    /// Run `f` under circuit protection
    ///
    /// Shorthand for `execute(Some(f))`.
    pub fn call<F, T, E>(&self, f: F) -> Result<T, CircuitError<E>>
    where
        F: FnOnce(&str) -> Result<T, E>,
        T: 'static,
        E: 'static,
    {
        self.execute(Some(f))
    }

    /// Run `handler` if the circuit admits requests
    ///
    /// - `None` fails with [`CircuitError::Config`] naming `handler`
    /// - While open, fails with [`CircuitError::NotPermitted`] carrying the
    ///   circuit name and state; the handler is not invoked
    /// - Otherwise the handler runs with the circuit name, its result is
    ///   classified and recorded, observers hear about any state change, and
    ///   the handler's own result comes back unchanged (errors wrapped in
    ///   [`CircuitError::Execution`])
    pub fn execute<F, T, E>(&self, handler: Option<F>) -> Result<T, CircuitError<E>>
    where
        F: FnOnce(&str) -> Result<T, E>,
        T: 'static,
        E: 'static,
    {
        let mut inner = self.inner.lock();

        let Some(handler) = handler else {
            return Err(ConfigError::InvalidParameter {
                param: "handler",
                value: "None".to_string(),
            }
            .into());
        };

        // The timer may not have fired yet
        if inner.machine.expire_cooldown() {
            inner.notify(State::Open, State::HalfOpen);
        }

        let prev = inner.machine.state();
        if !inner.machine.should_make_requests() {
            let rejected = inner.machine.not_permitted();
            tracing::warn!(circuit = %rejected.circuit, state = %rejected.state, "request not permitted");
            return Err(rejected.into());
        }

        let clock = Arc::clone(inner.machine.clock());
        let start = clock.monotonic_time();
        let result = handler(inner.machine.name());
        let duration = clock.monotonic_time() - start;

        let outcome = {
            let (response, error) = match &result {
                Ok(response) => (Some(response as &dyn Any), None),
                Err(error) => (None, Some(error as &dyn Any)),
            };
            let ctx = OutcomeContext {
                circuit_name: inner.machine.name(),
                response,
                error,
                duration,
            };
            inner.classifier.classify(&ctx)
        };

        match inner.machine.report_outcome(outcome) {
            Ok(state) if state != prev => self.after_transition(&inner, prev, state),
            Ok(_) => {}
            Err(rejected) => {
                tracing::warn!(circuit = %rejected.circuit, state = %rejected.state, "outcome dropped");
            }
        }

        result.map_err(CircuitError::Execution)
    }

    /// Clear the window and return to Closed without notifying observers
    pub fn reset(&self) {
        self.inner.lock().machine.reset();
    }

    /// Jump to `state`, bypassing threshold evaluation
    ///
    /// Observers are notified when the state actually changes. Forcing Open
    /// starts a fresh cooldown.
    pub fn force_state(&self, state: State) {
        let mut inner = self.inner.lock();
        let prev = inner.machine.state();
        inner.machine.transition_to(state);

        if prev != state {
            self.after_transition(&inner, prev, state);
        } else if state == State::Open {
            self.schedule_cooldown(&inner);
        }
    }

    pub fn name(&self) -> String {
        self.inner.lock().machine.name().to_string()
    }

    pub fn state(&self) -> State {
        self.inner.lock().machine.state()
    }

    /// Snapshot of the measurement window
    pub fn metrics(&self) -> Aggregate {
        self.inner.lock().machine.aggregate()
    }

    pub fn thresholds(&self) -> Thresholds {
        self.inner.lock().machine.thresholds().clone()
    }

    /// Probes counted in the current half-open episode
    pub fn half_open_probes(&self) -> usize {
        self.inner.lock().machine.half_open_probes()
    }

    pub fn is_open(&self) -> bool {
        self.state() == State::Open
    }

    pub fn is_closed(&self) -> bool {
        self.state() == State::Closed
    }

    pub fn is_half_open(&self) -> bool {
        self.state() == State::HalfOpen
    }

    fn after_transition(&self, inner: &Inner, from: State, to: State) {
        if to == State::Open {
            self.schedule_cooldown(inner);
        }
        inner.notify(from, to);
    }

    /// Point the cooldown timer at the current open episode
    fn schedule_cooldown(&self, inner: &Inner) {
        let (Some(opened_at), Some(wait)) =
            (inner.machine.opened_at(), inner.machine.cooldown_remaining())
        else {
            return;
        };

        let mut timer = self.timer.lock();
        if timer.is_none() {
            let weak = Arc::downgrade(&self.inner);
            match CooldownTimer::spawn(inner.machine.name(), move |opened_at| {
                fire_cooldown(&weak, opened_at)
            }) {
                Ok(spawned) => *timer = Some(spawned),
                Err(e) => {
                    tracing::error!(
                        circuit = %inner.machine.name(),
                        error = %e,
                        "failed to spawn cooldown timer; circuit half-opens on the next call after cooldown"
                    );
                    return;
                }
            }
        }

        if let Some(timer) = timer.as_ref()
            && !timer.arm(opened_at, wait)
        {
            tracing::warn!(
                circuit = %inner.machine.name(),
                wait,
                "cooldown out of timer range; circuit half-opens on the next call after cooldown"
            );
        }
    }
}

/// Half-open the circuit if `opened_at` is still its open episode
///
/// Returns the time left when the guard saw a hair less than the cooldown.
fn fire_cooldown(weak: &Weak<Mutex<Inner>>, opened_at: f64) -> Option<f64> {
    let inner = weak.upgrade()?;
    let mut inner = inner.lock();

    if inner.machine.opened_at() != Some(opened_at) {
        return None;
    }
    if inner.machine.expire_cooldown() {
        inner.notify(State::Open, State::HalfOpen);
        return None;
    }
    inner.machine.cooldown_remaining()
}

impl Drop for CircuitBreaker {
    fn drop(&mut self) {
        if let Some(mut timer) = self.timer.get_mut().take() {
            timer.stop();
        }
    }
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("CircuitBreaker")
            .field("machine", &inner.machine)
            .field("classifier", &inner.classifier)
            .field("callbacks", &inner.callbacks)
            .finish()
    }
}
