//! Rate-driven circuit state machine
//!
//! The lifecycle is declared with `state_machines` in dynamic mode:
//! - `trip`: Closed → Open when the window's failure rate is above the
//!   threshold, HalfOpen → Open when the probes failed to recover
//! - `attempt_reset`: Open → HalfOpen once the cooldown has elapsed
//! - `close`: HalfOpen → Closed when the probes recovered
//! - `force_*`: unguarded transitions for manual intervention
//!
//! [`StateMachine`] wraps the generated machine with the side effects of
//! each transition (cooldown bookkeeping, window and probe resets).

use crate::{
    Aggregate, Outcome, State,
    clock::{Clock, MonotonicClock},
    config::Thresholds,
    errors::RequestNotPermitted,
    window::{FixedWindow, Window},
};
use state_machines::state_machine;
use std::sync::Arc;

/// Shared data visible to every state and guard
#[derive(Clone)]
pub struct CircuitContext {
    pub name: String,
    pub thresholds: Thresholds,
    pub window: Arc<dyn Window>,
    pub clock: Arc<dyn Clock>,
}

impl Default for CircuitContext {
    fn default() -> Self {
        Self {
            name: String::new(),
            thresholds: Thresholds::default(),
            window: Arc::new(FixedWindow::default()),
            clock: Arc::new(MonotonicClock::new()),
        }
    }
}

impl std::fmt::Debug for CircuitContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitContext")
            .field("name", &self.name)
            .field("thresholds", &self.thresholds)
            .field("window", &self.window)
            .field("clock", &self.clock)
            .finish()
    }
}

/// Data specific to the Open state
#[derive(Debug, Clone, Default)]
pub struct OpenData {
    pub opened_at: f64,
    /// Cooldown drawn for this episode (jitter already applied)
    pub cooldown_secs: f64,
}

/// Data specific to the HalfOpen state
#[derive(Debug, Clone, Default)]
pub struct HalfOpenData {
    pub probes: usize,
}

state_machine! {
    name: Circuit,
    context: CircuitContext,
    dynamic: true,

    initial: Closed,
    states: [
        Closed,
        Open(OpenData),
        HalfOpen(HalfOpenData),
    ],
    events {
        trip {
            guards: [should_trip],
            transition: { from: [Closed, HalfOpen], to: Open }
        }
        attempt_reset {
            guards: [cooldown_elapsed],
            transition: { from: Open, to: HalfOpen }
        }
        close {
            guards: [should_close],
            transition: { from: HalfOpen, to: Closed }
        }
        force_open {
            transition: { from: [Closed, HalfOpen], to: Open }
        }
        force_half_open {
            transition: { from: [Closed, Open], to: HalfOpen }
        }
        force_close {
            transition: { from: [Open, HalfOpen], to: Closed }
        }
    }
}

impl Circuit<Closed> {
    /// Enough traffic and a failure rate strictly above the threshold
    fn should_trip(&self, ctx: &CircuitContext) -> bool {
        let aggregate = ctx.window.overall_aggregate();
        aggregate.request_count() >= ctx.thresholds.min_requests
            && aggregate.failure_rate() > ctx.thresholds.failure_rate
    }
}

impl Circuit<HalfOpen> {
    fn probes_exhausted(&self, ctx: &CircuitContext) -> bool {
        self.state_data_half_open()
            .is_some_and(|data| data.probes > ctx.thresholds.max_requests_on_half_open)
    }

    /// Probes are done and their success rate is below the recovery rate
    fn should_trip(&self, ctx: &CircuitContext) -> bool {
        self.probes_exhausted(ctx)
            && ctx.window.overall_aggregate().success_rate() < ctx.thresholds.recovery_rate
    }

    /// Probes are done and reached the recovery rate
    fn should_close(&self, ctx: &CircuitContext) -> bool {
        self.probes_exhausted(ctx)
            && ctx.window.overall_aggregate().success_rate() >= ctx.thresholds.recovery_rate
    }
}

impl Circuit<Open> {
    fn cooldown_elapsed(&self, ctx: &CircuitContext) -> bool {
        self.state_data_open().is_some_and(|data| {
            ctx.clock.monotonic_time() - data.opened_at >= data.cooldown_secs
        })
    }
}

/// The circuit's state plus the side effects of moving between states
///
/// Not synchronized on its own; [`CircuitBreaker`](crate::CircuitBreaker)
/// keeps it behind the breaker lock.
pub struct StateMachine {
    machine: DynamicCircuit,
    context: CircuitContext,
}

impl std::fmt::Debug for StateMachine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateMachine")
            .field("state", &self.machine.current_state())
            .field("context", &self.context)
            .finish()
    }
}

impl StateMachine {
    pub fn new(context: CircuitContext) -> Self {
        let machine = DynamicCircuit::new(context.clone());
        Self { machine, context }
    }

    pub fn name(&self) -> &str {
        &self.context.name
    }

    pub fn thresholds(&self) -> &Thresholds {
        &self.context.thresholds
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.context.clock
    }

    pub fn state(&self) -> State {
        State::from_name(self.machine.current_state())
    }

    /// Closed and HalfOpen admit requests, Open does not
    pub fn should_make_requests(&self) -> bool {
        self.state() != State::Open
    }

    /// Snapshot of the window
    pub fn aggregate(&self) -> Aggregate {
        self.context.window.overall_aggregate()
    }

    /// Probes counted in the current half-open episode, 0 in other states
    pub fn half_open_probes(&self) -> usize {
        self.machine.half_open_data().map_or(0, |data| data.probes)
    }

    /// When the current open episode started
    pub fn opened_at(&self) -> Option<f64> {
        self.machine.open_data().map(|data| data.opened_at)
    }

    /// Seconds left before the cooldown expires, `None` unless open
    pub fn cooldown_remaining(&self) -> Option<f64> {
        self.machine.open_data().map(|data| {
            let elapsed = self.context.clock.monotonic_time() - data.opened_at;
            (data.cooldown_secs - elapsed).max(0.0)
        })
    }

    pub(crate) fn not_permitted(&self) -> RequestNotPermitted {
        RequestNotPermitted {
            circuit: self.context.name.clone(),
            state: self.state(),
        }
    }

    /// Log one outcome and apply whatever transition it triggers
    ///
    /// Rejected without touching the window while the circuit is open.
    /// Returns the state after evaluation.
    pub fn report_outcome(&mut self, outcome: Outcome) -> Result<State, RequestNotPermitted> {
        if !self.should_make_requests() {
            return Err(self.not_permitted());
        }

        self.context.window.log_reading(outcome);

        let max_probes = self.context.thresholds.max_requests_on_half_open;
        if let Some(data) = self.machine.half_open_data_mut()
            && data.probes <= max_probes
        {
            data.probes += 1;
        }

        tracing::debug!(
            circuit = %self.context.name,
            ?outcome,
            state = %self.state(),
            "recorded outcome"
        );

        self.evaluate();
        Ok(self.state())
    }

    fn evaluate(&mut self) {
        match self.state() {
            State::Closed => {
                if self.machine.handle(CircuitEvent::Trip).is_ok() {
                    self.mark_open();
                }
            }
            State::HalfOpen => {
                if self.machine.handle(CircuitEvent::Close).is_ok() {
                    return;
                }
                if self.machine.handle(CircuitEvent::Trip).is_ok() {
                    self.mark_open();
                }
            }
            State::Open => {}
        }
    }

    /// Move Open → HalfOpen if the cooldown has run out
    ///
    /// Returns whether the transition happened.
    pub fn expire_cooldown(&mut self) -> bool {
        if self.state() != State::Open {
            return false;
        }
        if self.machine.handle(CircuitEvent::AttemptReset).is_ok() {
            self.enter_half_open();
            true
        } else {
            false
        }
    }

    /// Jump to `target` without evaluating thresholds
    ///
    /// The target's entry side effects still apply: opening restarts the
    /// cooldown, half-opening clears the window and probe counter. Forcing
    /// the current state re-applies them.
    pub fn transition_to(&mut self, target: State) {
        let current = self.state();
        if current == target {
            self.apply_entry_effects(target);
            return;
        }

        let (event, name) = match target {
            State::Open => (CircuitEvent::ForceOpen, "force_open"),
            State::HalfOpen => (CircuitEvent::ForceHalfOpen, "force_half_open"),
            State::Closed => (CircuitEvent::ForceClose, "force_close"),
        };
        if self.machine.handle(event).is_err() {
            tracing::warn!(circuit = %self.context.name, event = name, from = %current, "forced transition refused");
            return;
        }
        self.apply_entry_effects(target);
    }

    fn apply_entry_effects(&mut self, target: State) {
        match target {
            State::Open => self.mark_open(),
            State::HalfOpen => self.enter_half_open(),
            State::Closed => {}
        }
    }

    /// Back to Closed with an empty window
    pub fn reset(&mut self) {
        self.context.window.reset();
        self.machine = DynamicCircuit::new(self.context.clone());
    }

    /// Stamp the open episode with its start time and cooldown
    fn mark_open(&mut self) {
        let opened_at = self.context.clock.monotonic_time();
        let cooldown_secs = self.context.thresholds.effective_cooldown_secs();
        if let Some(data) = self.machine.open_data_mut() {
            data.opened_at = opened_at;
            data.cooldown_secs = cooldown_secs;
        }
    }

    /// Judge recovery on fresh traffic only
    fn enter_half_open(&mut self) {
        self.context.window.reset();
        if let Some(data) = self.machine.half_open_data_mut() {
            data.probes = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ManualClock;

    fn machine_with(
        thresholds: Thresholds,
        window_size: usize,
    ) -> (StateMachine, Arc<FixedWindow>, Arc<ManualClock>) {
        let window = Arc::new(FixedWindow::new(window_size).unwrap());
        let clock = Arc::new(ManualClock::new());
        let context = CircuitContext {
            name: "test_circuit".to_string(),
            thresholds,
            window: window.clone(),
            clock: clock.clone(),
        };
        (StateMachine::new(context), window, clock)
    }

    fn tripping_thresholds() -> Thresholds {
        Thresholds {
            failure_rate: 50.0,
            recovery_rate: 50.0,
            cooldown_secs: 10.0,
            max_requests_on_half_open: 2,
            min_requests: 1,
            jitter_factor: 0.0,
        }
    }

    fn open_machine() -> (StateMachine, Arc<FixedWindow>, Arc<ManualClock>) {
        let (mut machine, window, clock) = machine_with(tripping_thresholds(), 10);
        assert_eq!(machine.report_outcome(Outcome::Failure), Ok(State::Open));
        (machine, window, clock)
    }

    fn half_open_machine() -> (StateMachine, Arc<FixedWindow>, Arc<ManualClock>) {
        let (mut machine, window, clock) = open_machine();
        clock.advance(10.0);
        assert!(machine.expire_cooldown());
        (machine, window, clock)
    }

    #[test]
    fn test_starts_closed_and_admits() {
        let (machine, _, _) = machine_with(Thresholds::default(), 10);

        assert_eq!(machine.state(), State::Closed);
        assert!(machine.should_make_requests());
        assert_eq!(machine.opened_at(), None);
    }

    #[test]
    fn test_single_failure_trips_single_slot_window() {
        let (mut machine, window, _) = machine_with(tripping_thresholds(), 1);

        assert_eq!(machine.report_outcome(Outcome::Failure), Ok(State::Open));
        assert!(!machine.should_make_requests());

        let err = machine.report_outcome(Outcome::Success).unwrap_err();
        assert_eq!(err.circuit, "test_circuit");
        assert_eq!(err.state, State::Open);
        assert_eq!(machine.state(), State::Open);
        // the rejected outcome never reached the window
        assert_eq!(window.overall_aggregate(), Aggregate::from_counts(0, 1));
    }

    #[test]
    fn test_min_requests_gate() {
        let thresholds = Thresholds {
            min_requests: 5,
            ..tripping_thresholds()
        };
        let (mut machine, _, _) = machine_with(thresholds, 10);

        for _ in 0..4 {
            assert_eq!(machine.report_outcome(Outcome::Failure), Ok(State::Closed));
        }
        assert_eq!(machine.report_outcome(Outcome::Failure), Ok(State::Open));
    }

    #[test]
    fn test_failure_rate_equal_to_threshold_does_not_trip() {
        let thresholds = Thresholds {
            min_requests: 4,
            ..tripping_thresholds()
        };
        let (mut machine, _, _) = machine_with(thresholds, 10);

        machine.report_outcome(Outcome::Success).unwrap();
        machine.report_outcome(Outcome::Failure).unwrap();
        machine.report_outcome(Outcome::Success).unwrap();
        // 2 of 4 = exactly 50%
        assert_eq!(machine.report_outcome(Outcome::Failure), Ok(State::Closed));
        // 3 of 5 = 60%
        assert_eq!(machine.report_outcome(Outcome::Failure), Ok(State::Open));
    }

    #[test]
    fn test_cooldown_not_elapsed_stays_open() {
        let (mut machine, _, clock) = open_machine();

        clock.advance(9.0);
        assert!(!machine.expire_cooldown());
        assert_eq!(machine.state(), State::Open);
        assert_eq!(machine.cooldown_remaining(), Some(1.0));
    }

    #[test]
    fn test_cooldown_expiry_half_opens_with_empty_window() {
        let (machine, window, _) = half_open_machine();

        assert_eq!(machine.state(), State::HalfOpen);
        assert!(machine.should_make_requests());
        assert_eq!(machine.half_open_probes(), 0);
        assert_eq!(window.overall_aggregate().request_count(), 0);
        assert_eq!(machine.aggregate().request_count(), 0);
    }

    #[test]
    fn test_half_open_recovers_after_probes() {
        let (mut machine, _, _) = half_open_machine();

        assert_eq!(machine.report_outcome(Outcome::Success), Ok(State::HalfOpen));
        assert_eq!(machine.report_outcome(Outcome::Failure), Ok(State::HalfOpen));
        assert_eq!(machine.half_open_probes(), 2);
        // third probe exceeds the limit of 2; 2 of 3 succeeded
        assert_eq!(machine.report_outcome(Outcome::Success), Ok(State::Closed));
        assert_eq!(machine.half_open_probes(), 0);
    }

    #[test]
    fn test_recovery_rate_equal_to_threshold_closes() {
        let thresholds = Thresholds {
            max_requests_on_half_open: 1,
            ..tripping_thresholds()
        };
        let (mut machine, _, clock) = machine_with(thresholds, 10);
        machine.report_outcome(Outcome::Failure).unwrap();
        clock.advance(10.0);
        assert!(machine.expire_cooldown());

        machine.report_outcome(Outcome::Failure).unwrap();
        // 1 of 2 = exactly the 50% recovery rate
        assert_eq!(machine.report_outcome(Outcome::Success), Ok(State::Closed));
    }

    #[test]
    fn test_half_open_reopens_on_poor_probes() {
        let (mut machine, _, clock) = half_open_machine();
        clock.advance(1.0);

        machine.report_outcome(Outcome::Failure).unwrap();
        machine.report_outcome(Outcome::Failure).unwrap();
        assert_eq!(machine.report_outcome(Outcome::Success), Ok(State::Open));

        // cooldown restarted from the reopen
        assert_eq!(machine.opened_at(), Some(11.0));
        assert_eq!(machine.cooldown_remaining(), Some(10.0));
    }

    #[test]
    fn test_force_transitions() {
        let (mut machine, window, _) = machine_with(tripping_thresholds(), 10);
        window.log_reading(Outcome::Success);

        machine.transition_to(State::Open);
        assert_eq!(machine.state(), State::Open);
        assert!(machine.opened_at().is_some());

        machine.transition_to(State::HalfOpen);
        assert_eq!(machine.state(), State::HalfOpen);
        assert_eq!(window.overall_aggregate().request_count(), 0);

        machine.transition_to(State::Closed);
        assert_eq!(machine.state(), State::Closed);

        machine.transition_to(State::HalfOpen);
        assert_eq!(machine.state(), State::HalfOpen);
    }

    #[test]
    fn test_forcing_open_again_restarts_cooldown() {
        let (mut machine, _, clock) = open_machine();

        clock.advance(8.0);
        machine.transition_to(State::Open);

        assert_eq!(machine.opened_at(), Some(8.0));
        clock.advance(5.0);
        assert!(!machine.expire_cooldown());
    }

    #[test]
    fn test_reset_from_any_state() {
        for start in [State::Closed, State::Open, State::HalfOpen] {
            let (mut machine, window, _) = machine_with(tripping_thresholds(), 10);
            window.log_reading(Outcome::Failure);
            machine.transition_to(start);
            window.log_reading(Outcome::Failure);

            machine.reset();

            assert_eq!(machine.state(), State::Closed);
            assert_eq!(machine.aggregate(), Aggregate::default());
        }
    }

    #[test]
    fn test_jittered_cooldown_is_recorded_per_episode() {
        let thresholds = Thresholds {
            jitter_factor: 0.5,
            ..tripping_thresholds()
        };
        let (mut machine, _, _) = machine_with(thresholds, 10);
        machine.report_outcome(Outcome::Failure).unwrap();

        let remaining = machine.cooldown_remaining().unwrap();
        assert!((5.0..=10.0).contains(&remaining), "remaining {}", remaining);
    }
}
