//! Observers for circuit breaker state transitions

use crate::{Aggregate, State};
use std::sync::Arc;

/// Observer receiving every transition: `(circuit, from, to, window snapshot)`
pub type StateChangeFn = Arc<dyn Fn(&str, State, State, Aggregate) + Send + Sync>;

/// Observer for one target state, receiving the circuit name
pub type StateHookFn = Arc<dyn Fn(&str) + Send + Sync>;

/// Callbacks for circuit breaker transitions
///
/// Invoked synchronously while the breaker's lock is held, so they must
/// return promptly and must not call back into the same breaker.
#[derive(Clone, Default)]
pub struct Callbacks {
    pub on_state_change: Option<StateChangeFn>,
    pub on_open: Option<StateHookFn>,
    pub on_close: Option<StateHookFn>,
    pub on_half_open: Option<StateHookFn>,
}

impl Callbacks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire the general observer, then the hook for the target state
    pub fn trigger(&self, circuit: &str, from: State, to: State, aggregate: Aggregate) {
        if let Some(ref callback) = self.on_state_change {
            callback(circuit, from, to, aggregate);
        }

        let hook = match to {
            State::Open => &self.on_open,
            State::Closed => &self.on_close,
            State::HalfOpen => &self.on_half_open,
        };
        if let Some(callback) = hook {
            callback(circuit);
        }
    }
}

impl std::fmt::Debug for Callbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Callbacks")
            .field("on_state_change", &self.on_state_change.is_some())
            .field("on_open", &self.on_open.is_some())
            .field("on_close", &self.on_close.is_some())
            .field("on_half_open", &self.on_half_open.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn test_trigger_without_callbacks_is_noop() {
        Callbacks::new().trigger("test", State::Closed, State::Open, Aggregate::default());
    }

    #[test]
    fn test_trigger_fires_general_then_target_hook() {
        let seen = Arc::new(Mutex::new(Vec::new()));

        let general = seen.clone();
        let opened = seen.clone();
        let closed = seen.clone();
        let callbacks = Callbacks {
            on_state_change: Some(Arc::new(move |name: &str, from: State, to: State, aggregate: Aggregate| {
                general.lock().push(format!(
                    "{} {}->{} {}",
                    name,
                    from,
                    to,
                    aggregate.failure_count()
                ));
            })),
            on_open: Some(Arc::new(move |name: &str| opened.lock().push(format!("open {}", name)))),
            on_close: Some(Arc::new(move |name: &str| closed.lock().push(format!("close {}", name)))),
            on_half_open: None,
        };

        callbacks.trigger("api", State::Closed, State::Open, Aggregate::from_counts(0, 2));
        callbacks.trigger("api", State::Open, State::HalfOpen, Aggregate::default());

        assert_eq!(
            *seen.lock(),
            vec![
                "api closed->open 2".to_string(),
                "open api".to_string(),
                "api open->half-open 0".to_string(),
            ]
        );
    }
}
