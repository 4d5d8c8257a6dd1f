//! Rate-based circuit breaker
//!
//! This crate guards calls to an unreliable dependency with:
//! - Rolling measurement windows: a fixed-size ring of the last N outcomes or
//!   time buckets that expire in the background
//! - A three-state machine (Closed → Open → HalfOpen) that trips on failure
//!   rate, cools down, then probes recovery on fresh traffic
//! - A thread-safe façade classifying each call's result and notifying
//!   observers of state changes
//!
//! # Example
//!
//! ```rust
//! use rate_breaker::{CircuitBreaker, CircuitError, State};
//!
//! let breaker = CircuitBreaker::builder("payments")
//!     .failure_rate(50.0)
//!     .min_requests(2)
//!     .fixed_window(10)
//!     .cooldown_secs(30.0)
//!     .on_open(|name| println!("Circuit {} opened!", name))
//!     .build()
//!     .expect("valid settings");
//!
//! for _ in 0..2 {
//!     let _ = breaker.call(|_name| Err::<(), _>("connection refused"));
//! }
//! assert_eq!(breaker.state(), State::Open);
//!
//! // Rejected without running the closure
//! let result = breaker.call(|_name| Ok::<_, String>("unreachable"));
//! assert!(matches!(result, Err(CircuitError::NotPermitted(_))));
//! ```

pub mod aggregate;
pub mod builder;
pub mod callbacks;
pub mod circuit;
pub mod classifier;
pub mod clock;
pub mod config;
mod cooldown;
pub mod errors;
pub mod machine;
pub mod time_window;
pub mod window;

pub use aggregate::Aggregate;
pub use builder::CircuitBuilder;
pub use callbacks::Callbacks;
pub use circuit::CircuitBreaker;
pub use classifier::{DefaultClassifier, OutcomeContext, PredicateClassifier, SuccessClassifier};
pub use clock::{Clock, ManualClock, MonotonicClock};
pub use config::Thresholds;
pub use errors::{CircuitError, ConfigError, RequestNotPermitted, WindowError};
pub use machine::StateMachine;
pub use time_window::TimeWindow;
pub use window::{FixedWindow, Window};

/// Classification of one call attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    Success,
    Failure,
}

/// Circuit breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum State {
    /// Requests flow, outcomes accumulate
    Closed,
    /// Requests are rejected until the cooldown expires
    Open,
    /// A limited number of probe requests decide recovery
    HalfOpen,
}

impl State {
    /// Map a state name reported by the underlying machine
    pub(crate) fn from_name(name: &str) -> Self {
        match name {
            "Closed" => State::Closed,
            "Open" => State::Open,
            "HalfOpen" => State::HalfOpen,
            other => {
                debug_assert!(false, "unknown circuit state name: {other}");
                State::Closed
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            State::Closed => "closed",
            State::Open => "open",
            State::HalfOpen => "half-open",
        }
    }
}

impl std::fmt::Display for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_names_from_machine() {
        assert_eq!(State::from_name("Closed"), State::Closed);
        assert_eq!(State::from_name("Open"), State::Open);
        assert_eq!(State::from_name("HalfOpen"), State::HalfOpen);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "unknown circuit state name")]
    fn test_unknown_state_name_asserts() {
        State::from_name("Half_Open");
    }
}
