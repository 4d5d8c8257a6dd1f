//! Error types for circuit breaker operations
//!
//! Callers tell "the breaker blocked this call" apart from "the call itself
//! failed" by matching on [`CircuitError`]: rejections arrive as
//! [`CircuitError::NotPermitted`], the wrapped operation's own error arrives
//! untouched in [`CircuitError::Execution`].

use crate::State;
use std::error::Error as StdError;
use thiserror::Error;

/// A configuration value was rejected while building a breaker or window
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("invalid setting {param} value {value}")]
    InvalidParameter { param: &'static str, value: String },
}

impl ConfigError {
    pub(crate) fn invalid(param: &'static str, value: impl std::fmt::Debug) -> Self {
        ConfigError::InvalidParameter {
            param,
            value: format!("{:?}", value),
        }
    }

    /// Name of the offending parameter
    pub fn param(&self) -> &'static str {
        match self {
            ConfigError::InvalidParameter { param, .. } => param,
        }
    }
}

/// The breaker is not admitting requests in its current state
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("circuit breaker not permitting requests, name: {circuit}, state: {state}")]
pub struct RequestNotPermitted {
    pub circuit: String,
    pub state: State,
}

/// Reading a measurement from a window that has never logged anything
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum WindowError {
    #[error("no measurements taken yet")]
    Empty,
}

/// Errors returned by [`CircuitBreaker::execute`](crate::CircuitBreaker::execute)
#[derive(Debug, Error)]
pub enum CircuitError<E = Box<dyn StdError + Send + Sync>> {
    /// Circuit is open, the handler was not invoked
    #[error(transparent)]
    NotPermitted(#[from] RequestNotPermitted),
    /// The call was malformed, the handler was not invoked
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// The wrapped operation failed
    #[error("circuit execution failed: {0}")]
    Execution(#[source] E),
}

impl<E> CircuitError<E> {
    /// True when the breaker rejected the call without running it
    pub fn is_not_permitted(&self) -> bool {
        matches!(self, CircuitError::NotPermitted(_))
    }

    /// The wrapped operation's own error, if that is what this is
    pub fn into_execution(self) -> Option<E> {
        match self {
            CircuitError::Execution(e) => Some(e),
            _ => None,
        }
    }
}
