//! Outcome classification
//!
//! Decides whether a finished call counts as a success or a failure for the
//! breaker's window. The call's result itself is handed back to the caller
//! unchanged either way.

use crate::Outcome;
use std::any::Any;

/// What a classifier gets to look at for one finished call
#[derive(Debug)]
pub struct OutcomeContext<'a> {
    /// Circuit name
    pub circuit_name: &'a str,
    /// The handler's response, when it returned `Ok` (can be downcast)
    pub response: Option<&'a dyn Any>,
    /// The handler's error, when it returned `Err` (can be downcast)
    pub error: Option<&'a dyn Any>,
    /// Duration of the call in seconds
    pub duration: f64,
}

impl OutcomeContext<'_> {
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Success predicate over a finished call
///
/// # Examples
///
/// ```rust
/// use rate_breaker::{OutcomeContext, SuccessClassifier};
///
/// #[derive(Debug)]
/// struct FastAndOk;
///
/// impl SuccessClassifier for FastAndOk {
///     fn is_successful(&self, ctx: &OutcomeContext<'_>) -> bool {
///         !ctx.is_error() && ctx.duration < 2.0
///     }
/// }
/// ```
pub trait SuccessClassifier: Send + Sync + std::fmt::Debug {
    /// Returns `true` if the call should be logged as a success
    fn is_successful(&self, ctx: &OutcomeContext<'_>) -> bool;

    fn classify(&self, ctx: &OutcomeContext<'_>) -> Outcome {
        if self.is_successful(ctx) {
            Outcome::Success
        } else {
            Outcome::Failure
        }
    }
}

/// A call succeeded when no error occurred
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultClassifier;

impl SuccessClassifier for DefaultClassifier {
    fn is_successful(&self, ctx: &OutcomeContext<'_>) -> bool {
        !ctx.is_error()
    }
}

/// Predicate-based classifier using a closure
pub struct PredicateClassifier<F>
where
    F: Fn(&OutcomeContext<'_>) -> bool + Send + Sync,
{
    predicate: F,
}

impl<F> PredicateClassifier<F>
where
    F: Fn(&OutcomeContext<'_>) -> bool + Send + Sync,
{
    pub fn new(predicate: F) -> Self {
        Self { predicate }
    }
}

impl<F> SuccessClassifier for PredicateClassifier<F>
where
    F: Fn(&OutcomeContext<'_>) -> bool + Send + Sync,
{
    fn is_successful(&self, ctx: &OutcomeContext<'_>) -> bool {
        (self.predicate)(ctx)
    }
}

impl<F> std::fmt::Debug for PredicateClassifier<F>
where
    F: Fn(&OutcomeContext<'_>) -> bool + Send + Sync,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PredicateClassifier")
            .field("predicate", &"<closure>")
            .finish()
    }
}
