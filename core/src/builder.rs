//! Builder API for ergonomic circuit breaker configuration

use crate::{
    Aggregate, State,
    callbacks::Callbacks,
    circuit::CircuitBreaker,
    classifier::{DefaultClassifier, OutcomeContext, PredicateClassifier, SuccessClassifier},
    clock::{Clock, MonotonicClock},
    config::Thresholds,
    errors::ConfigError,
    machine::CircuitContext,
    time_window::{DEFAULT_SWEEP_INTERVAL_SECS, TimeWindow},
    window::{DEFAULT_WINDOW_SIZE, FixedWindow, Window},
};
use std::sync::Arc;

#[derive(Debug)]
enum WindowChoice {
    Fixed(usize),
    Timed {
        retention_secs: f64,
        bucket_secs: f64,
    },
    Custom(Arc<dyn Window>),
}

/// Builder for creating circuit breakers with fluent API
///
/// Nothing is checked until [`CircuitBuilder::build`], which validates every
/// setting once and reports the first bad one by name.
pub struct CircuitBuilder {
    name: String,
    thresholds: Thresholds,
    window: WindowChoice,
    clock: Option<Arc<dyn Clock>>,
    classifier: Option<Arc<dyn SuccessClassifier>>,
    callbacks: Callbacks,
}

impl CircuitBuilder {
    /// Create a new builder for a circuit with the given name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            thresholds: Thresholds::default(),
            window: WindowChoice::Fixed(DEFAULT_WINDOW_SIZE),
            clock: None,
            classifier: None,
            callbacks: Callbacks::new(),
        }
    }

    /// Replace all thresholds at once
    pub fn thresholds(mut self, thresholds: Thresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    /// Set the failure rate (percent) above which the circuit opens
    pub fn failure_rate(mut self, rate: f64) -> Self {
        self.thresholds.failure_rate = rate;
        self
    }

    /// Set the success rate (percent) half-open probes need to close the circuit
    pub fn recovery_rate(mut self, rate: f64) -> Self {
        self.thresholds.recovery_rate = rate;
        self
    }

    /// Set the time spent open before probing, in seconds
    pub fn cooldown_secs(mut self, seconds: f64) -> Self {
        self.thresholds.cooldown_secs = seconds;
        self
    }

    /// Set the number of probes judged while half-open
    pub fn max_requests_on_half_open(mut self, probes: usize) -> Self {
        self.thresholds.max_requests_on_half_open = probes;
        self
    }

    /// Set the number of requests the window must hold before the circuit may open
    pub fn min_requests(mut self, requests: usize) -> Self {
        self.thresholds.min_requests = requests;
        self
    }

    /// Set the jitter factor (0.0 = no jitter, 1.0 = full jitter)
    /// Uses chrono-machines formula: cooldown * (1 - jitter + rand * jitter)
    pub fn jitter_factor(mut self, factor: f64) -> Self {
        self.thresholds.jitter_factor = factor;
        self
    }

    /// Measure over the last `window_size` outcomes (the default, with 100)
    pub fn fixed_window(mut self, window_size: usize) -> Self {
        self.window = WindowChoice::Fixed(window_size);
        self
    }

    /// Measure over the last `retention_secs`, in buckets of `bucket_secs`
    ///
    /// The window runs on the builder's clock and sweeps every 2 seconds.
    pub fn time_window(mut self, retention_secs: f64, bucket_secs: f64) -> Self {
        self.window = WindowChoice::Timed {
            retention_secs,
            bucket_secs,
        };
        self
    }

    /// Use a window built elsewhere
    pub fn window(mut self, window: Arc<dyn Window>) -> Self {
        self.window = WindowChoice::Custom(window);
        self
    }

    /// Set the time source for cooldowns and time windows
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Set the classifier deciding which results count as successes
    ///
    /// # Examples
    ///
    /// ```rust
    /// use rate_breaker::{CircuitBreaker, PredicateClassifier};
    /// use std::sync::Arc;
    ///
    /// let breaker = CircuitBreaker::builder("api")
    ///     .success_classifier(Arc::new(PredicateClassifier::new(|ctx| {
    ///         // Slow answers count against the dependency too
    ///         !ctx.is_error() && ctx.duration < 1.0
    ///     })))
    ///     .build()
    ///     .unwrap();
    /// ```
    pub fn success_classifier(mut self, classifier: Arc<dyn SuccessClassifier>) -> Self {
        self.classifier = Some(classifier);
        self
    }

    /// Shorthand for a closure-based [`PredicateClassifier`]
    pub fn is_successful<F>(self, predicate: F) -> Self
    where
        F: Fn(&OutcomeContext<'_>) -> bool + Send + Sync + 'static,
    {
        self.success_classifier(Arc::new(PredicateClassifier::new(predicate)))
    }

    /// Set callback for every state change
    pub fn on_state_change<F>(mut self, f: F) -> Self
    where
        F: Fn(&str, State, State, Aggregate) + Send + Sync + 'static,
    {
        self.callbacks.on_state_change = Some(Arc::new(f));
        self
    }

    /// Set callback for when circuit opens
    pub fn on_open<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.callbacks.on_open = Some(Arc::new(f));
        self
    }

    /// Set callback for when circuit closes
    pub fn on_close<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.callbacks.on_close = Some(Arc::new(f));
        self
    }

    /// Set callback for when circuit enters half-open
    pub fn on_half_open<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.callbacks.on_half_open = Some(Arc::new(f));
        self
    }

    /// Validate the settings and build the circuit breaker
    pub fn build(self) -> Result<CircuitBreaker, ConfigError> {
        self.thresholds.validate()?;

        let clock = self
            .clock
            .unwrap_or_else(|| Arc::new(MonotonicClock::new()));

        let window: Arc<dyn Window> = match self.window {
            WindowChoice::Fixed(window_size) => Arc::new(FixedWindow::new(window_size)?),
            WindowChoice::Timed {
                retention_secs,
                bucket_secs,
            } => Arc::new(TimeWindow::with_clock(
                retention_secs,
                bucket_secs,
                DEFAULT_SWEEP_INTERVAL_SECS,
                Arc::clone(&clock),
            )?),
            WindowChoice::Custom(window) => window,
        };

        let context = CircuitContext {
            name: self.name,
            thresholds: self.thresholds,
            window,
            clock,
        };
        let classifier = self
            .classifier
            .unwrap_or_else(|| Arc::new(DefaultClassifier));

        CircuitBreaker::new(context, classifier, self.callbacks)
    }
}

impl std::fmt::Debug for CircuitBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBuilder")
            .field("name", &self.name)
            .field("thresholds", &self.thresholds)
            .field("window", &self.window)
            .field("clock", &self.clock)
            .field("classifier", &self.classifier)
            .field("callbacks", &self.callbacks)
            .finish()
    }
}
