//! Breaker thresholds and their validation

use crate::errors::ConfigError;
use std::time::Duration;

/// Default failure rate, in percent, above which a closed circuit opens
pub const DEFAULT_FAILURE_RATE: f64 = 10.0;

/// Default success rate, in percent, a half-open circuit needs to close
pub const DEFAULT_RECOVERY_RATE: f64 = 10.0;

/// Default time spent open before probing recovery
pub const DEFAULT_COOLDOWN_SECS: f64 = 30.0;

/// Default number of probe requests judged while half-open
pub const DEFAULT_MAX_REQUESTS_ON_HALF_OPEN: usize = 10;

/// Default number of requests in the window before the circuit may open
pub const DEFAULT_MIN_REQUESTS: usize = 10;

/// Limits driving the state transitions
///
/// Immutable once the breaker is built; [`Thresholds::validate`] runs once
/// at construction.
#[derive(Debug, Clone, PartialEq)]
pub struct Thresholds {
    /// Failure rate in `(0, 100]`; a closed circuit opens when the window's
    /// failure rate is strictly above it
    pub failure_rate: f64,

    /// Success rate in `(0, 100]`; a half-open circuit closes when the
    /// probes' success rate reaches it
    pub recovery_rate: f64,

    /// Seconds spent open before moving to half-open
    pub cooldown_secs: f64,

    /// Probe requests allowed before the half-open verdict
    pub max_requests_on_half_open: usize,

    /// Requests the window must hold before the failure rate is considered
    pub min_requests: usize,

    /// Jitter factor for the cooldown (0.0 = no jitter, 1.0 = full jitter)
    /// Uses chrono-machines formula: cooldown * (1 - jitter + rand * jitter)
    pub jitter_factor: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            failure_rate: DEFAULT_FAILURE_RATE,
            recovery_rate: DEFAULT_RECOVERY_RATE,
            cooldown_secs: DEFAULT_COOLDOWN_SECS,
            max_requests_on_half_open: DEFAULT_MAX_REQUESTS_ON_HALF_OPEN,
            min_requests: DEFAULT_MIN_REQUESTS,
            jitter_factor: 0.0,
        }
    }
}

impl Thresholds {
    /// Check every field, reporting the first invalid one
    pub fn validate(&self) -> Result<(), ConfigError> {
        // the cooldown timer waits on a Duration
        if !(self.cooldown_secs > 0.0 && Duration::try_from_secs_f64(self.cooldown_secs).is_ok()) {
            return Err(ConfigError::invalid("cooldown_secs", self.cooldown_secs));
        }
        if !is_percentage(self.failure_rate) {
            return Err(ConfigError::invalid("failure_rate", self.failure_rate));
        }
        if !is_percentage(self.recovery_rate) {
            return Err(ConfigError::invalid("recovery_rate", self.recovery_rate));
        }
        if self.max_requests_on_half_open == 0 {
            return Err(ConfigError::invalid(
                "max_requests_on_half_open",
                self.max_requests_on_half_open,
            ));
        }
        if !(0.0..=1.0).contains(&self.jitter_factor) {
            return Err(ConfigError::invalid("jitter_factor", self.jitter_factor));
        }
        Ok(())
    }

    /// Cooldown for one open episode, with jitter applied if configured
    pub(crate) fn effective_cooldown_secs(&self) -> f64 {
        if self.jitter_factor > 0.0 {
            let base_ms = (self.cooldown_secs * 1000.0) as u64;
            let policy = chrono_machines::Policy {
                max_attempts: 1,
                base_delay_ms: base_ms,
                multiplier: 1.0,
                max_delay_ms: base_ms,
            };
            let cooldown_ms = policy.calculate_delay(1, self.jitter_factor);
            (cooldown_ms as f64) / 1000.0
        } else {
            self.cooldown_secs
        }
    }
}

fn is_percentage(rate: f64) -> bool {
    rate > 0.0 && rate <= 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let thresholds = Thresholds::default();

        assert!(thresholds.validate().is_ok());
        assert_eq!(thresholds.failure_rate, 10.0);
        assert_eq!(thresholds.recovery_rate, 10.0);
        assert_eq!(thresholds.cooldown_secs, 30.0);
        assert_eq!(thresholds.max_requests_on_half_open, 10);
        assert_eq!(thresholds.min_requests, 10);
    }

    #[test]
    fn test_invalid_failure_rate() {
        for rate in [-1.0, 0.0, 100.5, f64::NAN] {
            let thresholds = Thresholds {
                failure_rate: rate,
                ..Default::default()
            };
            assert_eq!(thresholds.validate().unwrap_err().param(), "failure_rate");
        }
    }

    #[test]
    fn test_invalid_recovery_rate() {
        for rate in [-1.0, 0.0, 101.0] {
            let thresholds = Thresholds {
                recovery_rate: rate,
                ..Default::default()
            };
            assert_eq!(thresholds.validate().unwrap_err().param(), "recovery_rate");
        }
    }

    #[test]
    fn test_boundary_rates_accepted() {
        let thresholds = Thresholds {
            failure_rate: 100.0,
            recovery_rate: 100.0,
            min_requests: 0,
            ..Default::default()
        };
        assert!(thresholds.validate().is_ok());
    }

    #[test]
    fn test_invalid_cooldown() {
        for cooldown in [0.0, -5.0, f64::INFINITY, f64::NAN, 1e20] {
            let thresholds = Thresholds {
                cooldown_secs: cooldown,
                ..Default::default()
            };
            assert_eq!(thresholds.validate().unwrap_err().param(), "cooldown_secs");
        }
    }

    #[test]
    fn test_invalid_half_open_probes() {
        let thresholds = Thresholds {
            max_requests_on_half_open: 0,
            ..Default::default()
        };
        assert_eq!(
            thresholds.validate().unwrap_err().param(),
            "max_requests_on_half_open"
        );
    }

    #[test]
    fn test_invalid_jitter() {
        let thresholds = Thresholds {
            jitter_factor: 1.5,
            ..Default::default()
        };
        assert_eq!(thresholds.validate().unwrap_err().param(), "jitter_factor");
    }

    #[test]
    fn test_cooldown_without_jitter_is_exact() {
        let thresholds = Thresholds {
            cooldown_secs: 1.0,
            ..Default::default()
        };
        assert_eq!(thresholds.effective_cooldown_secs(), 1.0);
    }

    #[test]
    fn test_jittered_cooldown_stays_within_bounds() {
        let thresholds = Thresholds {
            cooldown_secs: 1.0,
            jitter_factor: 0.5,
            ..Default::default()
        };
        for _ in 0..50 {
            let cooldown = thresholds.effective_cooldown_secs();
            assert!((0.5..=1.0).contains(&cooldown), "cooldown {}", cooldown);
        }
    }
}
