//! Success/failure tallies for a span of recorded outcomes

use crate::Outcome;

/// Counts of recorded outcomes and the rates derived from them
///
/// `request_count == success_count + failure_count` holds after every
/// operation. Windows keep one aggregate per slot or bucket plus a running
/// total, and use [`Aggregate::erase`] to take an evicted slot back out of
/// the total.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Aggregate {
    request_count: usize,
    success_count: usize,
    failure_count: usize,
}

impl Aggregate {
    /// Create an empty aggregate
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an aggregate from explicit success and failure counts
    pub fn from_counts(success_count: usize, failure_count: usize) -> Self {
        Self {
            request_count: success_count + failure_count,
            success_count,
            failure_count,
        }
    }

    pub fn request_count(&self) -> usize {
        self.request_count
    }

    pub fn success_count(&self) -> usize {
        self.success_count
    }

    pub fn failure_count(&self) -> usize {
        self.failure_count
    }

    pub fn is_empty(&self) -> bool {
        self.request_count == 0
    }

    /// Count one outcome
    pub fn record(&mut self, outcome: Outcome) {
        self.request_count += 1;
        match outcome {
            Outcome::Success => self.success_count += 1,
            Outcome::Failure => self.failure_count += 1,
        }
    }

    /// Subtract the counts of `other`, which must be part of this aggregate
    pub fn erase(&mut self, other: &Aggregate) {
        debug_assert!(
            self.success_count >= other.success_count
                && self.failure_count >= other.failure_count,
            "erasing {:?} from {:?} would go negative",
            other,
            self
        );
        self.request_count -= other.request_count;
        self.success_count -= other.success_count;
        self.failure_count -= other.failure_count;
    }

    /// Zero all counts
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Percentage of failed requests in `[0, 100]`, 0 when empty
    pub fn failure_rate(&self) -> f64 {
        percentage(self.failure_count, self.request_count)
    }

    /// Percentage of successful requests in `[0, 100]`, 0 when empty
    pub fn success_rate(&self) -> f64 {
        percentage(self.success_count, self.request_count)
    }
}

fn percentage(part: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        100.0 * part as f64 / total as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn outcome_strategy() -> impl Strategy<Value = Outcome> {
        prop_oneof![Just(Outcome::Success), Just(Outcome::Failure)]
    }

    #[test]
    fn test_empty_aggregate_rates_are_zero() {
        let aggregate = Aggregate::new();

        assert!(aggregate.is_empty());
        assert_eq!(aggregate.failure_rate(), 0.0);
        assert_eq!(aggregate.success_rate(), 0.0);
    }

    #[test]
    fn test_record_and_rates() {
        let mut aggregate = Aggregate::new();
        aggregate.record(Outcome::Success);
        aggregate.record(Outcome::Failure);
        aggregate.record(Outcome::Failure);
        aggregate.record(Outcome::Failure);

        assert_eq!(aggregate, Aggregate::from_counts(1, 3));
        assert_eq!(aggregate.failure_rate(), 75.0);
        assert_eq!(aggregate.success_rate(), 25.0);
    }

    #[test]
    fn test_erase_removes_exact_contribution() {
        let mut total = Aggregate::from_counts(4, 2);
        let slot = Aggregate::from_counts(1, 1);

        total.erase(&slot);

        assert_eq!(total, Aggregate::from_counts(3, 1));
        assert_eq!(total.request_count(), 4);
    }

    #[test]
    fn test_reset_zeroes_counts() {
        let mut aggregate = Aggregate::from_counts(7, 3);
        aggregate.reset();

        assert_eq!(aggregate, Aggregate::default());
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "would go negative")]
    fn test_erase_more_than_recorded_is_a_bug() {
        let mut total = Aggregate::from_counts(1, 0);
        total.erase(&Aggregate::from_counts(0, 1));
    }

    proptest! {
        #[test]
        fn prop_request_count_is_sum_of_parts(
            outcomes in proptest::collection::vec(outcome_strategy(), 0..200),
            erase_prefix in 0usize..200,
        ) {
            let mut total = Aggregate::new();
            let mut prefix = Aggregate::new();
            for (i, outcome) in outcomes.iter().enumerate() {
                total.record(*outcome);
                if i < erase_prefix {
                    prefix.record(*outcome);
                }
                prop_assert_eq!(
                    total.request_count(),
                    total.success_count() + total.failure_count()
                );
            }

            total.erase(&prefix);
            prop_assert_eq!(
                total.request_count(),
                total.success_count() + total.failure_count()
            );
            prop_assert_eq!(total.request_count(), outcomes.len() - prefix.request_count());
        }
    }
}
