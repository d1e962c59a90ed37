use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::model::question::Grade;

//
// ─── AGGREGATE KEYS ────────────────────────────────────────────────────────────
//

/// Bucket a completed attempt rolls up into.
///
/// Every submission contributes to exactly one bucket of each kind: the
/// learner's grade, the test's category, and the calendar day.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AggregateKey {
    Grade(Grade),
    Category(String),
    Day(NaiveDate),
}

impl AggregateKey {
    /// Stable kind discriminator for keyed storage.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            AggregateKey::Grade(_) => "grade",
            AggregateKey::Category(_) => "category",
            AggregateKey::Day(_) => "day",
        }
    }

    /// Stable bucket value for keyed storage.
    #[must_use]
    pub fn bucket(&self) -> String {
        match self {
            AggregateKey::Grade(grade) => grade.to_string(),
            AggregateKey::Category(category) => category.clone(),
            AggregateKey::Day(day) => day.format("%Y-%m-%d").to_string(),
        }
    }
}

//
// ─── AGGREGATES ────────────────────────────────────────────────────────────────
//

/// Increment applied to one bucket by one submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateDelta {
    pub attempt_count: u64,
    pub time_spent_secs: u64,
    pub score_sum: u64,
    pub xp_awarded: u64,
}

impl AggregateDelta {
    /// Delta for one completed attempt.
    #[must_use]
    pub fn for_attempt(time_spent_secs: u64, score_percentage: u32, xp_awarded: u32) -> Self {
        Self {
            attempt_count: 1,
            time_spent_secs,
            score_sum: u64::from(score_percentage),
            xp_awarded: u64::from(xp_awarded),
        }
    }
}

/// Denormalized rollup counters for one bucket.
///
/// Only running sums are stored; averages are derived on read so the sums
/// remain the single source of truth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AnalyticsAggregate {
    pub attempt_count: u64,
    pub total_time_spent_secs: u64,
    pub total_score_sum: u64,
    pub total_xp_awarded: u64,
}

impl AnalyticsAggregate {
    /// Folds one increment into the counters.
    pub fn apply(&mut self, delta: &AggregateDelta) {
        self.attempt_count += delta.attempt_count;
        self.total_time_spent_secs += delta.time_spent_secs;
        self.total_score_sum += delta.score_sum;
        self.total_xp_awarded += delta.xp_awarded;
    }

    /// Average score percentage across attempts in this bucket.
    #[must_use]
    pub fn average_score(&self) -> f64 {
        if self.attempt_count == 0 {
            0.0
        } else {
            self.total_score_sum as f64 / self.attempt_count as f64
        }
    }

    /// Average seconds spent per attempt in this bucket.
    #[must_use]
    pub fn average_time_secs(&self) -> f64 {
        if self.attempt_count == 0 {
            0.0
        } else {
            self.total_time_spent_secs as f64 / self.attempt_count as f64
        }
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bucket_keys_are_stable() {
        assert_eq!(AggregateKey::Grade(Grade::new(3)).kind(), "grade");
        assert_eq!(AggregateKey::Grade(Grade::new(3)).bucket(), "3");
        assert_eq!(
            AggregateKey::Day(NaiveDate::from_ymd_opt(2024, 3, 9).unwrap()).bucket(),
            "2024-03-09"
        );
        assert_eq!(
            AggregateKey::Category("fractions".to_string()).bucket(),
            "fractions"
        );
    }

    #[test]
    fn averages_derive_from_sums() {
        let mut agg = AnalyticsAggregate::default();
        assert_eq!(agg.average_score(), 0.0);

        agg.apply(&AggregateDelta::for_attempt(300, 90, 75));
        agg.apply(&AggregateDelta::for_attempt(100, 70, 50));

        assert_eq!(agg.attempt_count, 2);
        assert_eq!(agg.average_score(), 80.0);
        assert_eq!(agg.average_time_secs(), 200.0);
        assert_eq!(agg.total_xp_awarded, 125);
    }
}
