//! Sequencing logic for the prerequisite-gated unlock graph.
//!
//! Availability is always computed from learner state plus the sequence,
//! never stored as an independent flag that could drift. Unlocking the
//! successor requires completion of the predecessor, not mastery.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::model::{LearnerProgressionState, ProgressionSequence, TestId};

//
// ─── AVAILABILITY ──────────────────────────────────────────────────────────────
//

/// Computed status of one (learner, test) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TestAvailability {
    /// Predecessor in the sequence not yet completed.
    Locked,
    /// First in sequence, explicitly unlocked, or predecessor completed.
    Available,
    /// A live attempt exists, or this is the learner's current test.
    InProgress,
    /// Present in the learner's completed set.
    Completed,
}

/// One test's computed status within a sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestStatus {
    pub test_id: TestId,
    pub availability: TestAvailability,
}

/// Computes the availability of one test for one learner.
///
/// `live_tests` is the set of tests with an attempt currently in progress
/// or paused. Completion dominates every other signal; a completed test is
/// never reported as in-progress or locked.
#[must_use]
pub fn availability(
    test_id: TestId,
    sequence: &ProgressionSequence,
    learner: &LearnerProgressionState,
    live_tests: &BTreeSet<TestId>,
) -> TestAvailability {
    if learner.has_completed(test_id) {
        return TestAvailability::Completed;
    }
    if live_tests.contains(&test_id) || learner.current_test_id() == Some(test_id) {
        return TestAvailability::InProgress;
    }

    let unlocked = match sequence.position_of(test_id) {
        Some(0) => true,
        Some(_) => {
            learner.unlocked_test_ids().contains(&test_id)
                || sequence
                    .predecessor_of(test_id)
                    .is_some_and(|prev| learner.has_completed(prev))
        }
        // Not part of the sequence: only an explicit unlock opens it.
        None => learner.unlocked_test_ids().contains(&test_id),
    };

    if unlocked {
        TestAvailability::Available
    } else {
        TestAvailability::Locked
    }
}

/// Computes the status of every test in a sequence, in sequence order.
#[must_use]
pub fn sequence_statuses(
    sequence: &ProgressionSequence,
    learner: &LearnerProgressionState,
    live_tests: &BTreeSet<TestId>,
) -> Vec<TestStatus> {
    sequence
        .test_ids()
        .iter()
        .map(|&test_id| TestStatus {
            test_id,
            availability: availability(test_id, sequence, learner, live_tests),
        })
        .collect()
}

/// The successor to unlock when `just_completed` finishes, if any.
///
/// Returns `None` for the last test in the sequence, for tests outside the
/// sequence, and for successors the learner already unlocked or completed.
#[must_use]
pub fn next_unlock(
    sequence: &ProgressionSequence,
    learner: &LearnerProgressionState,
    just_completed: TestId,
) -> Option<TestId> {
    let successor = sequence.successor_of(just_completed)?;
    if learner.has_completed(successor) || learner.unlocked_test_ids().contains(&successor) {
        return None;
    }
    Some(successor)
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Grade, SubmissionEffects, UserId};
    use crate::gamification::StreakUpdate;
    use chrono::NaiveDate;

    fn sequence() -> ProgressionSequence {
        ProgressionSequence::new(
            Grade::new(3),
            vec![TestId::new(10), TestId::new(20), TestId::new(30)],
        )
    }

    fn learner() -> LearnerProgressionState {
        LearnerProgressionState::new(UserId::new(1), "Ada", Grade::new(3))
    }

    fn complete(learner: &mut LearnerProgressionState, test: TestId, unlocked: Option<TestId>) {
        learner.apply_submission(&SubmissionEffects {
            test_id: test,
            score_percentage: 80,
            xp_delta: 50,
            streak: StreakUpdate { current: 1, longest: 1 },
            activity_date: NaiveDate::from_ymd_opt(2024, 3, 9).unwrap(),
            new_badges: vec![],
            unlocked_test: unlocked,
        });
    }

    #[test]
    fn first_test_in_sequence_is_always_available() {
        let statuses = sequence_statuses(&sequence(), &learner(), &BTreeSet::new());
        assert_eq!(statuses[0].availability, TestAvailability::Available);
        assert_eq!(statuses[1].availability, TestAvailability::Locked);
        assert_eq!(statuses[2].availability, TestAvailability::Locked);
    }

    #[test]
    fn completing_predecessor_makes_successor_available() {
        let mut l = learner();
        complete(&mut l, TestId::new(10), None);

        let seq = sequence();
        assert_eq!(
            availability(TestId::new(10), &seq, &l, &BTreeSet::new()),
            TestAvailability::Completed
        );
        assert_eq!(
            availability(TestId::new(20), &seq, &l, &BTreeSet::new()),
            TestAvailability::Available
        );
        assert_eq!(
            availability(TestId::new(30), &seq, &l, &BTreeSet::new()),
            TestAvailability::Locked
        );
    }

    #[test]
    fn explicit_unlock_opens_a_later_test() {
        let mut l = learner();
        l.unlock_test(TestId::new(30));
        assert_eq!(
            availability(TestId::new(30), &sequence(), &l, &BTreeSet::new()),
            TestAvailability::Available
        );
    }

    #[test]
    fn live_attempt_shows_in_progress() {
        let live: BTreeSet<TestId> = [TestId::new(10)].into();
        assert_eq!(
            availability(TestId::new(10), &sequence(), &learner(), &live),
            TestAvailability::InProgress
        );
    }

    #[test]
    fn current_test_pointer_shows_in_progress() {
        let mut l = learner();
        l.set_current_test(TestId::new(10));
        assert_eq!(
            availability(TestId::new(10), &sequence(), &l, &BTreeSet::new()),
            TestAvailability::InProgress
        );
    }

    #[test]
    fn completion_dominates_live_attempts() {
        let mut l = learner();
        complete(&mut l, TestId::new(10), None);
        let live: BTreeSet<TestId> = [TestId::new(10)].into();
        assert_eq!(
            availability(TestId::new(10), &sequence(), &l, &live),
            TestAvailability::Completed
        );
    }

    #[test]
    fn next_unlock_walks_the_sequence() {
        let l = learner();
        let seq = sequence();
        assert_eq!(next_unlock(&seq, &l, TestId::new(10)), Some(TestId::new(20)));
        assert_eq!(next_unlock(&seq, &l, TestId::new(30)), None);
        assert_eq!(next_unlock(&seq, &l, TestId::new(99)), None);
    }

    #[test]
    fn next_unlock_skips_already_unlocked_successor() {
        let mut l = learner();
        l.unlock_test(TestId::new(20));
        assert_eq!(next_unlock(&sequence(), &l, TestId::new(10)), None);
    }
}
