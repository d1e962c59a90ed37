use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::gamification::{StreakUpdate, level_from_xp};
use crate::model::ids::{TestId, UserId};
use crate::model::question::Grade;

//
// ─── SUBMISSION EFFECTS ────────────────────────────────────────────────────────
//

/// Everything one successful submission changes on a learner record.
///
/// Built by the coordinator from the pure calculators and applied in a
/// single step so the record never holds a partial update.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmissionEffects {
    pub test_id: TestId,
    pub score_percentage: u32,
    pub xp_delta: u32,
    pub streak: StreakUpdate,
    pub activity_date: NaiveDate,
    pub new_badges: Vec<String>,
    pub unlocked_test: Option<TestId>,
}

//
// ─── LEARNER PROGRESSION STATE ─────────────────────────────────────────────────
//

/// One record per learner: XP, streaks, badges, and unlock bookkeeping.
///
/// Fields are private so the invariants hold by construction: `total_xp`
/// only grows, badge and completed-test sets only gain members, and level
/// is always derived from XP rather than stored beside it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearnerProgressionState {
    user_id: UserId,
    display_name: String,
    grade: Grade,
    total_xp: u64,
    current_streak: u32,
    longest_streak: u32,
    last_activity_date: Option<NaiveDate>,
    badges: BTreeSet<String>,
    completed_test_ids: BTreeSet<TestId>,
    unlocked_test_ids: BTreeSet<TestId>,
    /// Test the learner is currently working through, if any.
    current_test_id: Option<TestId>,
    total_tests_completed: u32,
    /// Running sum of completed-test percentages; the average is derived.
    score_sum: u64,
}

impl LearnerProgressionState {
    /// Creates a zeroed record, as at account creation.
    #[must_use]
    pub fn new(user_id: UserId, display_name: impl Into<String>, grade: Grade) -> Self {
        Self {
            user_id,
            display_name: display_name.into(),
            grade,
            total_xp: 0,
            current_streak: 0,
            longest_streak: 0,
            last_activity_date: None,
            badges: BTreeSet::new(),
            completed_test_ids: BTreeSet::new(),
            unlocked_test_ids: BTreeSet::new(),
            current_test_id: None,
            total_tests_completed: 0,
            score_sum: 0,
        }
    }

    #[must_use]
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    #[must_use]
    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    #[must_use]
    pub fn grade(&self) -> Grade {
        self.grade
    }

    #[must_use]
    pub fn total_xp(&self) -> u64 {
        self.total_xp
    }

    /// Level is a pure function of cumulative XP, never stored.
    #[must_use]
    pub fn level(&self) -> u32 {
        level_from_xp(self.total_xp)
    }

    #[must_use]
    pub fn current_streak(&self) -> u32 {
        self.current_streak
    }

    #[must_use]
    pub fn longest_streak(&self) -> u32 {
        self.longest_streak
    }

    #[must_use]
    pub fn last_activity_date(&self) -> Option<NaiveDate> {
        self.last_activity_date
    }

    #[must_use]
    pub fn badges(&self) -> &BTreeSet<String> {
        &self.badges
    }

    #[must_use]
    pub fn completed_test_ids(&self) -> &BTreeSet<TestId> {
        &self.completed_test_ids
    }

    #[must_use]
    pub fn unlocked_test_ids(&self) -> &BTreeSet<TestId> {
        &self.unlocked_test_ids
    }

    #[must_use]
    pub fn current_test_id(&self) -> Option<TestId> {
        self.current_test_id
    }

    #[must_use]
    pub fn total_tests_completed(&self) -> u32 {
        self.total_tests_completed
    }

    /// Average completed-test percentage, derived from the running sum.
    #[must_use]
    pub fn average_score(&self) -> f64 {
        if self.total_tests_completed == 0 {
            0.0
        } else {
            self.score_sum as f64 / f64::from(self.total_tests_completed)
        }
    }

    #[must_use]
    pub fn has_completed(&self, test_id: TestId) -> bool {
        self.completed_test_ids.contains(&test_id)
    }

    #[must_use]
    pub fn has_badge(&self, badge_id: &str) -> bool {
        self.badges.contains(badge_id)
    }

    /// Marks a test as the one currently being worked on.
    pub fn set_current_test(&mut self, test_id: TestId) {
        self.current_test_id = Some(test_id);
    }

    /// Explicitly pre-unlocks a test outside the normal sequence flow.
    pub fn unlock_test(&mut self, test_id: TestId) {
        self.unlocked_test_ids.insert(test_id);
    }

    /// Applies one completed submission in a single step.
    ///
    /// The completed-test set only gains members, XP only grows, and the
    /// in-progress pointer is cleared together with everything else so no
    /// caller can observe half an update.
    pub fn apply_submission(&mut self, effects: &SubmissionEffects) {
        self.total_xp += u64::from(effects.xp_delta);
        self.current_streak = effects.streak.current;
        self.longest_streak = self.longest_streak.max(effects.streak.longest);
        self.last_activity_date = Some(effects.activity_date);
        for badge in &effects.new_badges {
            self.badges.insert(badge.clone());
        }
        if self.completed_test_ids.insert(effects.test_id) {
            self.total_tests_completed += 1;
            self.score_sum += u64::from(effects.score_percentage);
        }
        if let Some(unlocked) = effects.unlocked_test {
            self.unlocked_test_ids.insert(unlocked);
        }
        if self.current_test_id == Some(effects.test_id) {
            self.current_test_id = None;
        }
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
