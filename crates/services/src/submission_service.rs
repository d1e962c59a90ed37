//! The transactional submission coordinator.
//!
//! One submission turns an in-flight attempt into a completed one and
//! applies every downstream effect (score, XP, streak, badges, unlock,
//! analytics) in a single atomic commit. All computation is pure; only the
//! commit has side effects, so the whole cycle can be rerun from the top
//! when a concurrent submission wins the version race.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use prep_core::gamification::{
    self, BadgeMetrics, GamificationConfig, StreakUpdate, XpBreakdown,
};
use prep_core::model::{
    AggregateDelta, AggregateKey, AttemptId, SubmissionEffects, TestId, UserId,
};
use prep_core::progression;
use prep_core::scoring::{self, ScoreReport};
use prep_core::time::Clock;
use storage::repository::{ContentStore, ProgressStore, StorageError, SubmissionCommit};

use crate::error::SubmissionError;

/// Bounded retries for the read-compute-commit cycle on version conflicts.
const MAX_COMMIT_ATTEMPTS: u32 = 3;

//
// ─── OUTCOMES ──────────────────────────────────────────────────────────────────
//

/// Why a submission request was turned away without any effects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RejectReason {
    /// No attempt with the given ID exists.
    UnknownAttempt,
    /// The attempt belongs to a different learner.
    NotOwner,
    /// The attempt is not in a submittable status.
    NotSubmittable,
}

/// Everything one committed submission produced, for the caller's display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionReceipt {
    pub attempt_id: AttemptId,
    pub test_id: TestId,
    pub report: ScoreReport,
    pub xp: XpBreakdown,
    pub streak: StreakUpdate,
    pub new_badges: Vec<String>,
    pub unlocked_test: Option<TestId>,
    pub level_before: u32,
    pub level_after: u32,
}

/// Outcome of a submission request.
///
/// `AlreadyCompleted` is success-like: the effects were applied exactly
/// once by an earlier (or concurrent) submission and are not re-applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SubmissionOutcome {
    Committed(SubmissionReceipt),
    AlreadyCompleted,
    Rejected(RejectReason),
}

//
// ─── SERVICE ───────────────────────────────────────────────────────────────────
//

/// Coordinates scoring, gamification, progression, and the atomic commit.
pub struct SubmissionService {
    progress: Arc<dyn ProgressStore>,
    content: Arc<dyn ContentStore>,
    config: GamificationConfig,
    clock: Clock,
}

impl SubmissionService {
    #[must_use]
    pub fn new(progress: Arc<dyn ProgressStore>, content: Arc<dyn ContentStore>) -> Self {
        Self {
            progress,
            content,
            config: GamificationConfig::default(),
            clock: Clock::default(),
        }
    }

    /// Override the clock (usually for deterministic testing).
    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Override the XP tuning constants.
    #[must_use]
    pub fn with_config(mut self, config: GamificationConfig) -> Self {
        self.config = config;
        self
    }

    /// Submits an attempt for scoring and commits every effect atomically.
    ///
    /// Duplicate submissions, sequential or concurrent, apply the effects
    /// exactly once; every later duplicate observes `AlreadyCompleted`.
    ///
    /// # Errors
    ///
    /// Returns `SubmissionError::TransientConflict` after exhausting commit
    /// retries, or `SubmissionError::Storage` for store failures. Invalid
    /// requests are not errors; they return `SubmissionOutcome::Rejected`.
    pub async fn submit(
        &self,
        attempt_id: AttemptId,
        user_id: UserId,
    ) -> Result<SubmissionOutcome, SubmissionError> {
        for round in 1..=MAX_COMMIT_ATTEMPTS {
            match self.try_submit(attempt_id, user_id).await {
                Err(SubmissionError::Storage(StorageError::Conflict)) => {
                    warn!(%attempt_id, round, "submission commit lost a version race, retrying");
                }
                other => return other,
            }
        }
        warn!(%attempt_id, "submission exhausted its commit retries");
        Err(SubmissionError::TransientConflict)
    }

    /// One read-compute-commit cycle. A `StorageError::Conflict` from the
    /// final commit bubbles up so [`submit`](Self::submit) can rerun the
    /// whole cycle against fresh state.
    async fn try_submit(
        &self,
        attempt_id: AttemptId,
        user_id: UserId,
    ) -> Result<SubmissionOutcome, SubmissionError> {
        let versioned_attempt = match self.progress.read_attempt(attempt_id).await {
            Ok(found) => found,
            Err(StorageError::NotFound) => {
                return Ok(SubmissionOutcome::Rejected(RejectReason::UnknownAttempt));
            }
            Err(err) => return Err(err.into()),
        };
        let mut attempt = versioned_attempt.value;
        let attempt_version = versioned_attempt.version;

        if attempt.user_id() != user_id {
            return Ok(SubmissionOutcome::Rejected(RejectReason::NotOwner));
        }
        if attempt.is_completed() {
            debug!(%attempt_id, "attempt already completed, nothing to apply");
            return Ok(SubmissionOutcome::AlreadyCompleted);
        }
        if !attempt.status().is_live() {
            return Ok(SubmissionOutcome::Rejected(RejectReason::NotSubmittable));
        }

        let versioned_learner = self.progress.read_learner(user_id).await?;
        let mut learner = versioned_learner.value;
        let learner_version = versioned_learner.version;

        // The duplicate check rides the same versions the commit verifies:
        // a concurrent duplicate that slips past here loses at commit time,
        // rereads, and lands in this branch on its retry.
        let test_id = attempt.test_id();
        if learner.has_completed(test_id) {
            debug!(%attempt_id, %test_id, "test already completed, nothing to apply");
            return Ok(SubmissionOutcome::AlreadyCompleted);
        }

        let bank = self.content.question_bank(test_id).await?;
        let meta = self.content.test_meta(test_id).await?;

        let report = scoring::score(&attempt, &bank, meta.mastery_threshold);

        let now = self.clock.now();
        let today = self.clock.today();
        let elapsed_minutes = (now - attempt.started_at()).num_minutes();

        // Streak bonus pays for the streak held before this submission;
        // the calendar advance happens after.
        let xp = gamification::xp_award(
            &self.config,
            report.percentage,
            elapsed_minutes,
            learner.current_streak(),
        );
        let streak = gamification::advance_streak(
            learner.last_activity_date(),
            learner.current_streak(),
            learner.longest_streak(),
            today,
        );

        let earned = gamification::newly_earned_badges(
            learner.badges(),
            BadgeMetrics {
                tests_completed: learner.total_tests_completed() + 1,
                current_streak: streak.current,
                score_percentage: report.percentage,
            },
        );
        let new_badges: Vec<String> = earned.iter().map(|b| b.id.to_string()).collect();

        let unlocked_test = match self.content.sequence_for_grade(meta.grade).await {
            Ok(sequence) => progression::next_unlock(&sequence, &learner, test_id),
            // A test outside any sequence completes without unlocking.
            Err(StorageError::NotFound) => None,
            Err(err) => return Err(err.into()),
        };

        let level_before = learner.level();
        attempt.complete(report.clone(), now)?;
        learner.apply_submission(&SubmissionEffects {
            test_id,
            score_percentage: report.percentage,
            xp_delta: xp.total(),
            streak,
            activity_date: today,
            new_badges: new_badges.clone(),
            unlocked_test,
        });
        let level_after = learner.level();

        let delta =
            AggregateDelta::for_attempt(attempt.time_spent_secs(), report.percentage, xp.total());
        let analytics = vec![
            (AggregateKey::Grade(meta.grade), delta),
            (AggregateKey::Category(meta.category.clone()), delta),
            (AggregateKey::Day(today), delta),
        ];

        self.progress
            .commit(SubmissionCommit {
                attempt,
                attempt_version,
                learner,
                learner_version,
                analytics,
            })
            .await?;

        info!(
            %attempt_id,
            %test_id,
            %user_id,
            percentage = report.percentage,
            xp = xp.total(),
            streak = streak.current,
            "submission committed"
        );
        for badge in &new_badges {
            info!(%user_id, badge, "badge earned");
        }
        if let Some(next) = unlocked_test {
            info!(%user_id, unlocked = %next, "next test unlocked");
        }

        Ok(SubmissionOutcome::Committed(SubmissionReceipt {
            attempt_id,
            test_id,
            report,
            xp,
            streak,
            new_badges,
            unlocked_test,
            level_before,
            level_after,
        }))
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
