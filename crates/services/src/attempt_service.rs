//! Attempt lifecycle: starting, answering, pausing, resuming.
//!
//! Attempts are never deleted; abandoned ones simply stay live until a
//! later attempt supersedes them. Submission is the coordinator's job.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::Duration;
use tracing::{info, warn};

use prep_core::model::{Attempt, AttemptId, QuestionId, RawAnswer, TestId, UserId};
use prep_core::progression::{self, TestAvailability};
use prep_core::time::Clock;
use storage::repository::{ContentStore, ProgressStore, StorageError};

use crate::error::AttemptServiceError;

/// How many times a start re-reads and retries when a concurrent writer
/// wins the attempt-number or learner-pointer race.
const MAX_START_ATTEMPTS: u32 = 3;

/// Starts and mutates in-flight attempts.
pub struct AttemptService {
    progress: Arc<dyn ProgressStore>,
    content: Arc<dyn ContentStore>,
    clock: Clock,
    /// Stamped onto `expires_at` when set. Expiry is advisory; an expired
    /// attempt still submits.
    time_limit: Option<Duration>,
}

impl AttemptService {
    #[must_use]
    pub fn new(progress: Arc<dyn ProgressStore>, content: Arc<dyn ContentStore>) -> Self {
        Self {
            progress,
            content,
            clock: Clock::default(),
            time_limit: None,
        }
    }

    /// Override the clock (usually for deterministic testing).
    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Stamp started attempts with an expiry this far in the future.
    #[must_use]
    pub fn with_time_limit(mut self, limit: Duration) -> Self {
        self.time_limit = Some(limit);
        self
    }

    /// Starts a new attempt at a test the learner can reach.
    ///
    /// Allocates the next attempt number for the (user, test) pair and sets
    /// the learner's current-test pointer. Retakes of completed tests are
    /// allowed; only a locked test is refused. The store enforces attempt
    /// number uniqueness, so a concurrent start that allocated the same
    /// number surfaces as a conflict here; the whole read-allocate-create
    /// pass is retried from fresh state up to `MAX_START_ATTEMPTS` times.
    ///
    /// # Errors
    ///
    /// Returns `AttemptServiceError::Locked` if the progression gate refuses
    /// the test, `AttemptServiceError::TransientConflict` if every pass lost
    /// a race, or a storage error.
    pub async fn start_attempt(
        &self,
        user_id: UserId,
        test_id: TestId,
    ) -> Result<Attempt, AttemptServiceError> {
        for _ in 0..MAX_START_ATTEMPTS {
            let learner = self.progress.read_learner(user_id).await?.value;
            let attempts = self.progress.attempts_for_user(user_id).await?;

            let live: BTreeSet<TestId> = attempts
                .iter()
                .filter(|a| a.status().is_live())
                .map(Attempt::test_id)
                .collect();
            let availability = match self.content.sequence_for_grade(learner.grade()).await {
                Ok(sequence) => progression::availability(test_id, &sequence, &learner, &live),
                // No sequence for the grade: nothing is gated.
                Err(StorageError::NotFound) => TestAvailability::Available,
                Err(err) => return Err(err.into()),
            };
            if availability == TestAvailability::Locked {
                return Err(AttemptServiceError::Locked(test_id));
            }

            let attempt_number = attempts
                .iter()
                .filter(|a| a.test_id() == test_id)
                .map(Attempt::attempt_number)
                .max()
                .unwrap_or(0)
                + 1;

            let started_at = self.clock.now();
            let attempt = Attempt::start(
                AttemptId::generate(),
                test_id,
                user_id,
                attempt_number,
                started_at,
                self.time_limit.map(|limit| started_at + limit),
            );
            match self.progress.create_attempt(&attempt).await {
                Ok(()) => {
                    self.point_at(user_id, test_id).await?;
                    info!(%user_id, %test_id, attempt_number, "attempt started");
                    return Ok(attempt);
                }
                Err(StorageError::Conflict) => {
                    warn!(%user_id, %test_id, attempt_number, "attempt number taken, retrying");
                }
                Err(err) => return Err(err.into()),
            }
        }
        Err(AttemptServiceError::TransientConflict)
    }

    /// Points the learner at the test they just started.
    ///
    /// Retried on its own so a pointer race never orphans the attempt that
    /// was already created.
    async fn point_at(&self, user_id: UserId, test_id: TestId) -> Result<(), AttemptServiceError> {
        for _ in 0..MAX_START_ATTEMPTS {
            let versioned = self.progress.read_learner(user_id).await?;
            let mut learner = versioned.value;
            learner.set_current_test(test_id);
            match self
                .progress
                .update_learner(&learner, versioned.version)
                .await
            {
                Ok(()) => return Ok(()),
                Err(StorageError::Conflict) => {
                    warn!(%user_id, %test_id, "learner pointer raced, retrying");
                }
                Err(err) => return Err(err.into()),
            }
        }
        Err(AttemptServiceError::TransientConflict)
    }

    /// Records (or replaces) one answer on a live attempt.
    ///
    /// # Errors
    ///
    /// Returns `AttemptServiceError::NotOwner` for a foreign attempt,
    /// `AttemptServiceError::Attempt` if the attempt cannot take answers,
    /// or a storage error.
    pub async fn record_answer(
        &self,
        attempt_id: AttemptId,
        user_id: UserId,
        question_id: QuestionId,
        answer: RawAnswer,
    ) -> Result<(), AttemptServiceError> {
        self.mutate(attempt_id, user_id, |attempt| {
            attempt.record_answer(question_id, answer)
        })
        .await
    }

    /// Pauses a live attempt.
    ///
    /// # Errors
    ///
    /// Returns `AttemptServiceError` on an invalid transition or storage
    /// failure.
    pub async fn pause(
        &self,
        attempt_id: AttemptId,
        user_id: UserId,
    ) -> Result<(), AttemptServiceError> {
        self.mutate(attempt_id, user_id, Attempt::pause).await
    }

    /// Resumes a paused attempt.
    ///
    /// # Errors
    ///
    /// Returns `AttemptServiceError` on an invalid transition or storage
    /// failure.
    pub async fn resume(
        &self,
        attempt_id: AttemptId,
        user_id: UserId,
    ) -> Result<(), AttemptServiceError> {
        self.mutate(attempt_id, user_id, Attempt::resume).await
    }

    async fn mutate<F>(
        &self,
        attempt_id: AttemptId,
        user_id: UserId,
        apply: F,
    ) -> Result<(), AttemptServiceError>
    where
        F: FnOnce(&mut Attempt) -> Result<(), prep_core::model::AttemptError>,
    {
        let versioned = self.progress.read_attempt(attempt_id).await?;
        let mut attempt = versioned.value;
        if attempt.user_id() != user_id {
            return Err(AttemptServiceError::NotOwner);
        }
        apply(&mut attempt)?;
        self.progress
            .update_attempt(&attempt, versioned.version)
            .await?;
        Ok(())
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
