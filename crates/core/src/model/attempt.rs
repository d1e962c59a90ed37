use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ids::{AttemptId, QuestionId, TestId, UserId};
use crate::model::question::RawAnswer;
use crate::scoring::ScoreReport;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

/// Errors raised by attempt state transitions.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum AttemptError {
    #[error("attempt is already completed and immutable")]
    AlreadyCompleted,

    #[error("invalid status transition from {from} to {to}")]
    InvalidTransition { from: AttemptStatus, to: AttemptStatus },

    #[error("answers can only be recorded while the attempt is in progress")]
    NotAnswerable,
}

//
// ─── STATUS ────────────────────────────────────────────────────────────────────
//

/// Lifecycle status of an attempt. Transitions move strictly forward,
/// except for the pause/resume pair; once `Completed` the attempt is frozen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AttemptStatus {
    NotStarted,
    InProgress,
    Paused,
    Completed,
}

impl AttemptStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            AttemptStatus::NotStarted => "not-started",
            AttemptStatus::InProgress => "in-progress",
            AttemptStatus::Paused => "paused",
            AttemptStatus::Completed => "completed",
        }
    }

    /// True for statuses where the learner is actively on the test.
    #[must_use]
    pub fn is_live(self) -> bool {
        matches!(self, AttemptStatus::InProgress | AttemptStatus::Paused)
    }
}

impl std::fmt::Display for AttemptStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

//
// ─── ATTEMPT ───────────────────────────────────────────────────────────────────
//

/// One answer as submitted, plus its correctness once scored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmittedAnswer {
    pub question_id: QuestionId,
    pub answer: RawAnswer,
    /// Set by scoring during submission; `None` until the attempt completes.
    pub correct: Option<bool>,
}

/// One learner's instance of taking one assessment.
///
/// Attempts are created when a learner starts a test, mutated only through
/// the methods here, and never deleted (audit trail). After `complete` the
/// record is immutable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attempt {
    id: AttemptId,
    test_id: TestId,
    user_id: UserId,
    /// Monotonic per (user, test) pair.
    attempt_number: u32,
    status: AttemptStatus,
    started_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    expires_at: Option<DateTime<Utc>>,
    /// Ordered answers keyed by question ID.
    answers: Vec<SubmittedAnswer>,
    report: Option<ScoreReport>,
}

impl Attempt {
    /// Starts a new attempt in `InProgress` status.
    #[must_use]
    pub fn start(
        id: AttemptId,
        test_id: TestId,
        user_id: UserId,
        attempt_number: u32,
        started_at: DateTime<Utc>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            id,
            test_id,
            user_id,
            attempt_number,
            status: AttemptStatus::InProgress,
            started_at,
            completed_at: None,
            expires_at,
            answers: Vec::new(),
            report: None,
        }
    }

    #[must_use]
    pub fn id(&self) -> AttemptId {
        self.id
    }

    #[must_use]
    pub fn test_id(&self) -> TestId {
        self.test_id
    }

    #[must_use]
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    #[must_use]
    pub fn attempt_number(&self) -> u32 {
        self.attempt_number
    }

    #[must_use]
    pub fn status(&self) -> AttemptStatus {
        self.status
    }

    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    #[must_use]
    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    #[must_use]
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    #[must_use]
    pub fn answers(&self) -> &[SubmittedAnswer] {
        &self.answers
    }

    /// Scored result, present once the attempt is completed.
    #[must_use]
    pub fn report(&self) -> Option<&ScoreReport> {
        self.report.as_ref()
    }

    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.status == AttemptStatus::Completed
    }

    /// Looks up the learner's answer for a question, if any was recorded.
    #[must_use]
    pub fn answer_for(&self, question_id: QuestionId) -> Option<&RawAnswer> {
        self.answers
            .iter()
            .find(|a| a.question_id == question_id)
            .map(|a| &a.answer)
    }

    /// Records (or replaces) an answer while the attempt is in progress.
    ///
    /// # Errors
    ///
    /// Returns `AttemptError::NotAnswerable` unless the attempt is `InProgress`.
    pub fn record_answer(
        &mut self,
        question_id: QuestionId,
        answer: RawAnswer,
    ) -> Result<(), AttemptError> {
        if self.status != AttemptStatus::InProgress {
            return Err(AttemptError::NotAnswerable);
        }
        if let Some(existing) = self.answers.iter_mut().find(|a| a.question_id == question_id) {
            existing.answer = answer;
            existing.correct = None;
        } else {
            self.answers.push(SubmittedAnswer {
                question_id,
                answer,
                correct: None,
            });
        }
        Ok(())
    }

    /// Pauses an in-progress attempt.
    ///
    /// # Errors
    ///
    /// Returns `AttemptError::InvalidTransition` unless the attempt is `InProgress`.
    pub fn pause(&mut self) -> Result<(), AttemptError> {
        match self.status {
            AttemptStatus::InProgress => {
                self.status = AttemptStatus::Paused;
                Ok(())
            }
            AttemptStatus::Completed => Err(AttemptError::AlreadyCompleted),
            from => Err(AttemptError::InvalidTransition {
                from,
                to: AttemptStatus::Paused,
            }),
        }
    }

    /// Resumes a paused attempt.
    ///
    /// # Errors
    ///
    /// Returns `AttemptError::InvalidTransition` unless the attempt is `Paused`.
    pub fn resume(&mut self) -> Result<(), AttemptError> {
        match self.status {
            AttemptStatus::Paused => {
                self.status = AttemptStatus::InProgress;
                Ok(())
            }
            AttemptStatus::Completed => Err(AttemptError::AlreadyCompleted),
            from => Err(AttemptError::InvalidTransition {
                from,
                to: AttemptStatus::InProgress,
            }),
        }
    }

    /// Marks the attempt completed with its scored result.
    ///
    /// Per-answer correctness from the report is folded back into the
    /// recorded answers. After this call the attempt is immutable.
    ///
    /// # Errors
    ///
    /// Returns `AttemptError::AlreadyCompleted` if called twice, or
    /// `AttemptError::InvalidTransition` from `NotStarted`.
    pub fn complete(
        &mut self,
        report: ScoreReport,
        completed_at: DateTime<Utc>,
    ) -> Result<(), AttemptError> {
        match self.status {
            AttemptStatus::Completed => Err(AttemptError::AlreadyCompleted),
            AttemptStatus::NotStarted => Err(AttemptError::InvalidTransition {
                from: self.status,
                to: AttemptStatus::Completed,
            }),
            AttemptStatus::InProgress | AttemptStatus::Paused => {
                for answer in &mut self.answers {
                    answer.correct = report.correctness_of(answer.question_id);
                }
                self.status = AttemptStatus::Completed;
                self.completed_at = Some(completed_at);
                self.report = Some(report);
                Ok(())
            }
        }
    }

    /// Whole seconds between start and completion (zero if incomplete or skewed).
    #[must_use]
    pub fn time_spent_secs(&self) -> u64 {
        let Some(done) = self.completed_at else {
            return 0;
        };
        (done - self.started_at).num_seconds().max(0) as u64
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scoring::ScoreReport;
    use crate::time::fixed_now;
    use chrono::Duration;

    fn attempt() -> Attempt {
        Attempt::start(
            AttemptId::generate(),
            TestId::new(1),
            UserId::new(7),
            1,
            fixed_now(),
            None,
        )
    }

    #[test]
    fn records_and_replaces_answers() {
        let mut a = attempt();
        a.record_answer(QuestionId::new(1), RawAnswer::text("a")).unwrap();
        a.record_answer(QuestionId::new(1), RawAnswer::text("b")).unwrap();
        assert_eq!(a.answers().len(), 1);
        assert_eq!(a.answer_for(QuestionId::new(1)), Some(&RawAnswer::text("b")));
    }

    #[test]
    fn pause_and_resume_round_trip() {
        let mut a = attempt();
        a.pause().unwrap();
        assert_eq!(a.status(), AttemptStatus::Paused);
        assert!(a.record_answer(QuestionId::new(1), RawAnswer::text("a")).is_err());
        a.resume().unwrap();
        assert_eq!(a.status(), AttemptStatus::InProgress);
    }

    #[test]
    fn complete_freezes_the_attempt() {
        let mut a = attempt();
        let done = fixed_now() + Duration::minutes(5);
        a.complete(ScoreReport::empty(), done).unwrap();

        assert!(a.is_completed());
        assert_eq!(a.completed_at(), Some(done));
        assert_eq!(a.time_spent_secs(), 300);

        assert_eq!(
            a.complete(ScoreReport::empty(), done),
            Err(AttemptError::AlreadyCompleted)
        );
        assert_eq!(a.pause(), Err(AttemptError::AlreadyCompleted));
        assert!(a.record_answer(QuestionId::new(1), RawAnswer::Empty).is_err());
    }

    #[test]
    fn paused_attempt_can_be_submitted() {
        let mut a = attempt();
        a.pause().unwrap();
        assert!(a.complete(ScoreReport::empty(), fixed_now()).is_ok());
    }

    #[test]
    fn status_strings_round_trip_serde() {
        let json = serde_json::to_string(&AttemptStatus::InProgress).unwrap();
        assert_eq!(json, "\"in-progress\"");
        let back: AttemptStatus = serde_json::from_str(&json).unwrap();
        assert_eq!(back, AttemptStatus::InProgress);
    }
}
