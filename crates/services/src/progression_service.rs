//! Read-only progression projection for one learner.

use std::collections::BTreeSet;
use std::sync::Arc;

use prep_core::model::{Attempt, TestId, UserId};
use prep_core::progression::{self, TestStatus};
use storage::repository::{ContentStore, ProgressStore, StorageError};

use crate::error::QueryError;

/// Answers "which tests can this learner see, take, or retake".
pub struct ProgressionService {
    progress: Arc<dyn ProgressStore>,
    content: Arc<dyn ContentStore>,
}

impl ProgressionService {
    #[must_use]
    pub fn new(progress: Arc<dyn ProgressStore>, content: Arc<dyn ContentStore>) -> Self {
        Self { progress, content }
    }

    /// Status of every test in the learner's grade sequence, in order.
    ///
    /// Always evaluated fresh from learner state plus live attempts; never
    /// cached or stored. A grade without a sequence gates nothing, so it
    /// projects to an empty status list rather than an error.
    ///
    /// # Errors
    ///
    /// Returns `QueryError::Storage` if the learner or their attempts cannot
    /// be read.
    pub async fn progression_status(&self, user_id: UserId) -> Result<Vec<TestStatus>, QueryError> {
        let learner = self.progress.read_learner(user_id).await?.value;
        let attempts = self.progress.attempts_for_user(user_id).await?;
        let live: BTreeSet<TestId> = attempts
            .iter()
            .filter(|a| a.status().is_live())
            .map(Attempt::test_id)
            .collect();
        let sequence = match self.content.sequence_for_grade(learner.grade()).await {
            Ok(sequence) => sequence,
            Err(StorageError::NotFound) => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };
        Ok(progression::sequence_statuses(&sequence, &learner, &live))
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
