//! Leaderboard queries over a full learner snapshot.

use std::sync::Arc;

use prep_core::leaderboard::{self, LeaderboardEntry};
use prep_core::model::UserId;
use storage::repository::ProgressStore;

use crate::error::QueryError;

/// Ranks learners by total XP. Purely derived; nothing is written back.
pub struct LeaderboardService {
    progress: Arc<dyn ProgressStore>,
}

impl LeaderboardService {
    #[must_use]
    pub fn new(progress: Arc<dyn ProgressStore>) -> Self {
        Self { progress }
    }

    /// The full board, recomputed from a consistent snapshot.
    ///
    /// # Errors
    ///
    /// Returns `QueryError::Storage` if the snapshot cannot be read.
    pub async fn rank(&self) -> Result<Vec<LeaderboardEntry>, QueryError> {
        let snapshot = self.progress.list_learners().await?;
        Ok(leaderboard::rank(&snapshot))
    }

    /// One learner's rank, even when the display windows to a top-N.
    ///
    /// # Errors
    ///
    /// Returns `QueryError::Storage` if the snapshot cannot be read.
    pub async fn rank_of(&self, user_id: UserId) -> Result<Option<u32>, QueryError> {
        let snapshot = self.progress.list_learners().await?;
        Ok(leaderboard::rank_of(user_id, &snapshot))
    }
}
