use prep_core::model::{
    AggregateKey, AnalyticsAggregate, Attempt, AttemptId, LearnerProgressionState, UserId,
};
use sqlx::{Sqlite, Transaction};

use super::SqliteStore;
use super::mapping::{
    aggregate_from_row, attempt_from_row, conn, learner_from_row, ser, u64_to_i64,
};
use crate::repository::{ProgressStore, StorageError, SubmissionCommit, Versioned};

/// Version-guarded attempt write. Zero rows affected means the guard lost;
/// a follow-up existence check tells a missing record apart from a stale one.
async fn guarded_attempt_update(
    tx: &mut Transaction<'_, Sqlite>,
    attempt: &Attempt,
    expected_version: u64,
) -> Result<(), StorageError> {
    let doc = serde_json::to_string(attempt).map_err(ser)?;
    let expected = u64_to_i64("version", expected_version)?;
    let result = sqlx::query(
        r"
        UPDATE attempts
        SET status = ?1, doc = ?2, version = version + 1
        WHERE id = ?3 AND version = ?4
        ",
    )
    .bind(attempt.status().as_str())
    .bind(doc)
    .bind(attempt.id().to_string())
    .bind(expected)
    .execute(&mut **tx)
    .await
    .map_err(conn)?;

    if result.rows_affected() == 1 {
        return Ok(());
    }
    let exists = sqlx::query("SELECT 1 FROM attempts WHERE id = ?1")
        .bind(attempt.id().to_string())
        .fetch_optional(&mut **tx)
        .await
        .map_err(conn)?;
    Err(if exists.is_some() {
        StorageError::Conflict
    } else {
        StorageError::NotFound
    })
}

async fn guarded_learner_update(
    tx: &mut Transaction<'_, Sqlite>,
    learner: &LearnerProgressionState,
    expected_version: u64,
) -> Result<(), StorageError> {
    let doc = serde_json::to_string(learner).map_err(ser)?;
    let user_id = u64_to_i64("user_id", learner.user_id().value())?;
    let total_xp = u64_to_i64("total_xp", learner.total_xp())?;
    let expected = u64_to_i64("version", expected_version)?;
    let result = sqlx::query(
        r"
        UPDATE learners
        SET total_xp = ?1, doc = ?2, version = version + 1
        WHERE user_id = ?3 AND version = ?4
        ",
    )
    .bind(total_xp)
    .bind(doc)
    .bind(user_id)
    .bind(expected)
    .execute(&mut **tx)
    .await
    .map_err(conn)?;

    if result.rows_affected() == 1 {
        return Ok(());
    }
    let exists = sqlx::query("SELECT 1 FROM learners WHERE user_id = ?1")
        .bind(user_id)
        .fetch_optional(&mut **tx)
        .await
        .map_err(conn)?;
    Err(if exists.is_some() {
        StorageError::Conflict
    } else {
        StorageError::NotFound
    })
}

#[async_trait::async_trait]
impl ProgressStore for SqliteStore {
    async fn create_attempt(&self, attempt: &Attempt) -> Result<(), StorageError> {
        let doc = serde_json::to_string(attempt).map_err(ser)?;
        let result = sqlx::query(
            r"
            INSERT INTO attempts (id, user_id, test_id, attempt_number, status, doc, version)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0)
            ON CONFLICT DO NOTHING
            ",
        )
        .bind(attempt.id().to_string())
        .bind(u64_to_i64("user_id", attempt.user_id().value())?)
        .bind(u64_to_i64("test_id", attempt.test_id().value())?)
        .bind(i64::from(attempt.attempt_number()))
        .bind(attempt.status().as_str())
        .bind(doc)
        .execute(self.pool())
        .await
        .map_err(conn)?;

        if result.rows_affected() == 0 {
            return Err(StorageError::Conflict);
        }
        Ok(())
    }

    async fn read_attempt(&self, id: AttemptId) -> Result<Versioned<Attempt>, StorageError> {
        let row = sqlx::query("SELECT doc, version FROM attempts WHERE id = ?1")
            .bind(id.to_string())
            .fetch_optional(self.pool())
            .await
            .map_err(conn)?
            .ok_or(StorageError::NotFound)?;
        let (attempt, version) = attempt_from_row(&row)?;
        Ok(Versioned::new(attempt, version))
    }

    async fn update_attempt(
        &self,
        attempt: &Attempt,
        expected_version: u64,
    ) -> Result<(), StorageError> {
        let mut tx = self.pool().begin().await.map_err(conn)?;
        guarded_attempt_update(&mut tx, attempt, expected_version).await?;
        tx.commit().await.map_err(conn)
    }

    async fn attempts_for_user(&self, user_id: UserId) -> Result<Vec<Attempt>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT doc, version FROM attempts
            WHERE user_id = ?1
            ORDER BY test_id, attempt_number
            ",
        )
        .bind(u64_to_i64("user_id", user_id.value())?)
        .fetch_all(self.pool())
        .await
        .map_err(conn)?;

        let mut attempts = Vec::with_capacity(rows.len());
        for row in rows {
            attempts.push(attempt_from_row(&row)?.0);
        }
        Ok(attempts)
    }

    async fn put_learner(&self, learner: &LearnerProgressionState) -> Result<(), StorageError> {
        let doc = serde_json::to_string(learner).map_err(ser)?;
        let result = sqlx::query(
            r"
            INSERT INTO learners (user_id, total_xp, doc, version)
            VALUES (?1, ?2, ?3, 0)
            ON CONFLICT(user_id) DO NOTHING
            ",
        )
        .bind(u64_to_i64("user_id", learner.user_id().value())?)
        .bind(u64_to_i64("total_xp", learner.total_xp())?)
        .bind(doc)
        .execute(self.pool())
        .await
        .map_err(conn)?;

        if result.rows_affected() == 0 {
            return Err(StorageError::Conflict);
        }
        Ok(())
    }

    async fn read_learner(
        &self,
        user_id: UserId,
    ) -> Result<Versioned<LearnerProgressionState>, StorageError> {
        let row = sqlx::query("SELECT doc, version FROM learners WHERE user_id = ?1")
            .bind(u64_to_i64("user_id", user_id.value())?)
            .fetch_optional(self.pool())
            .await
            .map_err(conn)?
            .ok_or(StorageError::NotFound)?;
        let (learner, version) = learner_from_row(&row)?;
        Ok(Versioned::new(learner, version))
    }

    async fn update_learner(
        &self,
        learner: &LearnerProgressionState,
        expected_version: u64,
    ) -> Result<(), StorageError> {
        let mut tx = self.pool().begin().await.map_err(conn)?;
        guarded_learner_update(&mut tx, learner, expected_version).await?;
        tx.commit().await.map_err(conn)
    }

    async fn list_learners(&self) -> Result<Vec<LearnerProgressionState>, StorageError> {
        let rows = sqlx::query("SELECT doc, version FROM learners ORDER BY user_id")
            .fetch_all(self.pool())
            .await
            .map_err(conn)?;

        let mut learners = Vec::with_capacity(rows.len());
        for row in rows {
            learners.push(learner_from_row(&row)?.0);
        }
        Ok(learners)
    }

    async fn read_aggregate(&self, key: &AggregateKey) -> Result<AnalyticsAggregate, StorageError> {
        let row = sqlx::query(
            r"
            SELECT attempt_count, total_time_spent_secs, total_score_sum, total_xp_awarded
            FROM analytics
            WHERE bucket_kind = ?1 AND bucket_key = ?2
            ",
        )
        .bind(key.kind())
        .bind(key.bucket())
        .fetch_optional(self.pool())
        .await
        .map_err(conn)?;

        match row {
            Some(row) => aggregate_from_row(&row),
            None => Ok(AnalyticsAggregate::default()),
        }
    }

    async fn commit(&self, commit: SubmissionCommit) -> Result<(), StorageError> {
        let mut tx = self.pool().begin().await.map_err(conn)?;

        // Either version guard failing rolls the whole transaction back.
        guarded_attempt_update(&mut tx, &commit.attempt, commit.attempt_version).await?;
        guarded_learner_update(&mut tx, &commit.learner, commit.learner_version).await?;

        for (key, delta) in &commit.analytics {
            sqlx::query(
                r"
                INSERT INTO analytics (
                    bucket_kind, bucket_key,
                    attempt_count, total_time_spent_secs, total_score_sum, total_xp_awarded
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                ON CONFLICT(bucket_kind, bucket_key) DO UPDATE SET
                    attempt_count = attempt_count + excluded.attempt_count,
                    total_time_spent_secs = total_time_spent_secs + excluded.total_time_spent_secs,
                    total_score_sum = total_score_sum + excluded.total_score_sum,
                    total_xp_awarded = total_xp_awarded + excluded.total_xp_awarded
                ",
            )
            .bind(key.kind())
            .bind(key.bucket())
            .bind(u64_to_i64("attempt_count", delta.attempt_count)?)
            .bind(u64_to_i64("time_spent_secs", delta.time_spent_secs)?)
            .bind(u64_to_i64("score_sum", delta.score_sum)?)
            .bind(u64_to_i64("xp_awarded", delta.xp_awarded)?)
            .execute(&mut *tx)
            .await
            .map_err(conn)?;
        }

        tx.commit().await.map_err(conn)
    }
}
