use chrono::Utc;
use sqlx::SqlitePool;

use super::SqliteInitError;

/// Runs a single, consolidated migration for the current schema.
///
/// Creates the full schema (attempts, learners, analytics rollups, and
/// indexes).
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), SqliteInitError> {
    async fn is_applied(pool: &SqlitePool, version: i64) -> Result<bool, sqlx::Error> {
        let row = sqlx::query("SELECT 1 FROM schema_migrations WHERE version = ?1")
            .bind(version)
            .fetch_optional(pool)
            .await?;
        Ok(row.is_some())
    }

    sqlx::query(
        r"
            CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            );
            ",
    )
    .execute(pool)
    .await?;

    // Version 1: full schema.
    if !is_applied(pool, 1).await? {
        let mut tx = pool.begin().await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS attempts (
                    id TEXT PRIMARY KEY,
                    user_id INTEGER NOT NULL,
                    test_id INTEGER NOT NULL,
                    attempt_number INTEGER NOT NULL CHECK (attempt_number >= 1),
                    status TEXT NOT NULL,
                    doc TEXT NOT NULL,
                    version INTEGER NOT NULL CHECK (version >= 0)
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS learners (
                    user_id INTEGER PRIMARY KEY,
                    total_xp INTEGER NOT NULL CHECK (total_xp >= 0),
                    doc TEXT NOT NULL,
                    version INTEGER NOT NULL CHECK (version >= 0)
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS analytics (
                    bucket_kind TEXT NOT NULL,
                    bucket_key TEXT NOT NULL,
                    attempt_count INTEGER NOT NULL CHECK (attempt_count >= 0),
                    total_time_spent_secs INTEGER NOT NULL CHECK (total_time_spent_secs >= 0),
                    total_score_sum INTEGER NOT NULL CHECK (total_score_sum >= 0),
                    total_xp_awarded INTEGER NOT NULL CHECK (total_xp_awarded >= 0),
                    PRIMARY KEY (bucket_kind, bucket_key)
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE UNIQUE INDEX IF NOT EXISTS idx_attempts_user_test
                    ON attempts (user_id, test_id, attempt_number);
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE INDEX IF NOT EXISTS idx_learners_total_xp
                    ON learners (total_xp);
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                INSERT INTO schema_migrations (version, applied_at)
                VALUES (?1, ?2)
                ON CONFLICT(version) DO NOTHING
            ",
        )
        .bind(1_i64)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
    }

    Ok(())
}
