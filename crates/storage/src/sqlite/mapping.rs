use prep_core::model::{AnalyticsAggregate, Attempt, LearnerProgressionState};
use sqlx::Row;

use crate::repository::StorageError;

pub(crate) fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

pub(crate) fn conn(e: sqlx::Error) -> StorageError {
    StorageError::Connection(e.to_string())
}

pub(crate) fn u64_to_i64(field: &'static str, v: u64) -> Result<i64, StorageError> {
    i64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} overflow")))
}

pub(crate) fn i64_to_u64(field: &'static str, v: i64) -> Result<u64, StorageError> {
    u64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} sign overflow")))
}

pub(crate) fn attempt_from_row(
    row: &sqlx::sqlite::SqliteRow,
) -> Result<(Attempt, u64), StorageError> {
    let doc: String = row.try_get("doc").map_err(ser)?;
    let attempt: Attempt = serde_json::from_str(&doc).map_err(ser)?;
    let version = i64_to_u64("version", row.try_get("version").map_err(ser)?)?;
    Ok((attempt, version))
}

pub(crate) fn learner_from_row(
    row: &sqlx::sqlite::SqliteRow,
) -> Result<(LearnerProgressionState, u64), StorageError> {
    let doc: String = row.try_get("doc").map_err(ser)?;
    let learner: LearnerProgressionState = serde_json::from_str(&doc).map_err(ser)?;
    let version = i64_to_u64("version", row.try_get("version").map_err(ser)?)?;
    Ok((learner, version))
}

pub(crate) fn aggregate_from_row(
    row: &sqlx::sqlite::SqliteRow,
) -> Result<AnalyticsAggregate, StorageError> {
    Ok(AnalyticsAggregate {
        attempt_count: i64_to_u64("attempt_count", row.try_get("attempt_count").map_err(ser)?)?,
        total_time_spent_secs: i64_to_u64(
            "total_time_spent_secs",
            row.try_get("total_time_spent_secs").map_err(ser)?,
        )?,
        total_score_sum: i64_to_u64(
            "total_score_sum",
            row.try_get("total_score_sum").map_err(ser)?,
        )?,
        total_xp_awarded: i64_to_u64(
            "total_xp_awarded",
            row.try_get("total_xp_awarded").map_err(ser)?,
        )?,
    })
}
