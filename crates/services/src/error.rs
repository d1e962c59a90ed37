//! Shared error types for the services crate.

use thiserror::Error;

use prep_core::model::{AttemptError, TestId};
use storage::repository::StorageError;

/// Errors emitted by `SubmissionService`.
///
/// Benign request problems (unknown attempt, wrong owner) are not errors;
/// they surface as `SubmissionOutcome::Rejected`. These variants are for
/// failures the caller may want to retry or report.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SubmissionError {
    /// Every commit attempt lost the version race; safe to retry later.
    #[error("submission kept conflicting with concurrent commits")]
    TransientConflict,
    #[error(transparent)]
    Attempt(#[from] AttemptError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted by `AttemptService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AttemptServiceError {
    #[error("test {0} is locked for this learner")]
    Locked(TestId),
    /// Every start attempt lost a race with concurrent writes; safe to
    /// retry later.
    #[error("attempt start kept conflicting with concurrent writes")]
    TransientConflict,
    #[error("attempt belongs to another learner")]
    NotOwner,
    #[error(transparent)]
    Attempt(#[from] AttemptError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted by the read-only query services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum QueryError {
    #[error(transparent)]
    Storage(#[from] StorageError),
}
