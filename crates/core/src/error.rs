use thiserror::Error;

use crate::model::{AttemptError, ParseIdError};

/// Umbrella error for callers that do not care which domain rule fired.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Attempt(#[from] AttemptError),
    #[error(transparent)]
    ParseId(#[from] ParseIdError),
}
