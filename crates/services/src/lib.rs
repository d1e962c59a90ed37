#![forbid(unsafe_code)]

pub mod attempt_service;
pub mod error;
pub mod leaderboard_service;
pub mod progression_service;
pub mod submission_service;

pub use prep_core::Clock;

pub use attempt_service::AttemptService;
pub use error::{AttemptServiceError, QueryError, SubmissionError};
pub use leaderboard_service::LeaderboardService;
pub use progression_service::ProgressionService;
pub use submission_service::{
    RejectReason, SubmissionOutcome, SubmissionReceipt, SubmissionService,
};
