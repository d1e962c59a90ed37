mod analytics;
mod attempt;
mod ids;
mod learner;
mod question;

pub use analytics::{AggregateDelta, AggregateKey, AnalyticsAggregate};
pub use attempt::{Attempt, AttemptError, AttemptStatus, SubmittedAnswer};
pub use ids::{AttemptId, ParseIdError, QuestionId, TestId, UserId};
pub use learner::{LearnerProgressionState, SubmissionEffects};
pub use question::{
    Grade, ProgressionSequence, Question, QuestionBank, RawAnswer, TestMeta,
};
