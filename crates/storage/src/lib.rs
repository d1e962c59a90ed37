#![forbid(unsafe_code)]

pub mod repository;
pub mod sqlite;

pub use repository::{
    ContentStore, InMemoryContent, InMemoryStore, ProgressStore, StorageError, SubmissionCommit,
    Versioned,
};
pub use sqlite::{SqliteInitError, SqliteStore};
