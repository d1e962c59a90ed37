use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;

use prep_core::model::{
    AggregateDelta, AggregateKey, AnalyticsAggregate, Attempt, AttemptId, Grade,
    LearnerProgressionState, ProgressionSequence, QuestionBank, TestId, TestMeta, UserId,
};

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    /// A concurrent writer committed against the same record first.
    #[error("conflict")]
    Conflict,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// A record together with its optimistic-concurrency version.
///
/// `commit` verifies the version still matches before writing; a stale
/// version means a concurrent submission won the race and the caller must
/// re-read and recompute.
#[derive(Debug, Clone, PartialEq)]
pub struct Versioned<T> {
    pub value: T,
    pub version: u64,
}

impl<T> Versioned<T> {
    #[must_use]
    pub fn new(value: T, version: u64) -> Self {
        Self { value, version }
    }
}

/// Everything one submission writes, applied atomically or not at all.
///
/// The attempt and learner carry the versions they were read at; analytics
/// buckets are increment-only and need no version (the increments are
/// folded inside the same atomic unit, so none can be lost).
#[derive(Debug, Clone)]
pub struct SubmissionCommit {
    pub attempt: Attempt,
    pub attempt_version: u64,
    pub learner: LearnerProgressionState,
    pub learner_version: u64,
    pub analytics: Vec<(AggregateKey, AggregateDelta)>,
}

//
// ─── PROGRESS STORE ────────────────────────────────────────────────────────────
//

/// Durable store for attempts, learner state, and analytics rollups.
///
/// The contract is a narrow read-for-update / commit pair with optimistic
/// conflict detection, so the coordinator's retry logic can be exercised
/// against [`InMemoryStore`] exactly as it behaves against SQLite.
#[async_trait]
pub trait ProgressStore: Send + Sync {
    /// Persists a freshly started attempt.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if the attempt ID already exists.
    async fn create_attempt(&self, attempt: &Attempt) -> Result<(), StorageError>;

    /// Reads an attempt together with its version.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if missing.
    async fn read_attempt(&self, id: AttemptId) -> Result<Versioned<Attempt>, StorageError>;

    /// Writes back an attempt mutated outside submission (pause/resume).
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` on a stale version.
    async fn update_attempt(
        &self,
        attempt: &Attempt,
        expected_version: u64,
    ) -> Result<(), StorageError>;

    /// All attempts belonging to one learner, in creation order.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the store is unreachable.
    async fn attempts_for_user(&self, user_id: UserId) -> Result<Vec<Attempt>, StorageError>;

    /// Creates a learner record at account creation.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if the learner already exists.
    async fn put_learner(&self, learner: &LearnerProgressionState) -> Result<(), StorageError>;

    /// Reads a learner record together with its version.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if missing.
    async fn read_learner(
        &self,
        user_id: UserId,
    ) -> Result<Versioned<LearnerProgressionState>, StorageError>;

    /// Writes back a learner mutated outside submission (current-test pointer).
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` on a stale version.
    async fn update_learner(
        &self,
        learner: &LearnerProgressionState,
        expected_version: u64,
    ) -> Result<(), StorageError>;

    /// Full snapshot of every learner record.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the store is unreachable.
    async fn list_learners(&self) -> Result<Vec<LearnerProgressionState>, StorageError>;

    /// Current counters for one analytics bucket (zeroed when untouched).
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the store is unreachable.
    async fn read_aggregate(&self, key: &AggregateKey) -> Result<AnalyticsAggregate, StorageError>;

    /// Applies one submission atomically.
    ///
    /// Either every write lands (attempt, learner, all analytics
    /// increments) or none do; readers never observe a partial mix.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if either expected version is stale.
    async fn commit(&self, commit: SubmissionCommit) -> Result<(), StorageError>;
}

//
// ─── CONTENT STORE ─────────────────────────────────────────────────────────────
//

/// Read-only assessment content: question banks, metadata, sequences.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Question bank for one assessment.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` for an unknown test.
    async fn question_bank(&self, test_id: TestId) -> Result<QuestionBank, StorageError>;

    /// Metadata (grade, category, mastery threshold) for one assessment.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` for an unknown test.
    async fn test_meta(&self, test_id: TestId) -> Result<TestMeta, StorageError>;

    /// Ordered progression sequence for a grade/track.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` for an unknown grade.
    async fn sequence_for_grade(&self, grade: Grade) -> Result<ProgressionSequence, StorageError>;
}

//
// ─── IN-MEMORY STORE ───────────────────────────────────────────────────────────
//

#[derive(Default)]
struct StoreInner {
    attempts: HashMap<AttemptId, (Attempt, u64)>,
    learners: HashMap<UserId, (LearnerProgressionState, u64)>,
    aggregates: HashMap<AggregateKey, AnalyticsAggregate>,
}

/// In-memory store for testing and prototyping.
///
/// A single mutex makes every commit atomic; version checks give the same
/// optimistic-conflict behavior the SQLite adapter has, so coordinator
/// retry paths can be tested without a database.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    inner: Arc<Mutex<StoreInner>>,
}

impl InMemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, StoreInner>, StorageError> {
        self.inner
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))
    }
}

#[async_trait]
impl ProgressStore for InMemoryStore {
    async fn create_attempt(&self, attempt: &Attempt) -> Result<(), StorageError> {
        let mut guard = self.lock()?;
        if guard.attempts.contains_key(&attempt.id()) {
            return Err(StorageError::Conflict);
        }
        // (user, test, attempt_number) is unique; concurrent starts that
        // allocated the same number lose here and re-read.
        let number_taken = guard.attempts.values().any(|(existing, _)| {
            existing.user_id() == attempt.user_id()
                && existing.test_id() == attempt.test_id()
                && existing.attempt_number() == attempt.attempt_number()
        });
        if number_taken {
            return Err(StorageError::Conflict);
        }
        guard.attempts.insert(attempt.id(), (attempt.clone(), 0));
        Ok(())
    }

    async fn read_attempt(&self, id: AttemptId) -> Result<Versioned<Attempt>, StorageError> {
        let guard = self.lock()?;
        guard
            .attempts
            .get(&id)
            .map(|(attempt, version)| Versioned::new(attempt.clone(), *version))
            .ok_or(StorageError::NotFound)
    }

    async fn update_attempt(
        &self,
        attempt: &Attempt,
        expected_version: u64,
    ) -> Result<(), StorageError> {
        let mut guard = self.lock()?;
        let entry = guard
            .attempts
            .get_mut(&attempt.id())
            .ok_or(StorageError::NotFound)?;
        if entry.1 != expected_version {
            return Err(StorageError::Conflict);
        }
        *entry = (attempt.clone(), expected_version + 1);
        Ok(())
    }

    async fn attempts_for_user(&self, user_id: UserId) -> Result<Vec<Attempt>, StorageError> {
        let guard = self.lock()?;
        let mut attempts: Vec<Attempt> = guard
            .attempts
            .values()
            .filter(|(a, _)| a.user_id() == user_id)
            .map(|(a, _)| a.clone())
            .collect();
        attempts.sort_by_key(|a| (a.test_id(), a.attempt_number()));
        Ok(attempts)
    }

    async fn put_learner(&self, learner: &LearnerProgressionState) -> Result<(), StorageError> {
        let mut guard = self.lock()?;
        if guard.learners.contains_key(&learner.user_id()) {
            return Err(StorageError::Conflict);
        }
        guard.learners.insert(learner.user_id(), (learner.clone(), 0));
        Ok(())
    }

    async fn read_learner(
        &self,
        user_id: UserId,
    ) -> Result<Versioned<LearnerProgressionState>, StorageError> {
        let guard = self.lock()?;
        guard
            .learners
            .get(&user_id)
            .map(|(learner, version)| Versioned::new(learner.clone(), *version))
            .ok_or(StorageError::NotFound)
    }

    async fn update_learner(
        &self,
        learner: &LearnerProgressionState,
        expected_version: u64,
    ) -> Result<(), StorageError> {
        let mut guard = self.lock()?;
        let entry = guard
            .learners
            .get_mut(&learner.user_id())
            .ok_or(StorageError::NotFound)?;
        if entry.1 != expected_version {
            return Err(StorageError::Conflict);
        }
        *entry = (learner.clone(), expected_version + 1);
        Ok(())
    }

    async fn list_learners(&self) -> Result<Vec<LearnerProgressionState>, StorageError> {
        let guard = self.lock()?;
        let mut learners: Vec<LearnerProgressionState> =
            guard.learners.values().map(|(l, _)| l.clone()).collect();
        learners.sort_by_key(LearnerProgressionState::user_id);
        Ok(learners)
    }

    async fn read_aggregate(&self, key: &AggregateKey) -> Result<AnalyticsAggregate, StorageError> {
        let guard = self.lock()?;
        Ok(guard.aggregates.get(key).copied().unwrap_or_default())
    }

    async fn commit(&self, commit: SubmissionCommit) -> Result<(), StorageError> {
        let mut guard = self.lock()?;

        // Validate both versions before touching anything.
        let attempt_entry = guard
            .attempts
            .get(&commit.attempt.id())
            .ok_or(StorageError::NotFound)?;
        if attempt_entry.1 != commit.attempt_version {
            return Err(StorageError::Conflict);
        }
        let learner_entry = guard
            .learners
            .get(&commit.learner.user_id())
            .ok_or(StorageError::NotFound)?;
        if learner_entry.1 != commit.learner_version {
            return Err(StorageError::Conflict);
        }

        guard.attempts.insert(
            commit.attempt.id(),
            (commit.attempt.clone(), commit.attempt_version + 1),
        );
        guard.learners.insert(
            commit.learner.user_id(),
            (commit.learner.clone(), commit.learner_version + 1),
        );
        for (key, delta) in &commit.analytics {
            guard.aggregates.entry(key.clone()).or_default().apply(delta);
        }
        Ok(())
    }
}

//
// ─── IN-MEMORY CONTENT ─────────────────────────────────────────────────────────
//

#[derive(Default)]
struct ContentInner {
    banks: HashMap<TestId, QuestionBank>,
    metas: HashMap<TestId, TestMeta>,
    sequences: HashMap<Grade, ProgressionSequence>,
}

/// In-memory content store for tests and seeding.
#[derive(Clone, Default)]
pub struct InMemoryContent {
    inner: Arc<Mutex<ContentInner>>,
}

impl InMemoryContent {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers one assessment's bank and metadata.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Connection` if the inner lock is poisoned.
    pub fn insert_test(&self, bank: QuestionBank, meta: TestMeta) -> Result<(), StorageError> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.banks.insert(bank.test_id(), bank);
        guard.metas.insert(meta.test_id, meta);
        Ok(())
    }

    /// Registers the progression sequence for a grade.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Connection` if the inner lock is poisoned.
    pub fn insert_sequence(&self, sequence: ProgressionSequence) -> Result<(), StorageError> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.sequences.insert(sequence.grade(), sequence);
        Ok(())
    }
}

#[async_trait]
impl ContentStore for InMemoryContent {
    async fn question_bank(&self, test_id: TestId) -> Result<QuestionBank, StorageError> {
        let guard = self
            .inner
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.banks.get(&test_id).cloned().ok_or(StorageError::NotFound)
    }

    async fn test_meta(&self, test_id: TestId) -> Result<TestMeta, StorageError> {
        let guard = self
            .inner
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.metas.get(&test_id).cloned().ok_or(StorageError::NotFound)
    }

    async fn sequence_for_grade(&self, grade: Grade) -> Result<ProgressionSequence, StorageError> {
        let guard = self
            .inner
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard
            .sequences
            .get(&grade)
            .cloned()
            .ok_or(StorageError::NotFound)
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use prep_core::model::{Question, QuestionId};
    use prep_core::scoring::ScoreReport;
    use prep_core::time::fixed_now;

    fn attempt(user: u64, test: u64) -> Attempt {
        Attempt::start(
            AttemptId::generate(),
            TestId::new(test),
            UserId::new(user),
            1,
            fixed_now(),
            None,
        )
    }

    fn learner(user: u64) -> LearnerProgressionState {
        LearnerProgressionState::new(UserId::new(user), format!("learner-{user}"), Grade::new(3))
    }

    #[tokio::test]
    async fn attempt_round_trips_with_version() {
        let store = InMemoryStore::new();
        let a = attempt(1, 10);
        store.create_attempt(&a).await.unwrap();

        let read = store.read_attempt(a.id()).await.unwrap();
        assert_eq!(read.value, a);
        assert_eq!(read.version, 0);

        assert!(matches!(
            store.create_attempt(&a).await,
            Err(StorageError::Conflict)
        ));
    }

    #[tokio::test]
    async fn duplicate_attempt_number_is_a_conflict() {
        let store = InMemoryStore::new();
        store.create_attempt(&attempt(1, 10)).await.unwrap();

        // Same (user, test, number) under a fresh ID loses.
        assert!(matches!(
            store.create_attempt(&attempt(1, 10)).await,
            Err(StorageError::Conflict)
        ));

        // The next number for the pair is fine.
        let next = Attempt::start(
            AttemptId::generate(),
            TestId::new(10),
            UserId::new(1),
            2,
            fixed_now(),
            None,
        );
        store.create_attempt(&next).await.unwrap();
    }

    #[tokio::test]
    async fn stale_update_is_a_conflict() {
        let store = InMemoryStore::new();
        let mut a = attempt(1, 10);
        store.create_attempt(&a).await.unwrap();

        a.pause().unwrap();
        store.update_attempt(&a, 0).await.unwrap();

        // Writing again with the old version must fail.
        assert!(matches!(
            store.update_attempt(&a, 0).await,
            Err(StorageError::Conflict)
        ));
        assert_eq!(store.read_attempt(a.id()).await.unwrap().version, 1);
    }

    #[tokio::test]
    async fn commit_applies_everything_or_nothing() {
        let store = InMemoryStore::new();
        let mut a = attempt(1, 10);
        store.create_attempt(&a).await.unwrap();
        let l = learner(1);
        store.put_learner(&l).await.unwrap();

        a.complete(ScoreReport::empty(), fixed_now()).unwrap();
        let key = AggregateKey::Grade(Grade::new(3));
        let good = SubmissionCommit {
            attempt: a.clone(),
            attempt_version: 0,
            learner: l.clone(),
            learner_version: 0,
            analytics: vec![(key.clone(), AggregateDelta::for_attempt(300, 90, 75))],
        };
        store.commit(good.clone()).await.unwrap();

        let agg = store.read_aggregate(&key).await.unwrap();
        assert_eq!(agg.attempt_count, 1);

        // Replaying the same commit carries stale versions: nothing moves.
        assert!(matches!(
            store.commit(good).await,
            Err(StorageError::Conflict)
        ));
        let agg = store.read_aggregate(&key).await.unwrap();
        assert_eq!(agg.attempt_count, 1);
    }

    #[tokio::test]
    async fn commit_with_stale_learner_leaves_attempt_untouched() {
        let store = InMemoryStore::new();
        let mut a = attempt(1, 10);
        store.create_attempt(&a).await.unwrap();
        let l = learner(1);
        store.put_learner(&l).await.unwrap();
        // A pointer update bumps the learner version past the read.
        store.update_learner(&l, 0).await.unwrap();

        a.complete(ScoreReport::empty(), fixed_now()).unwrap();
        let result = store
            .commit(SubmissionCommit {
                attempt: a.clone(),
                attempt_version: 0,
                learner: l,
                learner_version: 0,
                analytics: vec![],
            })
            .await;
        assert!(matches!(result, Err(StorageError::Conflict)));

        let read = store.read_attempt(a.id()).await.unwrap();
        assert!(!read.value.is_completed());
        assert_eq!(read.version, 0);
    }

    #[tokio::test]
    async fn attempts_for_user_filters_and_orders() {
        let store = InMemoryStore::new();
        store.create_attempt(&attempt(1, 20)).await.unwrap();
        store.create_attempt(&attempt(1, 10)).await.unwrap();
        store.create_attempt(&attempt(2, 10)).await.unwrap();

        let mine = store.attempts_for_user(UserId::new(1)).await.unwrap();
        assert_eq!(mine.len(), 2);
        assert_eq!(mine[0].test_id(), TestId::new(10));
        assert_eq!(mine[1].test_id(), TestId::new(20));
    }

    #[tokio::test]
    async fn content_store_round_trips() {
        let content = InMemoryContent::new();
        let bank = QuestionBank::new(
            TestId::new(1),
            vec![Question::new(QuestionId::new(1), "a")],
        );
        let meta = TestMeta::new(TestId::new(1), Grade::new(3), "fractions");
        content.insert_test(bank, meta).unwrap();
        content
            .insert_sequence(ProgressionSequence::new(
                Grade::new(3),
                vec![TestId::new(1)],
            ))
            .unwrap();

        assert_eq!(content.question_bank(TestId::new(1)).await.unwrap().len(), 1);
        assert_eq!(
            content.test_meta(TestId::new(1)).await.unwrap().category,
            "fractions"
        );
        assert!(matches!(
            content.question_bank(TestId::new(9)).await,
            Err(StorageError::NotFound)
        ));
        assert_eq!(
            content
                .sequence_for_grade(Grade::new(3))
                .await
                .unwrap()
                .test_ids(),
            &[TestId::new(1)]
        );
    }
}
