use chrono::Duration;
use prep_core::model::{
    AggregateDelta, AggregateKey, Attempt, AttemptId, Grade, LearnerProgressionState, TestId,
    UserId,
};
use prep_core::scoring::ScoreReport;
use prep_core::time::fixed_now;
use storage::repository::{ProgressStore, StorageError, SubmissionCommit};
use storage::sqlite::SqliteStore;

fn build_attempt(user: u64, test: u64, number: u32) -> Attempt {
    Attempt::start(
        AttemptId::generate(),
        TestId::new(test),
        UserId::new(user),
        number,
        fixed_now(),
        None,
    )
}

#[tokio::test]
async fn sqlite_roundtrip_persists_attempts_and_learners() {
    let store = SqliteStore::open("sqlite:file:memdb_roundtrip?mode=memory&cache=shared")
        .await
        .expect("open");

    let mut attempt = build_attempt(1, 10, 1);
    store.create_attempt(&attempt).await.unwrap();

    let read = store.read_attempt(attempt.id()).await.expect("read");
    assert_eq!(read.value, attempt);
    assert_eq!(read.version, 0);

    attempt.pause().unwrap();
    store.update_attempt(&attempt, 0).await.unwrap();
    let read = store.read_attempt(attempt.id()).await.unwrap();
    assert_eq!(read.value.status(), attempt.status());
    assert_eq!(read.version, 1);

    let learner = LearnerProgressionState::new(UserId::new(1), "Ada", Grade::new(3));
    store.put_learner(&learner).await.unwrap();
    let read = store.read_learner(UserId::new(1)).await.unwrap();
    assert_eq!(read.value, learner);
    assert_eq!(read.version, 0);
}

#[tokio::test]
async fn sqlite_rejects_duplicate_inserts() {
    let store = SqliteStore::open("sqlite:file:memdb_duplicates?mode=memory&cache=shared")
        .await
        .expect("open");

    let attempt = build_attempt(1, 10, 1);
    store.create_attempt(&attempt).await.unwrap();
    assert!(matches!(
        store.create_attempt(&attempt).await,
        Err(StorageError::Conflict)
    ));

    let learner = LearnerProgressionState::new(UserId::new(1), "Ada", Grade::new(3));
    store.put_learner(&learner).await.unwrap();
    assert!(matches!(
        store.put_learner(&learner).await,
        Err(StorageError::Conflict)
    ));
}

#[tokio::test]
async fn sqlite_rejects_duplicate_attempt_numbers() {
    let store = SqliteStore::open("sqlite:file:memdb_attempt_numbers?mode=memory&cache=shared")
        .await
        .expect("open");

    store.create_attempt(&build_attempt(1, 10, 1)).await.unwrap();
    // A fresh ID cannot reuse the (user, test, number) slot.
    assert!(matches!(
        store.create_attempt(&build_attempt(1, 10, 1)).await,
        Err(StorageError::Conflict)
    ));
    store.create_attempt(&build_attempt(1, 10, 2)).await.unwrap();
    store.create_attempt(&build_attempt(2, 10, 1)).await.unwrap();
}

#[tokio::test]
async fn sqlite_detects_stale_versions() {
    let store = SqliteStore::open("sqlite:file:memdb_stale?mode=memory&cache=shared")
        .await
        .expect("open");

    let mut attempt = build_attempt(1, 10, 1);
    store.create_attempt(&attempt).await.unwrap();
    attempt.pause().unwrap();
    store.update_attempt(&attempt, 0).await.unwrap();

    assert!(matches!(
        store.update_attempt(&attempt, 0).await,
        Err(StorageError::Conflict)
    ));

    let missing = build_attempt(2, 10, 1);
    assert!(matches!(
        store.update_attempt(&missing, 0).await,
        Err(StorageError::NotFound)
    ));
}

#[tokio::test]
async fn sqlite_commit_is_atomic_across_tables() {
    let store = SqliteStore::open("sqlite:file:memdb_commit?mode=memory&cache=shared")
        .await
        .expect("open");

    let mut attempt = build_attempt(1, 10, 1);
    store.create_attempt(&attempt).await.unwrap();
    let learner = LearnerProgressionState::new(UserId::new(1), "Ada", Grade::new(3));
    store.put_learner(&learner).await.unwrap();

    attempt
        .complete(ScoreReport::empty(), fixed_now() + Duration::minutes(5))
        .unwrap();
    let grade_key = AggregateKey::Grade(Grade::new(3));
    let day_key = AggregateKey::Day(fixed_now().date_naive());
    let commit = SubmissionCommit {
        attempt: attempt.clone(),
        attempt_version: 0,
        learner: learner.clone(),
        learner_version: 0,
        analytics: vec![
            (grade_key.clone(), AggregateDelta::for_attempt(300, 90, 75)),
            (day_key.clone(), AggregateDelta::for_attempt(300, 90, 75)),
        ],
    };
    store.commit(commit.clone()).await.expect("commit");

    let read = store.read_attempt(attempt.id()).await.unwrap();
    assert!(read.value.is_completed());
    assert_eq!(read.version, 1);

    let agg = store.read_aggregate(&grade_key).await.unwrap();
    assert_eq!(agg.attempt_count, 1);
    assert_eq!(agg.total_time_spent_secs, 300);
    assert_eq!(agg.average_score(), 90.0);

    // Replaying with stale versions rolls everything back, including the
    // analytics increments.
    assert!(matches!(
        store.commit(commit).await,
        Err(StorageError::Conflict)
    ));
    let agg = store.read_aggregate(&grade_key).await.unwrap();
    assert_eq!(agg.attempt_count, 1);
    let agg = store.read_aggregate(&day_key).await.unwrap();
    assert_eq!(agg.attempt_count, 1);
}

#[tokio::test]
async fn sqlite_lists_attempts_and_learners_in_order() {
    let store = SqliteStore::open("sqlite:file:memdb_listing?mode=memory&cache=shared")
        .await
        .expect("open");

    store.create_attempt(&build_attempt(1, 20, 1)).await.unwrap();
    store.create_attempt(&build_attempt(1, 10, 1)).await.unwrap();
    store.create_attempt(&build_attempt(1, 10, 2)).await.unwrap();
    store.create_attempt(&build_attempt(2, 10, 1)).await.unwrap();

    let mine = store.attempts_for_user(UserId::new(1)).await.unwrap();
    let order: Vec<(u64, u32)> = mine
        .iter()
        .map(|a| (a.test_id().value(), a.attempt_number()))
        .collect();
    assert_eq!(order, vec![(10, 1), (10, 2), (20, 1)]);

    for id in [3u64, 1, 2] {
        let learner =
            LearnerProgressionState::new(UserId::new(id), format!("learner-{id}"), Grade::new(3));
        store.put_learner(&learner).await.unwrap();
    }
    let learners = store.list_learners().await.unwrap();
    let ids: Vec<u64> = learners.iter().map(|l| l.user_id().value()).collect();
    assert_eq!(ids, vec![1, 2, 3]);
}

#[tokio::test]
async fn sqlite_missing_aggregate_reads_as_zero() {
    let store = SqliteStore::open("sqlite:file:memdb_agg_zero?mode=memory&cache=shared")
        .await
        .expect("open");

    let agg = store
        .read_aggregate(&AggregateKey::Category("fractions".to_string()))
        .await
        .unwrap();
    assert_eq!(agg.attempt_count, 0);
    assert_eq!(agg.average_score(), 0.0);
}
