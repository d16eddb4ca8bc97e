use std::future::Future;

use tenure_core::Fields;

use super::{created_event, key, seed, snapshot, transition_event, TestResult};
use crate::{Repository, StorageError};

pub(super) async fn run_error_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: Repository,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    vec![
        TestResult::from_result(
            "error",
            "load_missing_entity_not_found",
            load_missing_entity_not_found(factory).await,
        ),
        TestResult::from_result(
            "error",
            "history_missing_entity_not_found",
            history_missing_entity_not_found(factory).await,
        ),
        TestResult::from_result(
            "error",
            "commit_missing_entity_not_found",
            commit_missing_entity_not_found(factory).await,
        ),
        TestResult::from_result(
            "error",
            "insert_requires_version_zero",
            insert_requires_version_zero(factory).await,
        ),
        TestResult::from_result(
            "error",
            "commit_rejects_out_of_sequence_event",
            commit_rejects_out_of_sequence_event(factory).await,
        ),
        TestResult::from_result(
            "error",
            "commit_rejects_created_event",
            commit_rejects_created_event(factory).await,
        ),
    ]
}

async fn load_missing_entity_not_found<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: Repository,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    let k = key("missing");
    match storage.load(&k).await {
        Err(StorageError::EntityNotFound { key }) if key == k => Ok(()),
        other => Err(format!("expected EntityNotFound, got {other:?}")),
    }
}

async fn history_missing_entity_not_found<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: Repository,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    match storage.history(&key("missing")).await {
        Err(StorageError::EntityNotFound { .. }) => Ok(()),
        other => Err(format!("expected EntityNotFound, got {other:?}")),
    }
}

async fn commit_missing_entity_not_found<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: Repository,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    let k = key("missing");
    let next = snapshot(&k, "Issued", 1, Fields::new());
    match storage
        .commit(0, &next, &transition_event(1, "Applied", "Issued"))
        .await
    {
        Err(StorageError::EntityNotFound { .. }) => Ok(()),
        other => Err(format!("expected EntityNotFound, got {other:?}")),
    }
}

async fn insert_requires_version_zero<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: Repository,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    let k = key("P-1");
    match storage
        .insert(&snapshot(&k, "Applied", 3, Fields::new()), &created_event("Applied"))
        .await
    {
        Err(StorageError::InvalidCommit { .. }) => {}
        other => return Err(format!("expected InvalidCommit, got {other:?}")),
    }
    match storage.load(&k).await {
        Err(StorageError::EntityNotFound { .. }) => Ok(()),
        other => Err(format!("rejected insert left a row behind: {other:?}")),
    }
}

async fn commit_rejects_out_of_sequence_event<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: Repository,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    let k = key("P-1");
    seed(&storage, &k).await?;

    let next = snapshot(&k, "Issued", 1, Fields::new());
    match storage
        .commit(0, &next, &transition_event(5, "Applied", "Issued"))
        .await
    {
        Err(StorageError::InvalidCommit { .. }) => {}
        other => return Err(format!("expected InvalidCommit for sequence gap, got {other:?}")),
    }

    let skipped = snapshot(&k, "Issued", 2, Fields::new());
    match storage
        .commit(0, &skipped, &transition_event(2, "Applied", "Issued"))
        .await
    {
        Err(StorageError::InvalidCommit { .. }) => {}
        other => return Err(format!("expected InvalidCommit for version gap, got {other:?}")),
    }

    let trail = storage
        .history(&k)
        .await
        .map_err(|e| format!("history: {e}"))?;
    if trail.len() != 1 {
        return Err(format!("rejected commits appended events: {}", trail.len()));
    }
    Ok(())
}

async fn commit_rejects_created_event<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: Repository,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    let k = key("P-1");
    seed(&storage, &k).await?;

    let mut event = created_event("Applied");
    event.sequence = 1;
    match storage
        .commit(0, &snapshot(&k, "Applied", 1, Fields::new()), &event)
        .await
    {
        Err(StorageError::InvalidCommit { .. }) => Ok(()),
        other => Err(format!("expected InvalidCommit, got {other:?}")),
    }
}
