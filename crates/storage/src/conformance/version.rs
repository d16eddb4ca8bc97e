use std::future::Future;

use serde_json::json;
use tenure_core::LifecycleState;

use super::{advance, edit_event, key, seed, transition_event, TestResult};
use crate::{Repository, StorageError};

pub(super) async fn run_version_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: Repository,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    vec![
        TestResult::from_result(
            "version",
            "commit_increments_version",
            commit_increments_version(factory).await,
        ),
        TestResult::from_result(
            "version",
            "stale_commit_conflicts",
            stale_commit_conflicts(factory).await,
        ),
        TestResult::from_result(
            "version",
            "conflict_leaves_snapshot_and_history_unchanged",
            conflict_leaves_snapshot_and_history_unchanged(factory).await,
        ),
        TestResult::from_result(
            "version",
            "field_edit_commit_updates_fields",
            field_edit_commit_updates_fields(factory).await,
        ),
        TestResult::from_result(
            "version",
            "entities_versioned_independently",
            entities_versioned_independently(factory).await,
        ),
    ]
}

async fn commit_increments_version<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: Repository,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    let k = key("P-1");
    seed(&storage, &k).await?;
    advance(&storage, &k, "Issued").await?;
    advance(&storage, &k, "Active").await?;

    let loaded = storage.load(&k).await.map_err(|e| format!("load: {e}"))?;
    if loaded.version != 2 || loaded.state != "Active" {
        return Err(format!(
            "expected Active at version 2, got {} at {}",
            loaded.state, loaded.version
        ));
    }
    Ok(())
}

async fn stale_commit_conflicts<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: Repository,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    let k = key("P-1");
    let original = seed(&storage, &k).await?;
    advance(&storage, &k, "Issued").await?;

    let mut stale = original.clone();
    stale.state = LifecycleState::new("Withdrawn");
    stale.version = 1;
    match storage
        .commit(0, &stale, &transition_event(1, "Applied", "Withdrawn"))
        .await
    {
        Err(StorageError::ConcurrentConflict {
            expected_version: 0,
            actual_version: 1,
            ..
        }) => Ok(()),
        other => Err(format!("expected ConcurrentConflict(0 vs 1), got {other:?}")),
    }
}

async fn conflict_leaves_snapshot_and_history_unchanged<S, F, Fut>(
    factory: &F,
) -> Result<(), String>
where
    S: Repository,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    let k = key("P-1");
    let original = seed(&storage, &k).await?;
    advance(&storage, &k, "Issued").await?;
    let before = storage.load(&k).await.map_err(|e| format!("load: {e}"))?;
    let trail_before = storage
        .history(&k)
        .await
        .map_err(|e| format!("history: {e}"))?;

    let mut stale = original.clone();
    stale.state = LifecycleState::new("Withdrawn");
    stale.version = 1;
    let _ = storage
        .commit(0, &stale, &transition_event(1, "Applied", "Withdrawn"))
        .await;

    let after = storage.load(&k).await.map_err(|e| format!("load: {e}"))?;
    if after != before {
        return Err(format!("conflict changed snapshot: {after:?}"));
    }
    let trail_after = storage
        .history(&k)
        .await
        .map_err(|e| format!("history: {e}"))?;
    if trail_after != trail_before {
        return Err("conflict changed the audit trail".to_string());
    }
    Ok(())
}

async fn field_edit_commit_updates_fields<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: Repository,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    let k = key("P-1");
    let mut snap = seed(&storage, &k).await?;
    snap.fields.insert("fee".to_string(), json!(200));
    snap.version = 1;
    storage
        .commit(0, &snap, &edit_event(1, "fee", 100, 200))
        .await
        .map_err(|e| format!("commit edit: {e}"))?;

    let loaded = storage.load(&k).await.map_err(|e| format!("load: {e}"))?;
    if loaded.field("fee") != Some(&json!(200)) || loaded.state != "Applied" {
        return Err(format!("edit not applied as written: {loaded:?}"));
    }
    Ok(())
}

async fn entities_versioned_independently<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: Repository,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    let a = key("P-A");
    let b = key("P-B");
    seed(&storage, &a).await?;
    seed(&storage, &b).await?;
    advance(&storage, &a, "Issued").await?;
    advance(&storage, &a, "Active").await?;

    let loaded_b = storage.load(&b).await.map_err(|e| format!("load b: {e}"))?;
    if loaded_b.version != 0 {
        return Err(format!(
            "commits on {a} moved {b} to version {}",
            loaded_b.version
        ));
    }
    advance(&storage, &b, "Issued").await
}
