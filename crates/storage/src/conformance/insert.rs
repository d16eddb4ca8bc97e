use std::future::Future;

use serde_json::json;
use tenure_core::{EntityType, Fields, LifecycleState};

use super::{created_event, key, seed, snapshot, TestResult};
use crate::{Repository, StorageError};

pub(super) async fn run_insert_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: Repository,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    vec![
        TestResult::from_result(
            "insert",
            "insert_then_load_returns_snapshot",
            insert_then_load_returns_snapshot(factory).await,
        ),
        TestResult::from_result(
            "insert",
            "insert_writes_created_event",
            insert_writes_created_event(factory).await,
        ),
        TestResult::from_result(
            "insert",
            "duplicate_insert_rejected",
            duplicate_insert_rejected(factory).await,
        ),
        TestResult::from_result(
            "insert",
            "list_filters_by_type_and_state",
            list_filters_by_type_and_state(factory).await,
        ),
    ]
}

async fn insert_then_load_returns_snapshot<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: Repository,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    let k = key("P-1");
    let mut fields = Fields::new();
    fields.insert("permitNumber".to_string(), json!("P-1"));
    fields.insert("fee".to_string(), json!(1250.5));
    let snap = snapshot(&k, "Applied", 0, fields);
    storage
        .insert(&snap, &created_event("Applied"))
        .await
        .map_err(|e| format!("insert: {e}"))?;

    let loaded = storage.load(&k).await.map_err(|e| format!("load: {e}"))?;
    if loaded != snap {
        return Err(format!("expected {snap:?}, got {loaded:?}"));
    }
    Ok(())
}

async fn insert_writes_created_event<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: Repository,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    let k = key("P-1");
    seed(&storage, &k).await?;

    let trail = storage
        .history(&k)
        .await
        .map_err(|e| format!("history: {e}"))?;
    if trail.len() != 1 {
        return Err(format!("expected 1 event, got {}", trail.len()));
    }
    let head = trail.head().ok_or("empty trail")?;
    if head != &created_event("Applied") {
        return Err(format!("creation event altered: {head:?}"));
    }
    Ok(())
}

async fn duplicate_insert_rejected<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: Repository,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    let k = key("P-1");
    seed(&storage, &k).await?;

    match storage
        .insert(&snapshot(&k, "Issued", 0, Fields::new()), &created_event("Issued"))
        .await
    {
        Err(StorageError::AlreadyExists { key }) if key == k => {}
        other => return Err(format!("expected AlreadyExists, got {other:?}")),
    }
    let loaded = storage.load(&k).await.map_err(|e| format!("load: {e}"))?;
    if loaded.state != "Applied" {
        return Err(format!("duplicate insert overwrote state: {}", loaded.state));
    }
    Ok(())
}

async fn list_filters_by_type_and_state<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: Repository,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    seed(&storage, &key("P-2")).await?;
    seed(&storage, &key("P-1")).await?;
    super::advance(&storage, &key("P-2"), "Issued").await?;
    let other = tenure_core::EntityKey::new("Disposal", "D-1");
    seed(&storage, &other).await?;

    let permits = EntityType::new("Permit");
    let all = storage
        .list(&permits, None)
        .await
        .map_err(|e| format!("list: {e}"))?;
    let ids: Vec<&str> = all.iter().map(|s| s.key.id.as_str()).collect();
    if ids != ["P-1", "P-2"] {
        return Err(format!("expected [P-1, P-2], got {ids:?}"));
    }

    let issued = storage
        .list(&permits, Some(&LifecycleState::new("Issued")))
        .await
        .map_err(|e| format!("list issued: {e}"))?;
    if issued.len() != 1 || issued[0].key.id != "P-2" {
        return Err(format!("expected only P-2 in Issued, got {issued:?}"));
    }
    Ok(())
}
