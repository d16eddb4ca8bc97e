use std::future::Future;

use tenure_core::AuditAction;

use super::{advance, key, seed, TestResult};
use crate::Repository;

pub(super) async fn run_history_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: Repository,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    vec![
        TestResult::from_result(
            "history",
            "history_is_most_recent_first",
            history_is_most_recent_first(factory).await,
        ),
        TestResult::from_result(
            "history",
            "earlier_entries_never_change",
            earlier_entries_never_change(factory).await,
        ),
        TestResult::from_result(
            "history",
            "sequences_match_versions",
            sequences_match_versions(factory).await,
        ),
        TestResult::from_result(
            "history",
            "trail_is_restartable",
            trail_is_restartable(factory).await,
        ),
    ]
}

async fn history_is_most_recent_first<S, F, Fut>(factory: &F) -> Result<(), String>
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

    let trail = storage
        .history(&k)
        .await
        .map_err(|e| format!("history: {e}"))?;
    let to_states: Vec<String> = trail
        .iter()
        .map(|e| e.to_state.as_ref().map(|s| s.to_string()).unwrap_or_default())
        .collect();
    if to_states != ["Active", "Issued", "Applied"] {
        return Err(format!("unexpected order: {to_states:?}"));
    }
    if trail.oldest().map(|e| e.action) != Some(AuditAction::Created) {
        return Err("oldest event is not the creation event".to_string());
    }
    Ok(())
}

async fn earlier_entries_never_change<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: Repository,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    let k = key("P-1");
    seed(&storage, &k).await?;
    advance(&storage, &k, "Issued").await?;
    let first = storage
        .history(&k)
        .await
        .map_err(|e| format!("history: {e}"))?;

    advance(&storage, &k, "Active").await?;
    advance(&storage, &k, "Expired").await?;
    let later = storage
        .history(&k)
        .await
        .map_err(|e| format!("history: {e}"))?;

    if later.len() != first.len() + 2 {
        return Err(format!(
            "expected {} events, got {}",
            first.len() + 2,
            later.len()
        ));
    }
    // Oldest-first comparison: the earlier trail must be a prefix of the later one.
    let first_old: Vec<_> = first.iter().rev().collect();
    let later_old: Vec<_> = later.iter().rev().take(first_old.len()).collect();
    if first_old != later_old {
        return Err("earlier audit events changed after later commits".to_string());
    }
    Ok(())
}

async fn sequences_match_versions<S, F, Fut>(factory: &F) -> Result<(), String>
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

    let trail = storage
        .history(&k)
        .await
        .map_err(|e| format!("history: {e}"))?;
    let sequences: Vec<u64> = trail.iter().map(|e| e.sequence).collect();
    if sequences != [2, 1, 0] {
        return Err(format!("expected sequences [2, 1, 0], got {sequences:?}"));
    }
    let current = storage.load(&k).await.map_err(|e| format!("load: {e}"))?;
    if trail.head().map(|e| e.sequence) != Some(current.version) {
        return Err("head sequence differs from current version".to_string());
    }
    Ok(())
}

async fn trail_is_restartable<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: Repository,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    let k = key("P-1");
    seed(&storage, &k).await?;
    advance(&storage, &k, "Issued").await?;

    let trail = storage
        .history(&k)
        .await
        .map_err(|e| format!("history: {e}"))?;
    let once: Vec<u64> = trail.iter().map(|e| e.sequence).collect();
    let twice: Vec<u64> = (&trail).into_iter().map(|e| e.sequence).collect();
    if once != twice {
        return Err("second traversal differs from the first".to_string());
    }
    Ok(())
}
