use std::future::Future;
use std::sync::Arc;

use tenure_core::LifecycleState;

use super::{key, seed, transition_event, TestResult};
use crate::{Repository, StorageError};

/// Number of concurrent tasks to spawn in each test.
const N: usize = 10;

pub(super) async fn run_concurrent_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: Repository,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    vec![
        TestResult::from_result(
            "concurrent",
            "concurrent_commits_exactly_one_wins",
            concurrent_commits_exactly_one_wins(factory).await,
        ),
        TestResult::from_result(
            "concurrent",
            "concurrent_inserts_exactly_one_wins",
            concurrent_inserts_exactly_one_wins(factory).await,
        ),
        TestResult::from_result(
            "concurrent",
            "concurrent_commits_different_entities_all_succeed",
            concurrent_commits_different_entities_all_succeed(factory).await,
        ),
    ]
}

// ── Concurrent commit: exactly one wins ─────────────────────────────────────

/// N tasks all read version 0 and try to commit a different target state.
/// Exactly one commit succeeds; the rest must get ConcurrentConflict, and the
/// trail must hold exactly one transition.
async fn concurrent_commits_exactly_one_wins<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: Repository,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = Arc::new(factory().await);
    let k = key("P-1");
    let base = seed(storage.as_ref(), &k).await?;

    let mut handles = Vec::new();
    for i in 0..N {
        let s = storage.clone();
        let mut next = base.clone();
        next.state = LifecycleState::new(format!("Target{i}"));
        next.version = 1;
        handles.push(tokio::spawn(async move {
            let event = transition_event(1, "Applied", next.state.as_str());
            s.commit(0, &next, &event).await
        }));
    }

    let mut wins = 0;
    let mut conflicts = 0;
    for handle in handles {
        match handle.await.map_err(|e| format!("join: {e}"))? {
            Ok(()) => wins += 1,
            Err(StorageError::ConcurrentConflict { .. }) => conflicts += 1,
            Err(other) => return Err(format!("unexpected error: {other}")),
        }
    }
    if wins != 1 || conflicts != N - 1 {
        return Err(format!("expected 1 win and {} conflicts, got {wins} and {conflicts}", N - 1));
    }

    let trail = storage
        .history(&k)
        .await
        .map_err(|e| format!("history: {e}"))?;
    let current = storage.load(&k).await.map_err(|e| format!("load: {e}"))?;
    if trail.len() != 2 || trail.head().and_then(|e| e.to_state.as_ref()) != Some(&current.state)
    {
        return Err(format!(
            "trail and snapshot disagree after race: {} events, state {}",
            trail.len(),
            current.state
        ));
    }
    Ok(())
}

async fn concurrent_inserts_exactly_one_wins<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: Repository,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = Arc::new(factory().await);

    let mut handles = Vec::new();
    for _ in 0..N {
        let s = storage.clone();
        handles.push(tokio::spawn(async move {
            let k = key("P-1");
            seed(s.as_ref(), &k).await
        }));
    }

    let mut wins = 0;
    for handle in handles {
        if handle.await.map_err(|e| format!("join: {e}"))?.is_ok() {
            wins += 1;
        }
    }
    if wins != 1 {
        return Err(format!("expected exactly 1 insert to win, got {wins}"));
    }
    Ok(())
}

async fn concurrent_commits_different_entities_all_succeed<S, F, Fut>(
    factory: &F,
) -> Result<(), String>
where
    S: Repository,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = Arc::new(factory().await);
    let mut bases = Vec::new();
    for i in 0..N {
        bases.push(seed(storage.as_ref(), &key(&format!("P-{i}"))).await?);
    }

    let mut handles = Vec::new();
    for base in bases {
        let s = storage.clone();
        handles.push(tokio::spawn(async move {
            let mut next = base.clone();
            next.state = LifecycleState::new("Issued");
            next.version = 1;
            s.commit(0, &next, &transition_event(1, "Applied", "Issued"))
                .await
        }));
    }

    for handle in handles {
        handle
            .await
            .map_err(|e| format!("join: {e}"))?
            .map_err(|e| format!("commit: {e}"))?;
    }
    Ok(())
}
