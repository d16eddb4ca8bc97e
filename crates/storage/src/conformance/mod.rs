//! Conformance test suite for [`Repository`] implementations.
//!
//! Any backend can run this suite to check that it honours the repository
//! contract. The suite covers:
//!
//! - **Insert**: version 0 creation, duplicate detection, the creation event
//! - **Errors**: correct error variants for missing entities and bad sequences
//! - **Version validation / OCC**: stale commits rejected without side effects
//! - **History**: append-only, most recent first, earlier entries never change
//! - **Concurrency**: racing commits on one entity produce exactly one winner
//!
//! # Usage
//!
//! Backend crates call [`run_conformance_suite`] with a factory function that
//! creates a fresh, empty repository for each test:
//!
//! ```ignore
//! use tenure_storage::conformance::run_conformance_suite;
//!
//! #[tokio::test]
//! async fn sqlite_conformance() {
//!     let report = run_conformance_suite(|| async { open_scratch_sqlite().await }).await;
//!     assert!(report.failed == 0, "{report}");
//! }
//! ```

mod concurrent;
mod error;
mod history;
mod insert;
mod version;

use std::fmt;
use std::future::Future;

use serde_json::json;
use tenure_core::{
    AuditAction, AuditEvent, EntityKey, EntitySnapshot, FieldChange, Fields, LifecycleState,
};
use time::macros::datetime;
use time::Duration;

use crate::Repository;

/// Result of a single conformance test.
#[derive(Debug, Clone)]
pub struct TestResult {
    /// Test category (e.g. "insert", "version", "history").
    pub category: String,
    /// Test name (e.g. "insert_then_load_returns_snapshot").
    pub name: String,
    pub passed: bool,
    /// Error message if the test failed.
    pub message: Option<String>,
}

impl TestResult {
    fn from_result(category: &str, name: &str, result: Result<(), String>) -> Self {
        let (passed, message) = match result {
            Ok(()) => (true, None),
            Err(msg) => (false, Some(msg)),
        };
        Self {
            category: category.to_string(),
            name: name.to_string(),
            passed,
            message,
        }
    }
}

/// Aggregated report from a full conformance suite run.
#[derive(Debug, Clone)]
pub struct ConformanceReport {
    pub results: Vec<TestResult>,
    pub passed: usize,
    pub failed: usize,
    pub total: usize,
}

impl fmt::Display for ConformanceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Conformance: {}/{} passed ({} failed)",
            self.passed, self.total, self.failed
        )?;
        for r in self.results.iter().filter(|r| !r.passed) {
            writeln!(
                f,
                "  FAIL [{}/{}]: {}",
                r.category,
                r.name,
                r.message.as_deref().unwrap_or("(no message)")
            )?;
        }
        Ok(())
    }
}

/// Run the full conformance suite against a repository backend.
///
/// The `factory` function is called once per test to create a fresh, empty
/// repository, ensuring test isolation.
pub async fn run_conformance_suite<S, F, Fut>(factory: F) -> ConformanceReport
where
    S: Repository,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.extend(insert::run_insert_tests(&factory).await);
    results.extend(error::run_error_tests(&factory).await);
    results.extend(version::run_version_tests(&factory).await);
    results.extend(history::run_history_tests(&factory).await);
    results.extend(concurrent::run_concurrent_tests(&factory).await);

    let passed = results.iter().filter(|r| r.passed).count();
    let total = results.len();

    ConformanceReport {
        results,
        passed,
        failed: total - passed,
        total,
    }
}

// ── Helpers: fixtures with sensible defaults ────────────────────────────────

fn key(id: &str) -> EntityKey {
    EntityKey::new("Permit", id)
}

fn snapshot(key: &EntityKey, state: &str, version: u64, fields: Fields) -> EntitySnapshot {
    EntitySnapshot {
        key: key.clone(),
        fields,
        state: LifecycleState::new(state),
        version,
    }
}

fn created_event(state: &str) -> AuditEvent {
    AuditEvent {
        sequence: 0,
        timestamp: datetime!(2025-01-01 0:00 UTC),
        actor: "conformance".to_string(),
        action: AuditAction::Created,
        from_state: None,
        to_state: Some(LifecycleState::new(state)),
        details: "created".to_string(),
        changes: vec![],
    }
}

fn transition_event(sequence: u64, from: &str, to: &str) -> AuditEvent {
    AuditEvent {
        sequence,
        timestamp: datetime!(2025-01-01 0:00 UTC) + Duration::seconds(sequence as i64),
        actor: "conformance".to_string(),
        action: AuditAction::StateTransition,
        from_state: Some(LifecycleState::new(from)),
        to_state: Some(LifecycleState::new(to)),
        details: format!("{} -> {}", from, to),
        changes: vec![],
    }
}

fn edit_event(sequence: u64, field: &str, previous: i64, current: i64) -> AuditEvent {
    AuditEvent {
        sequence,
        timestamp: datetime!(2025-01-01 0:00 UTC) + Duration::seconds(sequence as i64),
        actor: "conformance".to_string(),
        action: AuditAction::FieldEdit,
        from_state: None,
        to_state: None,
        details: format!("adjust {}", field),
        changes: vec![FieldChange {
            field: field.to_string(),
            previous: Some(json!(previous)),
            current: Some(json!(current)),
        }],
    }
}

/// Insert `key` in state "Applied" at version 0.
async fn seed<S: Repository>(storage: &S, key: &EntityKey) -> Result<EntitySnapshot, String> {
    let snap = snapshot(key, "Applied", 0, Fields::new());
    storage
        .insert(&snap, &created_event("Applied"))
        .await
        .map_err(|e| format!("insert {key}: {e}"))?;
    Ok(snap)
}

/// Commit a transition from the current state to `to`, reading the version first.
async fn advance<S: Repository>(storage: &S, key: &EntityKey, to: &str) -> Result<(), String> {
    let current = storage
        .load(key)
        .await
        .map_err(|e| format!("load {key}: {e}"))?;
    let mut next = current.clone();
    next.state = LifecycleState::new(to);
    next.version = current.version + 1;
    storage
        .commit(
            current.version,
            &next,
            &transition_event(next.version, current.state.as_str(), to),
        )
        .await
        .map_err(|e| format!("commit {key} -> {to}: {e}"))
}
