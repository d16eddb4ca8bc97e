//! Shared fixtures for engine integration tests.
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tenure_core::{
    AuditEvent, AuditTrail, EntityKey, EntitySnapshot, EntityType, FieldChanges, Fields,
    LifecycleState, Registry,
};
use tenure_engine::{Engine, SteppingClock};
use tenure_storage::{MemoryRepository, Repository, StorageError};
use time::macros::datetime;
use time::Duration;
use tokio::sync::Barrier;

pub fn builtin() -> Arc<Registry> {
    Arc::new(Registry::builtin().expect("built-in catalog loads"))
}

pub fn engine_with<R: Repository>(registry: Arc<Registry>, repository: R) -> Engine<R> {
    Engine::new(registry, repository).with_clock(Arc::new(SteppingClock::new(
        datetime!(2025-06-01 12:00 UTC),
        Duration::seconds(1),
    )))
}

pub fn fields(pairs: &[(&str, Value)]) -> Fields {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

pub fn changes(pairs: &[(&str, Value)]) -> FieldChanges {
    fields(pairs)
}

/// Repository wrapper that holds the first `gated` loads at a barrier until
/// all of them have read, so racing requests all see the same version.
pub struct BarrierRepository {
    pub inner: Arc<MemoryRepository>,
    barrier: Barrier,
    gated: AtomicUsize,
}

impl BarrierRepository {
    pub fn new(inner: Arc<MemoryRepository>, racers: usize) -> Self {
        Self {
            inner,
            barrier: Barrier::new(racers),
            gated: AtomicUsize::new(racers),
        }
    }
}

#[async_trait]
impl Repository for BarrierRepository {
    async fn insert(
        &self,
        snapshot: &EntitySnapshot,
        created: &AuditEvent,
    ) -> Result<(), StorageError> {
        self.inner.insert(snapshot, created).await
    }

    async fn load(&self, key: &EntityKey) -> Result<EntitySnapshot, StorageError> {
        let snapshot = self.inner.load(key).await?;
        let gate = self
            .gated
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if gate {
            self.barrier.wait().await;
        }
        Ok(snapshot)
    }

    async fn commit(
        &self,
        expected_version: u64,
        snapshot: &EntitySnapshot,
        event: &AuditEvent,
    ) -> Result<(), StorageError> {
        self.inner.commit(expected_version, snapshot, event).await
    }

    async fn history(&self, key: &EntityKey) -> Result<AuditTrail, StorageError> {
        self.inner.history(key).await
    }

    async fn list(
        &self,
        entity_type: &EntityType,
        state: Option<&LifecycleState>,
    ) -> Result<Vec<EntitySnapshot>, StorageError> {
        self.inner.list(entity_type, state).await
    }
}

/// Repository wrapper whose commits always fail with `error`.
pub struct FailingRepository {
    pub inner: Arc<MemoryRepository>,
    pub error: StorageError,
}

#[async_trait]
impl Repository for FailingRepository {
    async fn insert(
        &self,
        snapshot: &EntitySnapshot,
        created: &AuditEvent,
    ) -> Result<(), StorageError> {
        self.inner.insert(snapshot, created).await
    }

    async fn load(&self, key: &EntityKey) -> Result<EntitySnapshot, StorageError> {
        self.inner.load(key).await
    }

    async fn commit(
        &self,
        _expected_version: u64,
        _snapshot: &EntitySnapshot,
        _event: &AuditEvent,
    ) -> Result<(), StorageError> {
        Err(self.error.clone())
    }

    async fn history(&self, key: &EntityKey) -> Result<AuditTrail, StorageError> {
        self.inner.history(key).await
    }

    async fn list(
        &self,
        entity_type: &EntityType,
        state: Option<&LifecycleState>,
    ) -> Result<Vec<EntitySnapshot>, StorageError> {
        self.inner.list(entity_type, state).await
    }
}
