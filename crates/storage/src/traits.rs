use std::sync::Arc;

use async_trait::async_trait;
use tenure_core::{AuditEvent, AuditTrail, EntityKey, EntitySnapshot, EntityType, LifecycleState};

use crate::error::StorageError;

/// The storage trait for governed entities and their audit trails.
///
/// A `Repository` owns two things per entity: the current snapshot and an
/// append-only list of audit events. There is deliberately no way to update
/// or delete an audit event.
///
/// ## Atomic commit
///
/// [`commit`](Repository::commit) writes the new snapshot and appends one
/// audit event as a single unit. Either both become visible or neither does.
///
/// ## OCC Conflict Detection
///
/// `commit` performs an optimistic concurrency check against the version the
/// caller read: `UPDATE WHERE version = expected_version`. If the stored
/// version differs, the method returns
/// `Err(StorageError::ConcurrentConflict { .. })` and writes nothing.
///
/// ## Sequence contract
///
/// - `insert` takes a snapshot at version 0 and an event with sequence 0.
/// - `commit` takes a snapshot at `expected_version + 1` and an event whose
///   sequence equals that new version.
///
/// Anything else is rejected with `StorageError::InvalidCommit`.
///
/// ## Thread Safety
///
/// Implementations must be `Send + Sync + 'static` so one repository can be
/// shared across async tasks.
#[async_trait]
pub trait Repository: Send + Sync + 'static {
    /// Insert a new entity together with its creation event.
    ///
    /// Returns `AlreadyExists` if the key is taken.
    async fn insert(
        &self,
        snapshot: &EntitySnapshot,
        created: &AuditEvent,
    ) -> Result<(), StorageError>;

    /// Load the current snapshot of an entity.
    ///
    /// Returns `EntityNotFound` if the entity does not exist.
    async fn load(&self, key: &EntityKey) -> Result<EntitySnapshot, StorageError>;

    /// Atomically replace the snapshot and append one audit event, provided
    /// the stored version still equals `expected_version`.
    async fn commit(
        &self,
        expected_version: u64,
        snapshot: &EntitySnapshot,
        event: &AuditEvent,
    ) -> Result<(), StorageError>;

    /// The full audit trail of an entity, most recent first.
    async fn history(&self, key: &EntityKey) -> Result<AuditTrail, StorageError>;

    /// All entities of one type, optionally restricted to one lifecycle
    /// state, ordered by id.
    async fn list(
        &self,
        entity_type: &EntityType,
        state: Option<&LifecycleState>,
    ) -> Result<Vec<EntitySnapshot>, StorageError>;
}

#[async_trait]
impl<R: Repository + ?Sized> Repository for Arc<R> {
    async fn insert(
        &self,
        snapshot: &EntitySnapshot,
        created: &AuditEvent,
    ) -> Result<(), StorageError> {
        (**self).insert(snapshot, created).await
    }

    async fn load(&self, key: &EntityKey) -> Result<EntitySnapshot, StorageError> {
        (**self).load(key).await
    }

    async fn commit(
        &self,
        expected_version: u64,
        snapshot: &EntitySnapshot,
        event: &AuditEvent,
    ) -> Result<(), StorageError> {
        (**self).commit(expected_version, snapshot, event).await
    }

    async fn history(&self, key: &EntityKey) -> Result<AuditTrail, StorageError> {
        (**self).history(key).await
    }

    async fn list(
        &self,
        entity_type: &EntityType,
        state: Option<&LifecycleState>,
    ) -> Result<Vec<EntitySnapshot>, StorageError> {
        (**self).list(entity_type, state).await
    }
}
