//! In-memory [`Repository`] backed by a lock-protected map of rows.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use tenure_core::{
    AuditAction, AuditEvent, AuditTrail, EntityKey, EntitySnapshot, EntityType, LifecycleState,
};

use crate::error::StorageError;
use crate::record::{AuditRow, EntityRow};
use crate::traits::Repository;

#[derive(Debug)]
struct Stored {
    row: EntityRow,
    audit: Vec<AuditRow>,
}

/// Process-local repository. Every write takes the single write lock, so the
/// version check and the write happen atomically.
#[derive(Debug, Default)]
pub struct MemoryRepository {
    entities: RwLock<HashMap<EntityKey, Stored>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, HashMap<EntityKey, Stored>>, StorageError> {
        self.entities
            .read()
            .map_err(|e| StorageError::Backend(format!("lock poisoned: {}", e)))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, HashMap<EntityKey, Stored>>, StorageError> {
        self.entities
            .write()
            .map_err(|e| StorageError::Backend(format!("lock poisoned: {}", e)))
    }
}

fn invalid(key: &EntityKey, reason: impl Into<String>) -> StorageError {
    StorageError::InvalidCommit {
        key: key.clone(),
        reason: reason.into(),
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn insert(
        &self,
        snapshot: &EntitySnapshot,
        created: &AuditEvent,
    ) -> Result<(), StorageError> {
        let key = &snapshot.key;
        if snapshot.version != 0 || created.sequence != 0 {
            return Err(invalid(key, "new entities start at version 0"));
        }
        if created.action != AuditAction::Created {
            return Err(invalid(key, "first audit event must be Created"));
        }
        let audit_row = AuditRow::from_event(key, created)?;

        let mut entities = self.write()?;
        if entities.contains_key(key) {
            return Err(StorageError::AlreadyExists { key: key.clone() });
        }
        entities.insert(
            key.clone(),
            Stored {
                row: EntityRow::from(snapshot),
                audit: vec![audit_row],
            },
        );
        tracing::debug!(entity = %key, "entity inserted");
        Ok(())
    }

    async fn load(&self, key: &EntityKey) -> Result<EntitySnapshot, StorageError> {
        let entities = self.read()?;
        entities
            .get(key)
            .map(|stored| stored.row.to_snapshot())
            .ok_or_else(|| StorageError::EntityNotFound { key: key.clone() })
    }

    async fn commit(
        &self,
        expected_version: u64,
        snapshot: &EntitySnapshot,
        event: &AuditEvent,
    ) -> Result<(), StorageError> {
        let key = &snapshot.key;
        let next = expected_version + 1;
        if snapshot.version != next {
            return Err(invalid(
                key,
                format!(
                    "snapshot version {} does not follow {}",
                    snapshot.version, expected_version
                ),
            ));
        }
        if event.sequence != next {
            return Err(invalid(
                key,
                format!("event sequence {} does not match version {}", event.sequence, next),
            ));
        }
        if event.action == AuditAction::Created {
            return Err(invalid(key, "Created events are only written on insert"));
        }
        let audit_row = AuditRow::from_event(key, event)?;

        let mut entities = self.write()?;
        let stored = entities
            .get_mut(key)
            .ok_or_else(|| StorageError::EntityNotFound { key: key.clone() })?;
        if stored.row.version != expected_version {
            tracing::debug!(
                entity = %key,
                expected_version,
                actual_version = stored.row.version,
                "version check failed"
            );
            return Err(StorageError::ConcurrentConflict {
                key: key.clone(),
                expected_version,
                actual_version: stored.row.version,
            });
        }
        stored.row = EntityRow::from(snapshot);
        stored.audit.push(audit_row);
        Ok(())
    }

    async fn history(&self, key: &EntityKey) -> Result<AuditTrail, StorageError> {
        let entities = self.read()?;
        let stored = entities
            .get(key)
            .ok_or_else(|| StorageError::EntityNotFound { key: key.clone() })?;
        let events = stored
            .audit
            .iter()
            .map(AuditRow::to_event)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(AuditTrail::from_chronological(events))
    }

    async fn list(
        &self,
        entity_type: &EntityType,
        state: Option<&LifecycleState>,
    ) -> Result<Vec<EntitySnapshot>, StorageError> {
        let entities = self.read()?;
        let mut found: Vec<EntitySnapshot> = entities
            .iter()
            .filter(|(key, _)| &key.entity_type == entity_type)
            .filter(|(_, stored)| {
                state.map_or(true, |s| stored.row.lifecycle_state == s.as_str())
            })
            .map(|(_, stored)| stored.row.to_snapshot())
            .collect();
        found.sort_by(|a, b| a.key.id.cmp(&b.key.id));
        Ok(found)
    }
}
