//! Persisted row layout for entities and audit events.
//!
//! Backends store one [`EntityRow`] per entity and an append-only list of
//! [`AuditRow`]s per entity, indexed by entity and sequence. Timestamps are
//! RFC 3339 strings so rows can go straight into text-oriented stores.

use serde::{Deserialize, Serialize};
use tenure_core::{
    AuditAction, AuditEvent, EntityKey, EntitySnapshot, FieldChange, Fields, LifecycleState,
};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::error::StorageError;

/// A snapshot of an entity as stored in the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRow {
    pub id: String,
    pub entity_type: String,
    pub fields: Fields,
    pub lifecycle_state: String,
    pub version: u64,
}

/// One stored audit event. Rows are only ever inserted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRow {
    /// `<entity_type>/<entity_id>#<sequence>`.
    pub id: String,
    pub entity_type: String,
    pub entity_id: String,
    pub sequence: u64,
    /// ISO 8601 / RFC 3339 timestamp string.
    pub timestamp: String,
    pub actor: String,
    pub action: String,
    pub from_state: Option<String>,
    pub to_state: Option<String>,
    pub details: String,
    pub changes: Vec<FieldChange>,
}

impl From<&EntitySnapshot> for EntityRow {
    fn from(snapshot: &EntitySnapshot) -> Self {
        EntityRow {
            id: snapshot.key.id.to_string(),
            entity_type: snapshot.key.entity_type.to_string(),
            fields: snapshot.fields.clone(),
            lifecycle_state: snapshot.state.to_string(),
            version: snapshot.version,
        }
    }
}

impl EntityRow {
    pub fn key(&self) -> EntityKey {
        EntityKey::new(self.entity_type.as_str(), self.id.as_str())
    }

    pub fn to_snapshot(&self) -> EntitySnapshot {
        EntitySnapshot {
            key: self.key(),
            fields: self.fields.clone(),
            state: LifecycleState::new(self.lifecycle_state.as_str()),
            version: self.version,
        }
    }
}

impl AuditRow {
    pub fn from_event(key: &EntityKey, event: &AuditEvent) -> Result<Self, StorageError> {
        let timestamp = event
            .timestamp
            .format(&Rfc3339)
            .map_err(|e| StorageError::Backend(format!("timestamp format: {}", e)))?;
        Ok(AuditRow {
            id: format!("{}#{}", key, event.sequence),
            entity_type: key.entity_type.to_string(),
            entity_id: key.id.to_string(),
            sequence: event.sequence,
            timestamp,
            actor: event.actor.clone(),
            action: event.action.as_str().to_string(),
            from_state: event.from_state.as_ref().map(|s| s.to_string()),
            to_state: event.to_state.as_ref().map(|s| s.to_string()),
            details: event.details.clone(),
            changes: event.changes.clone(),
        })
    }

    pub fn to_event(&self) -> Result<AuditEvent, StorageError> {
        let timestamp = OffsetDateTime::parse(&self.timestamp, &Rfc3339).map_err(|e| {
            StorageError::Backend(format!("audit row {}: bad timestamp: {}", self.id, e))
        })?;
        let action = match self.action.as_str() {
            "Created" => AuditAction::Created,
            "StateTransition" => AuditAction::StateTransition,
            "FieldEdit" => AuditAction::FieldEdit,
            other => {
                return Err(StorageError::Backend(format!(
                    "audit row {}: unknown action '{}'",
                    self.id, other
                )))
            }
        };
        Ok(AuditEvent {
            sequence: self.sequence,
            timestamp,
            actor: self.actor.clone(),
            action,
            from_state: self.from_state.as_deref().map(LifecycleState::new),
            to_state: self.to_state.as_deref().map(LifecycleState::new),
            details: self.details.clone(),
            changes: self.changes.clone(),
        })
    }
}
