//! Governed-record data model: identities, snapshots and audit events.
//!
//! Every governed record is addressed by an [`EntityKey`] (its type plus an
//! id scoped to that type), carries its field values and lifecycle state in
//! an [`EntitySnapshot`], and owns an [`AuditTrail`] that only ever grows.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

// ──────────────────────────────────────────────
// Identities
// ──────────────────────────────────────────────

/// A category of governed record (`Acquisition`, `Disposal`, `Permit`, ...).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityType(pub String);

/// Stable identifier of one record, unique within its [`EntityType`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub String);

/// A named lifecycle stage, unique within its entity type's graph.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LifecycleState(pub String);

macro_rules! string_newtype {
    ($name:ident) => {
        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl PartialEq<str> for $name {
            fn eq(&self, other: &str) -> bool {
                self.0 == other
            }
        }

        impl PartialEq<&str> for $name {
            fn eq(&self, other: &&str) -> bool {
                self.0 == *other
            }
        }
    };
}

string_newtype!(EntityType);
string_newtype!(EntityId);
string_newtype!(LifecycleState);

/// Composite identity of one governed record.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityKey {
    pub entity_type: EntityType,
    pub id: EntityId,
}

impl EntityKey {
    pub fn new(entity_type: impl Into<EntityType>, id: impl Into<EntityId>) -> Self {
        Self {
            entity_type: entity_type.into(),
            id: id.into(),
        }
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.entity_type, self.id)
    }
}

// ──────────────────────────────────────────────
// Snapshots
// ──────────────────────────────────────────────

/// Field values of one record, keyed by field name.
pub type Fields = BTreeMap<String, serde_json::Value>;

/// Requested field mutations. A `null` value clears the field.
pub type FieldChanges = BTreeMap<String, serde_json::Value>;

/// Whether a field value counts as absent for compliance purposes.
///
/// `null`, blank strings and empty collections are all treated as missing.
pub fn is_empty_value(value: Option<&serde_json::Value>) -> bool {
    match value {
        None | Some(serde_json::Value::Null) => true,
        Some(serde_json::Value::String(s)) => s.trim().is_empty(),
        Some(serde_json::Value::Array(items)) => items.is_empty(),
        Some(serde_json::Value::Object(map)) => map.is_empty(),
        Some(_) => false,
    }
}

/// The current field values, lifecycle state and version of one record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitySnapshot {
    pub key: EntityKey,
    pub fields: Fields,
    pub state: LifecycleState,
    /// Starts at 0 on creation; each committed mutation adds exactly 1.
    pub version: u64,
}

impl EntitySnapshot {
    pub fn field(&self, name: &str) -> Option<&serde_json::Value> {
        self.fields.get(name)
    }

    pub fn has_field(&self, name: &str) -> bool {
        !is_empty_value(self.fields.get(name))
    }
}

// ──────────────────────────────────────────────
// Audit events
// ──────────────────────────────────────────────

/// What kind of mutation an audit event records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AuditAction {
    Created,
    StateTransition,
    FieldEdit,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Created => "Created",
            AuditAction::StateTransition => "StateTransition",
            AuditAction::FieldEdit => "FieldEdit",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Before/after value of one field touched by a `FieldEdit`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldChange {
    pub field: String,
    pub previous: Option<serde_json::Value>,
    pub current: Option<serde_json::Value>,
}

/// One committed mutation of a record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    /// The entity version this mutation produced (`Created` is 0).
    pub sequence: u64,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub actor: String,
    pub action: AuditAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_state: Option<LifecycleState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_state: Option<LifecycleState>,
    /// Justification supplied by the actor. Never empty.
    pub details: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub changes: Vec<FieldChange>,
}

// ──────────────────────────────────────────────
// Audit trail
// ──────────────────────────────────────────────

/// The ordered audit history of one record.
///
/// An `AuditTrail` is a read-only value: it has no method that inserts,
/// edits, reorders or removes an event. Iteration is most-recent-first and
/// every call to [`AuditTrail::iter`] starts again at the head.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuditTrail {
    /// Stored oldest-first.
    events: Arc<[AuditEvent]>,
}

impl AuditTrail {
    /// Build a trail from events in the order they were committed (oldest first).
    pub fn from_chronological(events: Vec<AuditEvent>) -> Self {
        Self {
            events: events.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// The most recent event.
    pub fn head(&self) -> Option<&AuditEvent> {
        self.events.last()
    }

    /// The first event ever recorded (the `Created` event).
    pub fn oldest(&self) -> Option<&AuditEvent> {
        self.events.first()
    }

    /// Event at position `index`, where 0 is the most recent.
    pub fn get(&self, index: usize) -> Option<&AuditEvent> {
        let len = self.events.len();
        if index >= len {
            return None;
        }
        self.events.get(len - 1 - index)
    }

    /// Events most-recent-first.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &AuditEvent> + ExactSizeIterator {
        self.events.iter().rev()
    }

    /// Events most-recent-first, cloned into an owned vector.
    pub fn to_vec(&self) -> Vec<AuditEvent> {
        self.iter().cloned().collect()
    }
}

impl Serialize for AuditTrail {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.iter())
    }
}

impl<'a> IntoIterator for &'a AuditTrail {
    type Item = &'a AuditEvent;
    type IntoIter = std::iter::Rev<std::slice::Iter<'a, AuditEvent>>;

    fn into_iter(self) -> Self::IntoIter {
        self.events.iter().rev()
    }
}
