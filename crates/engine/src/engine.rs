//! The engine: one generic executor parameterised by the registry's graphs.

use std::sync::Arc;

use serde::Serialize;
use tenure_core::{
    evaluate_guards, AuditAction, AuditEvent, AuditTrail, EntityId, EntityKey, EntitySnapshot,
    EntityType, FieldChange, Fields, LifecycleState, Registry, StateGraph,
};
use tenure_storage::Repository;

use crate::clock::{Clock, SystemClock};
use crate::error::{EngineError, ErrorKind};

/// Lifecycle and audit governance over a [`Repository`].
///
/// All operations take `&self`; share one engine across tasks behind an
/// `Arc`. The registry is fixed for the lifetime of the engine.
pub struct Engine<R: Repository> {
    registry: Arc<Registry>,
    repository: R,
    clock: Arc<dyn Clock>,
}

/// One candidate next state and whether its guards currently pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransitionOption {
    pub to: LifecycleState,
    /// Every failing guard reason; empty when the transition is allowed.
    pub blocked_by: Vec<String>,
}

impl TransitionOption {
    pub fn is_allowed(&self) -> bool {
        self.blocked_by.is_empty()
    }
}

impl<R: Repository> Engine<R> {
    pub fn new(registry: Arc<Registry>, repository: R) -> Self {
        Self {
            registry,
            repository,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn repository(&self) -> &R {
        &self.repository
    }

    pub(crate) fn now(&self) -> time::OffsetDateTime {
        self.clock.now()
    }

    /// The graph governing `key`. An entity whose type has no graph cannot
    /// exist, so a missing graph reads as `NotFound`.
    pub(crate) fn graph_for(&self, key: &EntityKey) -> Result<&StateGraph, EngineError> {
        self.registry
            .get(&key.entity_type)
            .ok_or_else(|| EngineError::new(key, ErrorKind::NotFound))
    }

    pub(crate) async fn load(&self, key: &EntityKey) -> Result<EntitySnapshot, EngineError> {
        self.repository
            .load(key)
            .await
            .map_err(|e| EngineError::storage(key, e))
    }

    /// Create an entity in its type's initial state at version 0, together
    /// with its `Created` audit event. Null field values are dropped.
    pub async fn create_entity(
        &self,
        entity_type: &EntityType,
        id: &EntityId,
        fields: Fields,
        actor: &str,
        reason: &str,
    ) -> Result<EntitySnapshot, EngineError> {
        let key = EntityKey::new(entity_type.clone(), id.clone());
        let result = self.try_create(&key, fields, actor, reason).await;
        if let Err(err) = &result {
            tracing::warn!(
                entity_type = %key.entity_type,
                entity_id = %key.id,
                actor,
                error = err.kind.code(),
                "create rejected: {}",
                err.kind
            );
        }
        result
    }

    async fn try_create(
        &self,
        key: &EntityKey,
        fields: Fields,
        actor: &str,
        reason: &str,
    ) -> Result<EntitySnapshot, EngineError> {
        require_reason(key, reason)?;
        require_actor(key, actor)?;
        let graph = self
            .registry
            .get(&key.entity_type)
            .ok_or_else(|| EngineError::new(key, ErrorKind::UnknownEntityType))?;

        let fields: Fields = fields.into_iter().filter(|(_, v)| !v.is_null()).collect();
        let changes = fields
            .iter()
            .map(|(field, value)| FieldChange {
                field: field.clone(),
                previous: None,
                current: Some(value.clone()),
            })
            .collect();
        let snapshot = EntitySnapshot {
            key: key.clone(),
            fields,
            state: graph.initial().clone(),
            version: 0,
        };
        let event = AuditEvent {
            sequence: 0,
            timestamp: self.now(),
            actor: actor.to_string(),
            action: AuditAction::Created,
            from_state: None,
            to_state: Some(snapshot.state.clone()),
            details: reason.to_string(),
            changes,
        };
        self.repository
            .insert(&snapshot, &event)
            .await
            .map_err(|e| EngineError::storage(key, e))?;

        tracing::info!(
            entity_type = %key.entity_type,
            entity_id = %key.id,
            state = %snapshot.state,
            actor,
            "entity created"
        );
        Ok(snapshot)
    }

    /// Current lifecycle state.
    pub async fn get_state(&self, key: &EntityKey) -> Result<LifecycleState, EngineError> {
        Ok(self.load(key).await?.state)
    }

    /// Current fields, state and version.
    pub async fn get_snapshot(&self, key: &EntityKey) -> Result<EntitySnapshot, EngineError> {
        self.load(key).await
    }

    /// The audit trail, most recent first.
    pub async fn get_history(&self, key: &EntityKey) -> Result<AuditTrail, EngineError> {
        self.repository
            .history(key)
            .await
            .map_err(|e| EngineError::storage(key, e))
    }

    /// Every legal next state from the current state, in presentation order,
    /// with the guard verdict each would get right now. Writes nothing.
    pub async fn available_transitions(
        &self,
        key: &EntityKey,
    ) -> Result<Vec<TransitionOption>, EngineError> {
        let graph = self.graph_for(key)?;
        let snapshot = self.load(key).await?;
        let options = graph
            .next_states(&snapshot.state)
            .into_iter()
            .map(|to| {
                let guards = graph.guards(&snapshot.state, to).unwrap_or(&[]);
                TransitionOption {
                    to: to.clone(),
                    blocked_by: evaluate_guards(guards, &snapshot, &snapshot.state, to),
                }
            })
            .collect();
        Ok(options)
    }
}

pub(crate) fn require_reason(key: &EntityKey, reason: &str) -> Result<(), EngineError> {
    if reason.trim().is_empty() {
        return Err(EngineError::new(key, ErrorKind::MissingJustification));
    }
    Ok(())
}

/// Checked last: every lifecycle rejection takes precedence over a missing actor.
pub(crate) fn require_actor(key: &EntityKey, actor: &str) -> Result<(), EngineError> {
    if actor.trim().is_empty() {
        return Err(EngineError::new(key, ErrorKind::MissingActor));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tenure_storage::MemoryRepository;

    fn engine() -> Engine<MemoryRepository> {
        Engine::new(
            Arc::new(Registry::builtin().unwrap()),
            MemoryRepository::new(),
        )
    }

    #[tokio::test]
    async fn create_places_entity_in_initial_state() {
        let engine = engine();
        let mut fields = Fields::new();
        fields.insert("reportOfExcess".into(), json!("ROE-17"));
        fields.insert("notes".into(), serde_json::Value::Null);
        let snapshot = engine
            .create_entity(&"Disposal".into(), &"D-1".into(), fields, "clerk", "new case")
            .await
            .unwrap();
        assert_eq!(snapshot.state, "Initiated");
        assert_eq!(snapshot.version, 0);
        assert!(!snapshot.fields.contains_key("notes"));

        let history = engine.get_history(&snapshot.key).await.unwrap();
        assert_eq!(history.len(), 1);
        let created = history.head().unwrap();
        assert_eq!(created.action, AuditAction::Created);
        assert_eq!(created.details, "new case");
        assert_eq!(created.changes.len(), 1);
    }

    #[tokio::test]
    async fn create_rejects_unknown_type_and_duplicates() {
        let engine = engine();
        let err = engine
            .create_entity(&"Spaceship".into(), &"S-1".into(), Fields::new(), "clerk", "x")
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::UnknownEntityType);

        engine
            .create_entity(&"Permit".into(), &"P-1".into(), Fields::new(), "clerk", "x")
            .await
            .unwrap();
        let err = engine
            .create_entity(&"Permit".into(), &"P-1".into(), Fields::new(), "clerk", "x")
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::AlreadyExists);
    }

    #[tokio::test]
    async fn create_requires_actor_and_reason() {
        let engine = engine();
        let err = engine
            .create_entity(&"Permit".into(), &"P-1".into(), Fields::new(), " ", "x")
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::MissingActor);
        let err = engine
            .create_entity(&"Permit".into(), &"P-1".into(), Fields::new(), "clerk", "")
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::MissingJustification);
    }

    #[tokio::test]
    async fn available_transitions_reports_guard_verdicts() {
        let engine = engine();
        let snapshot = engine
            .create_entity(
                &"CostShareAgreement".into(),
                &"CSA-1".into(),
                Fields::new(),
                "clerk",
                "draft",
            )
            .await
            .unwrap();
        let options = engine.available_transitions(&snapshot.key).await.unwrap();
        let targets: Vec<&str> = options.iter().map(|o| o.to.as_str()).collect();
        assert_eq!(targets, ["Negotiation", "Terminated"]);
        assert!(options[0].is_allowed());
        assert_eq!(
            options[1].blocked_by,
            ["required field 'terminationNotice' is missing"]
        );
        // Pure read.
        assert_eq!(engine.get_history(&snapshot.key).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn reads_of_missing_entity_are_not_found() {
        let engine = engine();
        let key = EntityKey::new("Permit", "nope");
        assert_eq!(
            engine.get_state(&key).await.unwrap_err().kind,
            ErrorKind::NotFound
        );
        assert_eq!(
            engine.get_history(&key).await.unwrap_err().kind,
            ErrorKind::NotFound
        );
    }
}
