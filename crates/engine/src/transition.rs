//! Transition executor.
//!
//! A request is checked in this order, and the first failing check rejects it:
//! 1. entity exists
//! 2. target is a legal next state (terminal states have none)
//! 3. every guard bound to the edge passes (all reasons reported together)
//! 4. reason present
//! 5. actor present
//!
//! On success the new state, the version bump and one `StateTransition`
//! audit event are committed together under the version that was read.

use tenure_core::{
    evaluate_guards, AuditAction, AuditEvent, EntityKey, EntitySnapshot, LifecycleState,
};
use tenure_storage::Repository;

use crate::engine::{require_actor, require_reason, Engine};
use crate::error::{EngineError, ErrorKind, TransitionError};

impl<R: Repository> Engine<R> {
    /// Move an entity to `to`, recording `reason` in its audit trail.
    pub async fn request_transition(
        &self,
        key: &EntityKey,
        to: &LifecycleState,
        actor: &str,
        reason: &str,
    ) -> Result<EntitySnapshot, TransitionError> {
        let result = self.try_transition(key, to, actor, reason).await;
        if let Err(err) = &result {
            tracing::warn!(
                entity_type = %key.entity_type,
                entity_id = %key.id,
                to = %to,
                actor,
                error = err.kind.code(),
                "transition rejected: {}",
                err.kind
            );
        }
        result
    }

    async fn try_transition(
        &self,
        key: &EntityKey,
        to: &LifecycleState,
        actor: &str,
        reason: &str,
    ) -> Result<EntitySnapshot, TransitionError> {
        let graph = self.graph_for(key)?;
        let current = self.load(key).await?;
        let from = &current.state;

        if !graph.is_legal_edge(from, to) {
            return Err(EngineError::new(
                key,
                ErrorKind::IllegalEdge {
                    from: from.clone(),
                    to: to.clone(),
                    allowed: graph.next_states(from).into_iter().cloned().collect(),
                },
            ));
        }

        let guards = graph.guards(from, to).unwrap_or(&[]);
        let reasons = evaluate_guards(guards, &current, from, to);
        if !reasons.is_empty() {
            return Err(EngineError::new(key, ErrorKind::GuardFailed { reasons }));
        }

        require_reason(key, reason)?;
        require_actor(key, actor)?;

        let mut next = current.clone();
        next.state = to.clone();
        next.version = current.version + 1;
        let event = AuditEvent {
            sequence: next.version,
            timestamp: self.now(),
            actor: actor.to_string(),
            action: AuditAction::StateTransition,
            from_state: Some(from.clone()),
            to_state: Some(to.clone()),
            details: reason.to_string(),
            changes: Vec::new(),
        };
        self.repository()
            .commit(current.version, &next, &event)
            .await
            .map_err(|e| EngineError::storage(key, e))?;

        tracing::info!(
            entity_type = %key.entity_type,
            entity_id = %key.id,
            from = %from,
            to = %to,
            version = next.version,
            actor,
            "transition committed"
        );
        Ok(next)
    }
}
