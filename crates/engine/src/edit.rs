//! Edit executor: field changes outside the lifecycle, always justified.

use tenure_core::{
    AuditAction, AuditEvent, EntityKey, EntitySnapshot, FieldChange, FieldChanges,
};
use tenure_storage::Repository;

use crate::engine::{require_actor, require_reason, Engine};
use crate::error::{EditError, EngineError, ErrorKind};

impl<R: Repository> Engine<R> {
    /// Apply `changes` to an entity's fields. A `null` value clears the field.
    ///
    /// Checks, in order: reason present, entity exists, entity not finalized
    /// (unless every requested field is on the type's
    /// editable-after-finalization list), at least one field actually changes,
    /// actor present.
    pub async fn request_edit(
        &self,
        key: &EntityKey,
        changes: FieldChanges,
        actor: &str,
        reason: &str,
    ) -> Result<EntitySnapshot, EditError> {
        let result = self.try_edit(key, changes, actor, reason).await;
        if let Err(err) = &result {
            tracing::warn!(
                entity_type = %key.entity_type,
                entity_id = %key.id,
                actor,
                error = err.kind.code(),
                "edit rejected: {}",
                err.kind
            );
        }
        result
    }

    async fn try_edit(
        &self,
        key: &EntityKey,
        changes: FieldChanges,
        actor: &str,
        reason: &str,
    ) -> Result<EntitySnapshot, EditError> {
        require_reason(key, reason)?;
        let graph = self.graph_for(key)?;
        let current = self.load(key).await?;

        if graph.is_terminal(&current.state) {
            let locked: Vec<String> = changes
                .keys()
                .filter(|field| !graph.editable_after_finalization(field))
                .cloned()
                .collect();
            if changes.is_empty() || !locked.is_empty() {
                return Err(EngineError::new(
                    key,
                    ErrorKind::Finalized {
                        state: current.state.clone(),
                        fields: locked,
                    },
                ));
            }
        }

        let mut next = current.clone();
        let mut applied = Vec::new();
        for (field, value) in changes {
            let previous = current.fields.get(&field).cloned();
            let new_value = (!value.is_null()).then_some(value);
            if previous == new_value {
                continue;
            }
            match &new_value {
                Some(v) => next.fields.insert(field.clone(), v.clone()),
                None => next.fields.remove(&field),
            };
            applied.push(FieldChange {
                field,
                previous,
                current: new_value,
            });
        }
        if applied.is_empty() {
            return Err(EngineError::new(key, ErrorKind::NoChanges));
        }
        require_actor(key, actor)?;

        next.version = current.version + 1;
        let event = AuditEvent {
            sequence: next.version,
            timestamp: self.now(),
            actor: actor.to_string(),
            action: AuditAction::FieldEdit,
            from_state: None,
            to_state: None,
            details: reason.to_string(),
            changes: applied,
        };
        self.repository()
            .commit(current.version, &next, &event)
            .await
            .map_err(|e| EngineError::storage(key, e))?;

        tracing::info!(
            entity_type = %key.entity_type,
            entity_id = %key.id,
            fields = event.changes.len(),
            version = next.version,
            actor,
            "edit committed"
        );
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::{json, Value};
    use tenure_core::{Fields, Registry};
    use tenure_storage::MemoryRepository;

    use super::*;

    const ARCHIVE: &str = r#"{
        "entity_types": [{
            "name": "Record",
            "states": ["Open", "Archived"],
            "initial": "Open",
            "transitions": [{ "from": "Open", "to": "Archived" }],
            "editable_after_finalization": ["retentionNote"]
        }]
    }"#;

    async fn setup() -> (Engine<MemoryRepository>, EntityKey) {
        let registry = Registry::from_json_str(ARCHIVE).unwrap();
        let engine = Engine::new(Arc::new(registry), MemoryRepository::new());
        let mut fields = Fields::new();
        fields.insert("title".into(), json!("Deed 12"));
        fields.insert("pages".into(), json!(4));
        let key = engine
            .create_entity(&"Record".into(), &"R-1".into(), fields, "clerk", "filed")
            .await
            .unwrap()
            .key;
        (engine, key)
    }

    fn change(field: &str, value: Value) -> FieldChanges {
        [(field.to_string(), value)].into_iter().collect()
    }

    #[tokio::test]
    async fn edit_records_previous_and_current_values() {
        let (engine, key) = setup().await;
        let snapshot = engine
            .request_edit(&key, change("pages", json!(5)), "clerk", "recount")
            .await
            .unwrap();
        assert_eq!(snapshot.field("pages"), Some(&json!(5)));
        assert_eq!(snapshot.version, 1);

        let history = engine.get_history(&key).await.unwrap();
        let head = history.head().unwrap();
        assert_eq!(head.action, AuditAction::FieldEdit);
        assert_eq!(head.details, "recount");
        assert_eq!(
            head.changes,
            vec![FieldChange {
                field: "pages".into(),
                previous: Some(json!(4)),
                current: Some(json!(5)),
            }]
        );
    }

    #[tokio::test]
    async fn null_clears_a_field() {
        let (engine, key) = setup().await;
        let snapshot = engine
            .request_edit(&key, change("title", Value::Null), "clerk", "redact")
            .await
            .unwrap();
        assert!(!snapshot.fields.contains_key("title"));
        let history = engine.get_history(&key).await.unwrap();
        assert_eq!(history.head().unwrap().changes[0].current, None);
    }

    #[tokio::test]
    async fn unchanged_values_are_no_changes() {
        let (engine, key) = setup().await;
        let err = engine
            .request_edit(&key, change("pages", json!(4)), "clerk", "noop")
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::NoChanges);
        let err = engine
            .request_edit(&key, change("missing", Value::Null), "clerk", "noop")
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::NoChanges);
    }

    #[tokio::test]
    async fn justification_checked_before_existence() {
        let (engine, _) = setup().await;
        let err = engine
            .request_edit(
                &EntityKey::new("Record", "ghost"),
                change("pages", json!(1)),
                "clerk",
                "",
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::MissingJustification);
    }

    #[tokio::test]
    async fn anonymous_unjustified_edit_is_missing_justification() {
        let (engine, key) = setup().await;
        let err = engine
            .request_edit(&key, change("pages", json!(9)), "", "")
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::MissingJustification);

        let err = engine
            .request_edit(&key, change("pages", json!(9)), "", "recount")
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::MissingActor);
        assert_eq!(engine.get_history(&key).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn finalized_entity_only_accepts_allow_listed_fields() {
        let (engine, key) = setup().await;
        engine
            .request_transition(&key, &"Archived".into(), "clerk", "retention period")
            .await
            .unwrap();

        let err = engine
            .request_edit(&key, change("pages", json!(6)), "clerk", "late fix")
            .await
            .unwrap_err();
        assert_eq!(
            err.kind,
            ErrorKind::Finalized {
                state: "Archived".into(),
                fields: vec!["pages".into()],
            }
        );

        let snapshot = engine
            .request_edit(
                &key,
                change("retentionNote", json!("hold 7y")),
                "records.officer",
                "retention schedule",
            )
            .await
            .unwrap();
        assert_eq!(snapshot.version, 2);
    }

    #[tokio::test]
    async fn finalized_mixed_edit_reports_only_locked_fields() {
        let (engine, key) = setup().await;
        engine
            .request_transition(&key, &"Archived".into(), "clerk", "retention period")
            .await
            .unwrap();

        let changes: FieldChanges = [
            ("retentionNote".to_string(), json!("hold 7y")),
            ("title".to_string(), json!("Deed 12A")),
            ("pages".to_string(), json!(6)),
        ]
        .into_iter()
        .collect();
        let err = engine
            .request_edit(&key, changes, "records.officer", "retention schedule")
            .await
            .unwrap_err();
        assert_eq!(
            err.kind,
            ErrorKind::Finalized {
                state: "Archived".into(),
                fields: vec!["pages".into(), "title".into()],
            }
        );

        let snapshot = engine.get_snapshot(&key).await.unwrap();
        assert_eq!(snapshot.version, 1);
        assert!(!snapshot.fields.contains_key("retentionNote"));
        assert_eq!(snapshot.field("title"), Some(&json!("Deed 12")));
    }
}
