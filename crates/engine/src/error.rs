use serde::Serialize;
use tenure_core::{EntityKey, LifecycleState};
use tenure_storage::StorageError;

/// Why a request was rejected.
///
/// Every rejected request leaves the entity and its audit trail exactly as
/// they were. Only [`ConcurrentModification`](ErrorKind::ConcurrentModification)
/// and [`RepositoryUnavailable`](ErrorKind::RepositoryUnavailable) are
/// transient; the rest need a corrected request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ErrorKind {
    #[error("entity not found")]
    NotFound,

    /// `to` is not a legal next state of `from`. An empty `allowed` list
    /// means `from` is terminal.
    #[error("illegal transition '{from}' -> '{to}' ({})", describe_allowed(.allowed))]
    IllegalEdge {
        from: LifecycleState,
        to: LifecycleState,
        allowed: Vec<LifecycleState>,
    },

    #[error("transition blocked: {}", .reasons.join("; "))]
    GuardFailed { reasons: Vec<String> },

    #[error("a non-empty reason is required")]
    MissingJustification,

    #[error("an actor is required")]
    MissingActor,

    #[error("entity is finalized in state '{state}'{}", describe_fields(.fields))]
    Finalized {
        state: LifecycleState,
        fields: Vec<String>,
    },

    #[error("edit does not change any field")]
    NoChanges,

    #[error("entity already exists")]
    AlreadyExists,

    #[error("no lifecycle is registered for this entity type")]
    UnknownEntityType,

    #[error("modified concurrently since version {expected_version} was read; reload and retry")]
    ConcurrentModification { expected_version: u64 },

    #[error("repository unavailable: {message}")]
    RepositoryUnavailable { message: String },
}

fn describe_allowed(allowed: &[LifecycleState]) -> String {
    if allowed.is_empty() {
        return "state is terminal".to_string();
    }
    let names: Vec<&str> = allowed.iter().map(|s| s.as_str()).collect();
    format!("allowed: {}", names.join(", "))
}

fn describe_fields(fields: &[String]) -> String {
    if fields.is_empty() {
        String::new()
    } else {
        format!("; not editable: {}", fields.join(", "))
    }
}

impl ErrorKind {
    /// Stable machine-readable name, used in logs.
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::IllegalEdge { .. } => "illegal_edge",
            ErrorKind::GuardFailed { .. } => "guard_failed",
            ErrorKind::MissingJustification => "missing_justification",
            ErrorKind::MissingActor => "missing_actor",
            ErrorKind::Finalized { .. } => "finalized",
            ErrorKind::NoChanges => "no_changes",
            ErrorKind::AlreadyExists => "already_exists",
            ErrorKind::UnknownEntityType => "unknown_entity_type",
            ErrorKind::ConcurrentModification { .. } => "concurrent_modification",
            ErrorKind::RepositoryUnavailable { .. } => "repository_unavailable",
        }
    }

    /// Whether the caller may retry the same request unchanged.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ErrorKind::ConcurrentModification { .. } | ErrorKind::RepositoryUnavailable { .. }
        )
    }
}

impl From<StorageError> for ErrorKind {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::ConcurrentConflict {
                expected_version, ..
            } => ErrorKind::ConcurrentModification { expected_version },
            StorageError::EntityNotFound { .. } => ErrorKind::NotFound,
            StorageError::AlreadyExists { .. } => ErrorKind::AlreadyExists,
            other @ (StorageError::InvalidCommit { .. }
            | StorageError::Timeout { .. }
            | StorageError::Backend(_)) => ErrorKind::RepositoryUnavailable {
                message: other.to_string(),
            },
        }
    }
}

/// A rejected engine request, tagged with the entity it targeted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[error("{entity}: {kind}")]
pub struct EngineError {
    pub entity: EntityKey,
    pub kind: ErrorKind,
}

impl EngineError {
    pub fn new(entity: &EntityKey, kind: ErrorKind) -> Self {
        Self {
            entity: entity.clone(),
            kind,
        }
    }

    pub(crate) fn storage(entity: &EntityKey, err: StorageError) -> Self {
        Self::new(entity, err.into())
    }

    pub fn is_transient(&self) -> bool {
        self.kind.is_transient()
    }
}

/// Error returned by `request_transition`.
pub type TransitionError = EngineError;

/// Error returned by `request_edit`.
pub type EditError = EngineError;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_races_and_outages_are_transient() {
        assert!(ErrorKind::ConcurrentModification { expected_version: 3 }.is_transient());
        assert!(ErrorKind::RepositoryUnavailable {
            message: "timeout".into()
        }
        .is_transient());
        assert!(!ErrorKind::NotFound.is_transient());
        assert!(!ErrorKind::GuardFailed { reasons: vec![] }.is_transient());
        assert!(!ErrorKind::MissingJustification.is_transient());
    }

    #[test]
    fn terminal_illegal_edge_message() {
        let kind = ErrorKind::IllegalEdge {
            from: "Archived".into(),
            to: "Closed".into(),
            allowed: vec![],
        };
        assert_eq!(
            kind.to_string(),
            "illegal transition 'Archived' -> 'Closed' (state is terminal)"
        );
    }

    #[test]
    fn storage_errors_map_to_kinds() {
        let key = EntityKey::new("Permit", "P-1");
        let conflict = StorageError::ConcurrentConflict {
            key: key.clone(),
            expected_version: 4,
            actual_version: 5,
        };
        assert_eq!(
            ErrorKind::from(conflict),
            ErrorKind::ConcurrentModification { expected_version: 4 }
        );
        let timeout = StorageError::Timeout {
            operation: "commit".into(),
        };
        assert!(matches!(
            ErrorKind::from(timeout),
            ErrorKind::RepositoryUnavailable { .. }
        ));
        assert_eq!(
            ErrorKind::from(StorageError::EntityNotFound { key }),
            ErrorKind::NotFound
        );
    }

    #[test]
    fn serializes_with_kind_tag() {
        let err = EngineError::new(
            &EntityKey::new("CostShareAgreement", "CSA-1"),
            ErrorKind::GuardFailed {
                reasons: vec!["outstanding obligation $60,000".into()],
            },
        );
        let value = serde_json::to_value(&err).unwrap();
        assert_eq!(value["kind"]["kind"], "guard_failed");
        assert_eq!(value["kind"]["reasons"][0], "outstanding obligation $60,000");
        assert_eq!(
            err.to_string(),
            "CostShareAgreement/CSA-1: transition blocked: outstanding obligation $60,000"
        );
    }
}
