use tenure_core::EntityKey;

/// All errors that can be returned by a [`Repository`](crate::Repository) implementation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    /// Optimistic concurrency conflict: the stored version moved past the
    /// version the writer read. Nothing was written.
    #[error(
        "concurrent conflict on {key}: expected version {expected_version}, found {actual_version}"
    )]
    ConcurrentConflict {
        key: EntityKey,
        expected_version: u64,
        actual_version: u64,
    },

    /// No entity with the given key exists.
    #[error("entity not found: {key}")]
    EntityNotFound { key: EntityKey },

    /// An entity with this key already exists.
    #[error("entity already exists: {key}")]
    AlreadyExists { key: EntityKey },

    /// The write would break the audit sequence (wrong version step or
    /// event sequence). Nothing was written.
    #[error("invalid commit for {key}: {reason}")]
    InvalidCommit { key: EntityKey, reason: String },

    /// The backend did not answer in time.
    #[error("storage timeout during {operation}")]
    Timeout { operation: String },

    /// A backend-specific storage error (connection, serialization, etc.).
    #[error("storage backend error: {0}")]
    Backend(String),
}

impl StorageError {
    /// Whether the backend itself failed, as opposed to rejecting the request.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, StorageError::Timeout { .. } | StorageError::Backend(_))
    }
}
