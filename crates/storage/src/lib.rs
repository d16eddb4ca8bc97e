//! tenure-storage: where governed entities and their audit trails live.
//!
//! - [`Repository`] -- the async storage trait with an optimistic version check
//! - [`MemoryRepository`] -- the in-process backend used by the CLI and tests
//! - [`record`] -- the persisted row layout shared by backends
//! - [`conformance`] -- a backend-agnostic suite every implementation should pass

pub mod conformance;
mod error;
mod memory;
pub mod record;
mod traits;

pub use error::StorageError;
pub use memory::MemoryRepository;
pub use record::{AuditRow, EntityRow};
pub use traits::Repository;
