//! tenure-core: lifecycle graphs, compliance guards and the registry that
//! binds them to governed entity types.
//!
//! Everything here is pure data and pure functions. Persistence lives in
//! `tenure-storage`; the executors that commit transitions and edits live in
//! `tenure-engine`.
//!
//! # Public API
//!
//! - [`Registry`] -- validated, immutable map of entity type to [`StateGraph`]
//! - [`StateGraph`] -- states, edges and guard bindings for one entity type
//! - [`Guard`] / [`evaluate_guards`] -- the compliance predicate library
//! - Data model: [`EntityKey`], [`EntitySnapshot`], [`AuditEvent`], [`AuditTrail`]

pub mod graph;
pub mod guard;
pub mod registry;
pub mod types;

pub use graph::{Edge, StateGraph};
pub use guard::{evaluate_guards, format_money, Guard, GuardResult};
pub use registry::{
    DefinitionProblem, Definitions, EntityTypeDefinition, Registry, RegistryError,
    TransitionDefinition,
};
pub use types::{
    is_empty_value, AuditAction, AuditEvent, AuditTrail, EntityId, EntityKey, EntitySnapshot,
    EntityType, FieldChange, FieldChanges, Fields, LifecycleState,
};

/// JSON Schema describing the lifecycle definition document.
pub const DEFINITIONS_SCHEMA: &str = include_str!("../lifecycles.schema.json");
