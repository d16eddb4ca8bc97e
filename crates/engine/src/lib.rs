//! tenure-engine: lifecycle enforcement and audit over a repository.
//!
//! One generic [`Engine`] serves every entity type; behaviour per type comes
//! entirely from the [`Registry`](tenure_core::Registry) it is built with.
//!
//! - [`Engine::create_entity`] / [`Engine::request_transition`] /
//!   [`Engine::request_edit`] -- the only paths that mutate an entity
//! - [`Engine::get_state`] / [`Engine::get_snapshot`] / [`Engine::get_history`] /
//!   [`Engine::available_transitions`] -- reads
//!
//! Every committed mutation bumps the entity version by one and appends one
//! audit event in the same repository commit. Rejected requests write nothing.

mod clock;
mod edit;
mod engine;
mod error;
mod transition;

pub use clock::{Clock, SteppingClock, SystemClock};
pub use engine::{Engine, TransitionOption};
pub use error::{EditError, EngineError, ErrorKind, TransitionError};
