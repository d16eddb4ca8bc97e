//! StateGraph Registry: the declarative lifecycle definitions, validated once.
//!
//! A registry is built from a JSON definition document at process start and
//! never changes afterwards. Any defect in the document (undeclared states,
//! dangling edges, unreachable states, ...) is a configuration error that
//! fails the load; every problem is reported together.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::graph::{Edge, StateGraph};
use crate::guard::Guard;
use crate::types::{EntityType, LifecycleState};

static BUILTIN_DEFINITIONS: &str = include_str!("../lifecycles.json");

// ──────────────────────────────────────────────
// Errors
// ──────────────────────────────────────────────

/// Configuration errors raised while loading lifecycle definitions.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// The document is not valid JSON or does not have the expected shape.
    #[error("could not parse lifecycle definitions: {0}")]
    Parse(String),

    /// The document parsed but describes an inconsistent set of graphs.
    #[error("invalid lifecycle definitions:\n{}", Problems(.problems))]
    Invalid { problems: Vec<DefinitionProblem> },

    /// No graph is registered for the requested entity type.
    #[error("unknown entity type: {0}")]
    UnknownEntityType(EntityType),
}

/// One defect found in a definition document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DefinitionProblem {
    pub entity_type: String,
    pub message: String,
}

impl fmt::Display for DefinitionProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.entity_type, self.message)
    }
}

struct Problems<'a>(&'a [DefinitionProblem]);

impl fmt::Display for Problems<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, p) in self.0.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "  - {}", p)?;
        }
        Ok(())
    }
}

// ──────────────────────────────────────────────
// Definition document
// ──────────────────────────────────────────────

/// Top-level lifecycle definition document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Definitions {
    #[serde(default)]
    pub version: Option<String>,
    pub entity_types: Vec<EntityTypeDefinition>,
}

/// Declarative lifecycle of one entity type.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EntityTypeDefinition {
    pub name: EntityType,
    pub states: Vec<LifecycleState>,
    pub initial: LifecycleState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub transitions: Vec<TransitionDefinition>,
    #[serde(default)]
    pub editable_after_finalization: Vec<String>,
}

/// One edge declaration. `from` may list several sources sharing the guards.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TransitionDefinition {
    pub from: Sources,
    pub to: LifecycleState,
    #[serde(default)]
    pub guards: Vec<Guard>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Sources {
    One(LifecycleState),
    Many(Vec<LifecycleState>),
}

impl Sources {
    fn iter(&self) -> impl Iterator<Item = &LifecycleState> {
        match self {
            Sources::One(s) => std::slice::from_ref(s).iter(),
            Sources::Many(v) => v.iter(),
        }
    }
}

// ──────────────────────────────────────────────
// Registry
// ──────────────────────────────────────────────

/// Immutable map from entity type to its lifecycle graph.
#[derive(Debug, Clone)]
pub struct Registry {
    graphs: BTreeMap<EntityType, StateGraph>,
    fingerprint: String,
}

impl Registry {
    /// The lifecycles shipped with the crate.
    pub fn builtin() -> Result<Self, RegistryError> {
        Self::from_json_str(BUILTIN_DEFINITIONS)
    }

    /// The raw built-in definition document.
    pub fn builtin_source() -> &'static str {
        BUILTIN_DEFINITIONS
    }

    pub fn from_json_str(source: &str) -> Result<Self, RegistryError> {
        let value: serde_json::Value =
            serde_json::from_str(source).map_err(|e| RegistryError::Parse(e.to_string()))?;
        Self::from_json(&value)
    }

    pub fn from_json(value: &serde_json::Value) -> Result<Self, RegistryError> {
        let definitions: Definitions = serde_json::from_value(value.clone())
            .map_err(|e| RegistryError::Parse(e.to_string()))?;
        let canonical =
            serde_json::to_string(value).map_err(|e| RegistryError::Parse(e.to_string()))?;
        let fingerprint = format!("{:x}", Sha256::digest(canonical.as_bytes()));
        Self::build(definitions, fingerprint)
    }

    fn build(definitions: Definitions, fingerprint: String) -> Result<Self, RegistryError> {
        let mut problems = Vec::new();
        let mut graphs = BTreeMap::new();

        for def in definitions.entity_types {
            let before = problems.len();
            validate_definition(&def, &mut problems);
            if graphs.contains_key(&def.name) {
                problems.push(problem(&def.name, "entity type declared more than once"));
            }
            if problems.len() > before {
                continue;
            }
            let graph = to_graph(def);
            graphs.insert(graph.entity_type().clone(), graph);
        }

        if !problems.is_empty() {
            return Err(RegistryError::Invalid { problems });
        }

        tracing::info!(
            entity_types = graphs.len(),
            fingerprint = %fingerprint,
            "lifecycle registry loaded"
        );
        Ok(Self {
            graphs,
            fingerprint,
        })
    }

    /// The graph for `entity_type`.
    pub fn graph(&self, entity_type: &EntityType) -> Result<&StateGraph, RegistryError> {
        self.graphs
            .get(entity_type)
            .ok_or_else(|| RegistryError::UnknownEntityType(entity_type.clone()))
    }

    pub fn get(&self, entity_type: &EntityType) -> Option<&StateGraph> {
        self.graphs.get(entity_type)
    }

    pub fn entity_types(&self) -> impl Iterator<Item = &EntityType> {
        self.graphs.keys()
    }

    pub fn graphs(&self) -> impl Iterator<Item = &StateGraph> {
        self.graphs.values()
    }

    pub fn len(&self) -> usize {
        self.graphs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.graphs.is_empty()
    }

    /// SHA-256 (hex) of the compact definition document this registry was loaded from.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }
}

// ──────────────────────────────────────────────
// Validation
// ──────────────────────────────────────────────

fn problem(entity_type: &EntityType, message: impl Into<String>) -> DefinitionProblem {
    DefinitionProblem {
        entity_type: entity_type.to_string(),
        message: message.into(),
    }
}

fn validate_definition(def: &EntityTypeDefinition, problems: &mut Vec<DefinitionProblem>) {
    let name = &def.name;

    if name.as_str().trim().is_empty() {
        problems.push(problem(name, "entity type name is empty"));
    }
    if def.states.is_empty() {
        problems.push(problem(name, "no states declared"));
        return;
    }

    let mut declared = BTreeSet::new();
    for state in &def.states {
        if state.as_str().trim().is_empty() {
            problems.push(problem(name, "state name is empty"));
        }
        if !declared.insert(state) {
            problems.push(problem(name, format!("state '{}' declared twice", state)));
        }
    }

    if !declared.contains(&def.initial) {
        problems.push(problem(
            name,
            format!("initial state '{}' is not declared", def.initial),
        ));
    }

    let mut seen_edges = BTreeSet::new();
    let mut adjacency: BTreeMap<&LifecycleState, Vec<&LifecycleState>> = BTreeMap::new();
    for t in &def.transitions {
        let mut any_source = false;
        for from in t.from.iter() {
            any_source = true;
            if !declared.contains(from) {
                problems.push(problem(
                    name,
                    format!("transition source '{}' is not declared", from),
                ));
            }
            if !declared.contains(&t.to) {
                problems.push(problem(
                    name,
                    format!("transition target '{}' is not declared", t.to),
                ));
            }
            if !seen_edges.insert((from, &t.to)) {
                problems.push(problem(
                    name,
                    format!("transition '{}' -> '{}' declared twice", from, t.to),
                ));
            }
            adjacency.entry(from).or_default().push(&t.to);
        }
        if !any_source {
            problems.push(problem(
                name,
                format!("transition to '{}' has no source state", t.to),
            ));
        }
        for guard in &t.guards {
            validate_guard(name, guard, &declared, problems);
        }
    }

    if !def.states.iter().any(|s| !adjacency.contains_key(s)) {
        problems.push(problem(name, "no terminal state (every state has an exit)"));
    }

    if declared.contains(&def.initial) {
        let reachable = reachable_from(&def.initial, &adjacency);
        for state in &def.states {
            if !reachable.contains(state) {
                problems.push(problem(
                    name,
                    format!("state '{}' is unreachable from '{}'", state, def.initial),
                ));
            }
        }
    }
}

fn validate_guard(
    name: &EntityType,
    guard: &Guard,
    declared: &BTreeSet<&LifecycleState>,
    problems: &mut Vec<DefinitionProblem>,
) {
    let mut undeclared = Vec::new();
    match guard {
        Guard::RequiresPriorState { state } => undeclared.push(state),
        Guard::ForbiddenFrom { states } => undeclared.extend(states.iter()),
        _ => {}
    }
    for state in undeclared {
        if !declared.contains(state) {
            problems.push(problem(
                name,
                format!("guard {} refers to undeclared state '{}'", guard.name(), state),
            ));
        }
    }

    match guard {
        Guard::FieldPresent { fields } if fields.is_empty() => {
            problems.push(problem(name, "guard field_present names no fields"));
        }
        Guard::NoOutstandingObligation {
            amount_field,
            target_field,
        } if amount_field.trim().is_empty() || target_field.trim().is_empty() => {
            problems.push(problem(
                name,
                "guard no_outstanding_obligation needs both amount_field and target_field",
            ));
        }
        Guard::AllOf { guards } | Guard::AnyOf { guards } => {
            for inner in guards {
                validate_guard(name, inner, declared, problems);
            }
        }
        _ => {}
    }
}

fn reachable_from<'a>(
    initial: &'a LifecycleState,
    adjacency: &BTreeMap<&'a LifecycleState, Vec<&'a LifecycleState>>,
) -> BTreeSet<&'a LifecycleState> {
    let mut seen = BTreeSet::new();
    let mut queue = VecDeque::new();
    seen.insert(initial);
    queue.push_back(initial);
    while let Some(state) = queue.pop_front() {
        if let Some(targets) = adjacency.get(state) {
            for next in targets {
                if seen.insert(*next) {
                    queue.push_back(*next);
                }
            }
        }
    }
    seen
}

fn to_graph(def: EntityTypeDefinition) -> StateGraph {
    let mut edges = Vec::new();
    for t in def.transitions {
        for from in t.from.iter() {
            edges.push(Edge {
                from: from.clone(),
                to: t.to.clone(),
                guards: t.guards.clone(),
            });
        }
    }
    StateGraph::new(
        def.name,
        def.states,
        def.initial,
        edges,
        def.editable_after_finalization.into_iter().collect(),
    )
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────
