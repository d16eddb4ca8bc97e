//! Per-entity-type lifecycle graph.
//!
//! A [`StateGraph`] is immutable once built: the ordered state list, the
//! initial state, and for every legal edge the ordered guards that must all
//! pass. States with no outgoing edge are terminal.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::guard::Guard;
use crate::types::{EntityType, LifecycleState};

/// One legal transition and its guard bindings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Edge {
    pub from: LifecycleState,
    pub to: LifecycleState,
    pub guards: Vec<Guard>,
}

/// The lifecycle of one entity type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StateGraph {
    entity_type: EntityType,
    /// Presentation order; irrelevant to legality.
    states: Vec<LifecycleState>,
    initial: LifecycleState,
    /// from -> (to -> guards). Inner order follows `states` via `next_states`.
    edges: BTreeMap<LifecycleState, BTreeMap<LifecycleState, Vec<Guard>>>,
    editable_after_finalization: BTreeSet<String>,
}

impl StateGraph {
    /// Assemble a graph. Callers are expected to have validated the parts;
    /// see [`crate::registry::Registry`] for the checked construction path.
    pub(crate) fn new(
        entity_type: EntityType,
        states: Vec<LifecycleState>,
        initial: LifecycleState,
        edges: Vec<Edge>,
        editable_after_finalization: BTreeSet<String>,
    ) -> Self {
        let mut map: BTreeMap<LifecycleState, BTreeMap<LifecycleState, Vec<Guard>>> =
            BTreeMap::new();
        for edge in edges {
            map.entry(edge.from).or_default().insert(edge.to, edge.guards);
        }
        Self {
            entity_type,
            states,
            initial,
            edges: map,
            editable_after_finalization,
        }
    }

    pub fn entity_type(&self) -> &EntityType {
        &self.entity_type
    }

    /// All states in presentation order.
    pub fn states(&self) -> &[LifecycleState] {
        &self.states
    }

    pub fn initial(&self) -> &LifecycleState {
        &self.initial
    }

    pub fn has_state(&self, state: &LifecycleState) -> bool {
        self.states.contains(state)
    }

    /// Position of `state` in presentation order, for progress displays.
    pub fn position(&self, state: &LifecycleState) -> Option<usize> {
        self.states.iter().position(|s| s == state)
    }

    /// Pure lookup: is `from -> to` a declared edge?
    ///
    /// Self-transitions are legal only when declared explicitly.
    pub fn is_legal_edge(&self, from: &LifecycleState, to: &LifecycleState) -> bool {
        self.edges
            .get(from)
            .map(|targets| targets.contains_key(to))
            .unwrap_or(false)
    }

    /// Legal next states of `from`, in presentation order.
    pub fn next_states(&self, from: &LifecycleState) -> Vec<&LifecycleState> {
        match self.edges.get(from) {
            Some(targets) => self
                .states
                .iter()
                .filter(|s| targets.contains_key(*s))
                .collect(),
            None => Vec::new(),
        }
    }

    /// Guards bound to `from -> to`, or `None` if the edge is not declared.
    pub fn guards(&self, from: &LifecycleState, to: &LifecycleState) -> Option<&[Guard]> {
        self.edges
            .get(from)
            .and_then(|targets| targets.get(to))
            .map(|g| g.as_slice())
    }

    /// A state with zero outgoing edges.
    pub fn is_terminal(&self, state: &LifecycleState) -> bool {
        self.edges
            .get(state)
            .map(|targets| targets.is_empty())
            .unwrap_or(true)
    }

    /// Terminal states in presentation order.
    pub fn terminal_states(&self) -> Vec<&LifecycleState> {
        self.states.iter().filter(|s| self.is_terminal(s)).collect()
    }

    /// Every edge, grouped by source in presentation order.
    pub fn edges(&self) -> Vec<Edge> {
        let mut out = Vec::new();
        for from in &self.states {
            for to in self.next_states(from) {
                if let Some(guards) = self.guards(from, to) {
                    out.push(Edge {
                        from: from.clone(),
                        to: to.clone(),
                        guards: guards.to_vec(),
                    });
                }
            }
        }
        out
    }

    pub fn edge_count(&self) -> usize {
        self.edges.values().map(|t| t.len()).sum()
    }

    /// Whether `field` may still be edited once the entity is terminal.
    pub fn editable_after_finalization(&self, field: &str) -> bool {
        self.editable_after_finalization.contains(field)
    }

    pub fn finalization_allow_list(&self) -> &BTreeSet<String> {
        &self.editable_after_finalization
    }
}
