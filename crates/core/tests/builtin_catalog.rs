//! Checks on the lifecycle catalog shipped with the crate.

use tenure_core::{EntityType, Guard, LifecycleState, Registry};

fn st(s: &str) -> LifecycleState {
    LifecycleState::new(s)
}

fn ty(s: &str) -> EntityType {
    EntityType::new(s)
}

const GOVERNED_TYPES: [&str; 15] = [
    "Acquisition",
    "Disposal",
    "Appraisal",
    "EncroachmentCase",
    "EnvironmentalSite",
    "CostShareAgreement",
    "MobilizationProfile",
    "Permit",
    "LegalClaim",
    "RelocationCase",
    "InstrumentLinkage",
    "OutGrant",
    "Solicitation",
    "GeospatialFeature",
    "AssetComponent",
];

#[test]
fn every_governed_type_has_a_graph() {
    let registry = Registry::builtin().unwrap();
    assert_eq!(registry.len(), GOVERNED_TYPES.len());
    for name in GOVERNED_TYPES {
        let graph = registry.graph(&ty(name)).unwrap();
        assert!(graph.has_state(graph.initial()), "{}", name);
        assert!(!graph.terminal_states().is_empty(), "{}", name);
    }
}

#[test]
fn no_graph_declares_a_self_transition() {
    let registry = Registry::builtin().unwrap();
    for graph in registry.graphs() {
        for state in graph.states() {
            assert!(
                !graph.is_legal_edge(state, state),
                "{} has self edge on {}",
                graph.entity_type(),
                state
            );
        }
    }
}

#[test]
fn disposal_is_a_linear_chain() {
    let registry = Registry::builtin().unwrap();
    let graph = registry.graph(&ty("Disposal")).unwrap();
    let chain = [
        "Initiated",
        "Excess Determined",
        "Pending Authorization",
        "Authorized",
        "Executed",
        "Closed",
    ];
    assert_eq!(
        graph.states().iter().map(|s| s.as_str()).collect::<Vec<_>>(),
        chain
    );
    for pair in chain.windows(2) {
        assert_eq!(graph.next_states(&st(pair[0])), vec![&st(pair[1])]);
    }
    assert_eq!(graph.terminal_states(), vec![&st("Closed")]);
}

#[test]
fn cost_share_closure_requires_full_contribution() {
    let registry = Registry::builtin().unwrap();
    let graph = registry.graph(&ty("CostShareAgreement")).unwrap();
    let guards = graph.guards(&st("Active"), &st("Closed")).unwrap();
    assert_eq!(
        guards,
        [Guard::NoOutstandingObligation {
            amount_field: "creditedContributions".to_string(),
            target_field: "partnerContribution".to_string(),
        }]
    );
}

#[test]
fn mobilization_activates_only_from_ready() {
    let registry = Registry::builtin().unwrap();
    let graph = registry.graph(&ty("MobilizationProfile")).unwrap();
    let prior = Guard::RequiresPriorState { state: st("Ready") };
    for from in ["Draft", "Ready", "Demobilized"] {
        let guards = graph.guards(&st(from), &st("Activated")).unwrap();
        assert!(guards.contains(&prior), "from {}", from);
    }
    assert!(!graph.is_legal_edge(&st("Archived"), &st("Activated")));
}

#[test]
fn permit_activation_requires_dates() {
    let registry = Registry::builtin().unwrap();
    let graph = registry.graph(&ty("Permit")).unwrap();
    let guards = graph.guards(&st("Issued"), &st("Active")).unwrap();
    assert!(guards.contains(&Guard::FieldPresent {
        fields: vec!["issueDate".to_string(), "effectiveDate".to_string()],
    }));
}

#[test]
fn denied_claims_cannot_be_paid() {
    let registry = Registry::builtin().unwrap();
    let graph = registry.graph(&ty("LegalClaim")).unwrap();
    let forbidden = Guard::ForbiddenFrom {
        states: vec![st("Denied")],
    };
    for from in ["Approved", "Denied"] {
        let guards = graph.guards(&st(from), &st("Paid")).unwrap();
        assert!(guards.contains(&forbidden), "from {}", from);
    }
}
