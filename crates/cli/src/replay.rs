//! `tenure replay`: drive the engine through a scripted scenario.
//!
//! A scenario is a JSON document:
//!
//! ```json
//! {
//!   "start": "2025-01-06T09:00:00Z",
//!   "steps": [
//!     { "op": "create", "entity_type": "Permit", "id": "P-1",
//!       "fields": { "applicant": "Harbor Authority" },
//!       "actor": "clerk", "reason": "application received" },
//!     { "op": "transition", "entity_type": "Permit", "id": "P-1",
//!       "to": "Under Review", "actor": "clerk", "reason": "complete" },
//!     { "op": "edit", "entity_type": "Permit", "id": "P-1",
//!       "changes": { "permitNumber": "P-2025-014" },
//!       "actor": "reviewer", "reason": "number assigned" }
//!   ]
//! }
//! ```
//!
//! Steps run in order against a fresh in-memory repository. A rejected step
//! is reported and the replay continues. With `start`, audit timestamps
//! begin there and advance one minute per event; otherwise wall-clock time
//! is used.

use std::path::Path;
use std::process;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tenure_core::{
    AuditAction, AuditEvent, AuditTrail, EntityId, EntityKey, EntitySnapshot, EntityType,
    FieldChanges, Fields, LifecycleState, Registry,
};
use tenure_engine::{Clock, Engine, EngineError, ErrorKind, SteppingClock, SystemClock};
use tenure_storage::{MemoryRepository, Repository};
use time::format_description::well_known::Rfc3339;
use time::{Duration, OffsetDateTime};

use crate::{print_json, report_error, OutputFormat};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct Scenario {
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub start: Option<OffsetDateTime>,
    pub steps: Vec<Step>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub(crate) enum Step {
    Create {
        entity_type: EntityType,
        id: EntityId,
        #[serde(default)]
        fields: Fields,
        #[serde(default)]
        actor: String,
        #[serde(default)]
        reason: String,
    },
    Transition {
        entity_type: EntityType,
        id: EntityId,
        to: LifecycleState,
        #[serde(default)]
        actor: String,
        #[serde(default)]
        reason: String,
    },
    Edit {
        entity_type: EntityType,
        id: EntityId,
        changes: FieldChanges,
        #[serde(default)]
        actor: String,
        #[serde(default)]
        reason: String,
    },
}

#[derive(Debug, Serialize)]
pub(crate) struct StepReport {
    pub step: usize,
    pub op: &'static str,
    pub entity: EntityKey,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<LifecycleState>,
    #[serde(flatten)]
    pub outcome: Outcome,
}

#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub(crate) enum Outcome {
    Committed {
        state: LifecycleState,
        version: u64,
    },
    Rejected {
        error: ErrorKind,
        message: String,
    },
}

#[derive(Debug, Serialize)]
pub(crate) struct EntityReport {
    pub entity: EntityKey,
    pub state: LifecycleState,
    pub version: u64,
    pub fields: Fields,
    /// Most recent first.
    pub history: AuditTrail,
}

#[derive(Debug, Serialize)]
pub(crate) struct ReplayReport {
    pub steps: Vec<StepReport>,
    pub entities: Vec<EntityReport>,
}

impl ReplayReport {
    pub fn rejected(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| matches!(s.outcome, Outcome::Rejected { .. }))
            .count()
    }
}

pub(crate) fn cmd_replay(registry: Registry, path: &Path, output: OutputFormat, quiet: bool) {
    let scenario = match read_scenario(path) {
        Ok(s) => s,
        Err(msg) => {
            report_error(&msg, output, quiet);
            process::exit(1);
        }
    };
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            report_error(&format!("failed to start runtime: {}", e), output, quiet);
            process::exit(1);
        }
    };
    let report = match runtime.block_on(run(registry, scenario)) {
        Ok(r) => r,
        Err(msg) => {
            report_error(&msg, output, quiet);
            process::exit(1);
        }
    };
    if quiet {
        return;
    }
    match output {
        OutputFormat::Json => match serde_json::to_value(&report) {
            Ok(v) => print_json(&v),
            Err(e) => {
                report_error(&format!("serialization error: {}", e), output, quiet);
                process::exit(1);
            }
        },
        OutputFormat::Text => print_text(&report),
    }
}

fn read_scenario(path: &Path) -> Result<Scenario, String> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| format!("error reading scenario '{}': {}", path.display(), e))?;
    serde_json::from_str(&text)
        .map_err(|e| format!("error parsing scenario '{}': {}", path.display(), e))
}

pub(crate) async fn run(registry: Registry, scenario: Scenario) -> Result<ReplayReport, String> {
    let clock: Arc<dyn Clock> = match scenario.start {
        Some(start) => Arc::new(SteppingClock::new(start, Duration::minutes(1))),
        None => Arc::new(SystemClock),
    };
    let engine = Engine::new(Arc::new(registry), MemoryRepository::new()).with_clock(clock);

    let mut steps = Vec::with_capacity(scenario.steps.len());
    for (index, step) in scenario.steps.into_iter().enumerate() {
        steps.push(apply(&engine, index + 1, step).await);
    }

    let mut entities = Vec::new();
    for entity_type in engine.registry().entity_types() {
        let snapshots = engine
            .repository()
            .list(entity_type, None)
            .await
            .map_err(|e| e.to_string())?;
        for snapshot in snapshots {
            let history = engine
                .get_history(&snapshot.key)
                .await
                .map_err(|e| e.to_string())?;
            entities.push(EntityReport {
                entity: snapshot.key,
                state: snapshot.state,
                version: snapshot.version,
                fields: snapshot.fields,
                history,
            });
        }
    }
    Ok(ReplayReport { steps, entities })
}

async fn apply(engine: &Engine<MemoryRepository>, index: usize, step: Step) -> StepReport {
    let (op, entity, to, result): (_, _, _, Result<EntitySnapshot, EngineError>) = match step {
        Step::Create {
            entity_type,
            id,
            fields,
            actor,
            reason,
        } => {
            let entity = EntityKey::new(entity_type.clone(), id.clone());
            let result = engine
                .create_entity(&entity_type, &id, fields, &actor, &reason)
                .await;
            ("create", entity, None, result)
        }
        Step::Transition {
            entity_type,
            id,
            to,
            actor,
            reason,
        } => {
            let entity = EntityKey::new(entity_type, id);
            let result = engine
                .request_transition(&entity, &to, &actor, &reason)
                .await;
            ("transition", entity, Some(to), result)
        }
        Step::Edit {
            entity_type,
            id,
            changes,
            actor,
            reason,
        } => {
            let entity = EntityKey::new(entity_type, id);
            let result = engine.request_edit(&entity, changes, &actor, &reason).await;
            ("edit", entity, None, result)
        }
    };
    let outcome = match result {
        Ok(snapshot) => Outcome::Committed {
            state: snapshot.state,
            version: snapshot.version,
        },
        Err(err) => Outcome::Rejected {
            message: err.kind.to_string(),
            error: err.kind,
        },
    };
    StepReport {
        step: index,
        op,
        entity,
        to,
        outcome,
    }
}

fn print_text(report: &ReplayReport) {
    for step in &report.steps {
        let target = match &step.to {
            Some(to) => format!("{} -> {}", step.entity, to),
            None => step.entity.to_string(),
        };
        match &step.outcome {
            Outcome::Committed { state, version } => println!(
                "[{}] {} {}: committed ({}, version {})",
                step.step, step.op, target, state, version
            ),
            Outcome::Rejected { message, .. } => println!(
                "[{}] {} {}: rejected: {}",
                step.step, step.op, target, message
            ),
        }
    }
    println!(
        "{} steps, {} rejected",
        report.steps.len(),
        report.rejected()
    );

    for entity in &report.entities {
        println!();
        println!(
            "{} ({}, version {})",
            entity.entity, entity.state, entity.version
        );
        for event in &entity.history {
            println!("  {}", describe_event(event));
        }
    }
}

fn describe_event(event: &AuditEvent) -> String {
    let when = event
        .timestamp
        .format(&Rfc3339)
        .unwrap_or_else(|_| event.timestamp.to_string());
    let what = match event.action {
        AuditAction::Created => format!(
            "Created in {}",
            event.to_state.as_ref().map(|s| s.as_str()).unwrap_or("?")
        ),
        AuditAction::StateTransition => format!(
            "{} -> {}",
            event.from_state.as_ref().map(|s| s.as_str()).unwrap_or("?"),
            event.to_state.as_ref().map(|s| s.as_str()).unwrap_or("?")
        ),
        AuditAction::FieldEdit => {
            let changes: Vec<String> = event
                .changes
                .iter()
                .map(|c| format!("{}: {} => {}", c.field, show(&c.previous), show(&c.current)))
                .collect();
            format!("edit {}", changes.join(", "))
        }
    };
    format!(
        "#{} {} {} {} ({})",
        event.sequence, when, event.actor, what, event.details
    )
}

fn show(value: &Option<serde_json::Value>) -> String {
    match value {
        Some(v) => v.to_string(),
        None => "(unset)".to_string(),
    }
}
