//! Guard Library: reusable compliance predicates bound to graph edges.
//!
//! A guard is a pure function of the entity snapshot and the requested edge.
//! It never mutates anything and gives the same answer for the same input.
//! Every guard bound to an edge is evaluated so that a rejected request can
//! list every reason at once.

use std::str::FromStr;

use rust_decimal::Decimal;
use rust_decimal::RoundingStrategy;
use serde::{Deserialize, Serialize};

use crate::types::{EntitySnapshot, LifecycleState};

/// Outcome of evaluating one guard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardResult {
    Pass,
    /// One or more human-readable failure reasons.
    Fail(Vec<String>),
}

impl GuardResult {
    fn fail(reason: impl Into<String>) -> Self {
        GuardResult::Fail(vec![reason.into()])
    }

    pub fn is_pass(&self) -> bool {
        matches!(self, GuardResult::Pass)
    }

    pub fn reasons(&self) -> &[String] {
        match self {
            GuardResult::Pass => &[],
            GuardResult::Fail(reasons) => reasons,
        }
    }
}

/// A compliance predicate, declared as data in the lifecycle definitions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "guard", rename_all = "snake_case")]
pub enum Guard {
    /// Fails unless `amount_field >= target_field`.
    NoOutstandingObligation {
        amount_field: String,
        target_field: String,
    },
    /// Fails unless the transition starts from `state`.
    RequiresPriorState { state: LifecycleState },
    /// Fails if the transition starts from any of `states`.
    ForbiddenFrom { states: Vec<LifecycleState> },
    /// Fails unless every named field is non-empty.
    FieldPresent { fields: Vec<String> },
    /// Fails if any member fails, reporting every member's reasons.
    AllOf { guards: Vec<Guard> },
    /// Passes if any member passes.
    AnyOf { guards: Vec<Guard> },
}

impl Guard {
    pub fn name(&self) -> &'static str {
        match self {
            Guard::NoOutstandingObligation { .. } => "no_outstanding_obligation",
            Guard::RequiresPriorState { .. } => "requires_prior_state",
            Guard::ForbiddenFrom { .. } => "forbidden_from",
            Guard::FieldPresent { .. } => "field_present",
            Guard::AllOf { .. } => "all_of",
            Guard::AnyOf { .. } => "any_of",
        }
    }

    /// Short description used by inspection output.
    pub fn describe(&self) -> String {
        match self {
            Guard::NoOutstandingObligation {
                amount_field,
                target_field,
            } => format!("{} >= {}", amount_field, target_field),
            Guard::RequiresPriorState { state } => format!("from == '{}'", state),
            Guard::ForbiddenFrom { states } => format!("from not in [{}]", join_states(states)),
            Guard::FieldPresent { fields } => format!("present: {}", fields.join(", ")),
            Guard::AllOf { guards } => format!("all of ({})", describe_all(guards)),
            Guard::AnyOf { guards } => format!("any of ({})", describe_all(guards)),
        }
    }

    /// Evaluate this guard for the edge `from -> to`.
    pub fn evaluate(
        &self,
        snapshot: &EntitySnapshot,
        from: &LifecycleState,
        to: &LifecycleState,
    ) -> GuardResult {
        match self {
            Guard::NoOutstandingObligation {
                amount_field,
                target_field,
            } => {
                let amount = match read_amount(snapshot, amount_field) {
                    Ok(a) => a,
                    Err(reason) => return GuardResult::fail(reason),
                };
                let target = match read_amount(snapshot, target_field) {
                    Ok(t) => t,
                    Err(reason) => return GuardResult::fail(reason),
                };
                if amount >= target {
                    return GuardResult::Pass;
                }
                match target.checked_sub(amount) {
                    Some(outstanding) => GuardResult::fail(format!(
                        "outstanding obligation {}",
                        format_money(outstanding)
                    )),
                    None => GuardResult::fail("outstanding obligation exceeds representable range"),
                }
            }
            Guard::RequiresPriorState { state } => {
                if from == state {
                    GuardResult::Pass
                } else {
                    GuardResult::fail(format!(
                        "'{}' can only be entered from '{}' (currently '{}')",
                        to, state, from
                    ))
                }
            }
            Guard::ForbiddenFrom { states } => {
                if states.contains(from) {
                    GuardResult::fail(format!("cannot move to '{}' from '{}'", to, from))
                } else {
                    GuardResult::Pass
                }
            }
            Guard::FieldPresent { fields } => {
                let missing: Vec<String> = fields
                    .iter()
                    .filter(|f| !snapshot.has_field(f))
                    .map(|f| format!("required field '{}' is missing", f))
                    .collect();
                if missing.is_empty() {
                    GuardResult::Pass
                } else {
                    GuardResult::Fail(missing)
                }
            }
            Guard::AllOf { guards } => {
                let reasons = evaluate_guards(guards, snapshot, from, to);
                if reasons.is_empty() {
                    GuardResult::Pass
                } else {
                    GuardResult::Fail(reasons)
                }
            }
            Guard::AnyOf { guards } => {
                let mut reasons = Vec::new();
                for guard in guards {
                    match guard.evaluate(snapshot, from, to) {
                        GuardResult::Pass => return GuardResult::Pass,
                        GuardResult::Fail(r) => reasons.extend(r),
                    }
                }
                // An empty any_of has nothing that could pass.
                if reasons.is_empty() {
                    reasons.push("no alternative condition was satisfied".to_string());
                }
                GuardResult::Fail(reasons)
            }
        }
    }
}

/// Evaluate every guard of an edge, collecting all failure reasons in
/// declaration order. An empty result means the edge is permitted.
pub fn evaluate_guards(
    guards: &[Guard],
    snapshot: &EntitySnapshot,
    from: &LifecycleState,
    to: &LifecycleState,
) -> Vec<String> {
    let mut reasons = Vec::new();
    for guard in guards {
        if let GuardResult::Fail(r) = guard.evaluate(snapshot, from, to) {
            tracing::debug!(
                entity = %snapshot.key,
                guard = guard.name(),
                %from,
                %to,
                "guard failed"
            );
            reasons.extend(r);
        }
    }
    reasons
}

// ──────────────────────────────────────────────
// Amounts
// ──────────────────────────────────────────────

/// Read a monetary field as a Decimal.
///
/// Accepts JSON numbers and numeric strings; a leading `$` and thousands
/// separators in strings are ignored.
fn read_amount(snapshot: &EntitySnapshot, field: &str) -> Result<Decimal, String> {
    let missing = || format!("field '{}' is missing or not numeric", field);
    match snapshot.field(field) {
        Some(serde_json::Value::Number(n)) => parse_decimal(&n.to_string()).ok_or_else(missing),
        Some(serde_json::Value::String(s)) => {
            let cleaned: String = s
                .trim()
                .trim_start_matches('$')
                .chars()
                .filter(|c| *c != ',')
                .collect();
            parse_decimal(&cleaned).ok_or_else(missing)
        }
        _ => Err(missing()),
    }
}

fn parse_decimal(text: &str) -> Option<Decimal> {
    Decimal::from_str(text)
        .or_else(|_| Decimal::from_scientific(text))
        .ok()
}

/// Format an amount as dollars with thousands separators.
///
/// Cents are shown only when non-zero: `60000` → `$60,000`,
/// `1234.5` → `$1,234.50`.
pub fn format_money(amount: Decimal) -> String {
    let rounded = amount.round_dp_with_strategy(2, RoundingStrategy::MidpointNearestEven);
    let negative = rounded.is_sign_negative() && !rounded.is_zero();
    let abs = rounded.abs();
    let whole = abs.trunc();
    let cents = ((abs - whole) * Decimal::from(100)).trunc();

    let digits = whole.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    let sign = if negative { "-" } else { "" };
    if cents.is_zero() {
        format!("{}${}", sign, grouped)
    } else {
        format!("{}${}.{:0>2}", sign, grouped, cents.to_string())
    }
}

fn join_states(states: &[LifecycleState]) -> String {
    states
        .iter()
        .map(|s| format!("'{}'", s))
        .collect::<Vec<_>>()
        .join(", ")
}

fn describe_all(guards: &[Guard]) -> String {
    guards
        .iter()
        .map(|g| g.describe())
        .collect::<Vec<_>>()
        .join("; ")
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────
