//! CLI integration tests for all subcommands.
//!
//! Uses `assert_cmd` to spawn the `tenure` binary and verify exit codes,
//! stdout content, and stderr content. Each test runs in a fresh temporary
//! directory so no stray `tenure.toml` is picked up.

use assert_cmd::cargo::cargo_bin_cmd;
use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name)
}

/// Helper: create a Command for the `tenure` binary, rooted at `dir`.
fn tenure(dir: &TempDir) -> Command {
    let mut cmd = cargo_bin_cmd!("tenure");
    cmd.current_dir(dir.path());
    cmd.env_remove("RUST_LOG");
    cmd
}

fn json_stdout(output: &std::process::Output) -> serde_json::Value {
    serde_json::from_slice(&output.stdout).expect("stdout is JSON")
}

// ──────────────────────────────────────────────
// 1. Help and version
// ──────────────────────────────────────────────

#[test]
fn help_exits_0_with_description() {
    let dir = TempDir::new().unwrap();
    tenure(&dir)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "Lifecycle and audit governance engine",
        ));
}

#[test]
fn version_exits_0() {
    let dir = TempDir::new().unwrap();
    tenure(&dir)
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("tenure"));
}

// ──────────────────────────────────────────────
// 2. validate
// ──────────────────────────────────────────────

#[test]
fn validate_builtin_catalog() {
    let dir = TempDir::new().unwrap();
    tenure(&dir)
        .arg("validate")
        .assert()
        .success()
        .stdout(predicate::str::contains("valid: 15 entity types"));
}

#[test]
fn validate_custom_definitions_json() {
    let dir = TempDir::new().unwrap();
    let output = tenure(&dir)
        .args(["validate", "--output", "json", "--definitions"])
        .arg(fixture("ticket.json"))
        .output()
        .unwrap();
    assert!(output.status.success());
    let json = json_stdout(&output);
    assert_eq!(json["valid"], true);
    assert_eq!(json["entity_types"], 1);
    assert_eq!(json["fingerprint"].as_str().unwrap().len(), 64);
}

#[test]
fn validate_lists_every_graph_problem() {
    let dir = TempDir::new().unwrap();
    tenure(&dir)
        .arg("validate")
        .arg("--definitions")
        .arg(fixture("unreachable.json"))
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("invalid definitions"))
        .stderr(predicate::str::contains(
            "Ticket: transition target 'Missing' is not declared",
        ))
        .stderr(predicate::str::contains(
            "Ticket: state 'Orphan' is unreachable from 'Open'",
        ));
}

#[test]
fn validate_rejects_schema_violations() {
    let dir = TempDir::new().unwrap();
    tenure(&dir)
        .arg("validate")
        .arg("--definitions")
        .arg(fixture("bad_guard.json"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid definitions in"));
}

#[test]
fn validate_missing_file_fails() {
    let dir = TempDir::new().unwrap();
    tenure(&dir)
        .args(["validate", "--definitions", "nope.json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("error reading file"));
}

#[test]
fn validate_failure_json_on_stderr() {
    let dir = TempDir::new().unwrap();
    let output = tenure(&dir)
        .args(["validate", "--output", "json", "--definitions"])
        .arg(fixture("unreachable.json"))
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));
    let json: serde_json::Value = serde_json::from_slice(&output.stderr).unwrap();
    assert_eq!(json["valid"], false);
    assert_eq!(json["problems"].as_array().unwrap().len(), 2);
}

// ──────────────────────────────────────────────
// 3. types and graph
// ──────────────────────────────────────────────

#[test]
fn types_lists_initial_and_terminal_states() {
    let dir = TempDir::new().unwrap();
    tenure(&dir)
        .arg("types")
        .assert()
        .success()
        .stdout(predicate::str::contains("Disposal"))
        .stdout(predicate::str::is_match(r"Disposal\s+initial: Initiated\s+terminal: Closed").unwrap());
}

#[test]
fn types_json_has_every_entity_type() {
    let dir = TempDir::new().unwrap();
    let output = tenure(&dir)
        .args(["types", "--output", "json"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let types = json_stdout(&output);
    let types = types.as_array().unwrap();
    assert_eq!(types.len(), 15);
    let acquisition = types.iter().find(|t| t["name"] == "Acquisition").unwrap();
    assert_eq!(acquisition["initial"], "Planning");
    assert_eq!(acquisition["terminal"], serde_json::json!(["Archived"]));
}

#[test]
fn graph_shows_guards() {
    let dir = TempDir::new().unwrap();
    tenure(&dir)
        .args(["graph", "CostShareAgreement"])
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "Active -> Closed  [no_outstanding_obligation: creditedContributions >= partnerContribution]",
        ))
        .stdout(predicate::str::contains("Closed (terminal)"));
}

#[test]
fn graph_json_lists_transitions() {
    let dir = TempDir::new().unwrap();
    let output = tenure(&dir)
        .args(["graph", "Disposal", "--output", "json"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let graph = json_stdout(&output);
    assert_eq!(graph["initial"], "Initiated");
    assert_eq!(graph["transitions"].as_array().unwrap().len(), 5);
}

#[test]
fn graph_unknown_type_fails() {
    let dir = TempDir::new().unwrap();
    tenure(&dir)
        .args(["graph", "Spaceship"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown entity type: Spaceship"));
}

// ──────────────────────────────────────────────
// 4. replay
// ──────────────────────────────────────────────

#[test]
fn replay_reports_steps_and_history() {
    let dir = TempDir::new().unwrap();
    tenure(&dir)
        .arg("replay")
        .arg(fixture("closeout.json"))
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "[5] transition CostShareAgreement/CSA-2025-01 -> Closed: rejected: transition blocked: outstanding obligation $60,000",
        ))
        .stdout(predicate::str::contains(
            "[7] transition CostShareAgreement/CSA-2025-01 -> Closed: committed (Closed, version 5)",
        ))
        .stdout(predicate::str::contains("[8] edit CostShareAgreement/CSA-2025-01: rejected: entity is finalized"))
        .stdout(predicate::str::contains("8 steps, 2 rejected"))
        .stdout(predicate::str::contains(
            "#5 2025-01-06T09:05:00Z program.manager Active -> Closed (closeout)",
        ));
}

#[test]
fn replay_json_history_is_most_recent_first() {
    let dir = TempDir::new().unwrap();
    let output = tenure(&dir)
        .args(["replay", "--output", "json"])
        .arg(fixture("closeout.json"))
        .output()
        .unwrap();
    assert!(output.status.success());
    let report = json_stdout(&output);
    assert_eq!(report["steps"][4]["status"], "rejected");
    assert_eq!(report["steps"][4]["error"]["kind"], "guard_failed");
    let history = report["entities"][0]["history"].as_array().unwrap();
    let sequences: Vec<u64> = history
        .iter()
        .map(|e| e["sequence"].as_u64().unwrap())
        .collect();
    assert_eq!(sequences, [5, 4, 3, 2, 1, 0]);
}

#[test]
fn replay_invalid_scenario_fails() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("bad.json");
    fs::write(&path, r#"{ "steps": [ { "op": "delete", "entity_type": "Permit", "id": "P-1" } ] }"#)
        .unwrap();
    tenure(&dir)
        .arg("replay")
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("error parsing scenario"));
}

#[test]
fn quiet_suppresses_output() {
    let dir = TempDir::new().unwrap();
    tenure(&dir)
        .args(["replay", "--quiet"])
        .arg(fixture("closeout.json"))
        .assert()
        .success()
        .stdout(predicate::str::is_empty());
}

// ──────────────────────────────────────────────
// 5. Configuration and logging
// ──────────────────────────────────────────────

#[test]
fn config_file_selects_definitions() {
    let dir = TempDir::new().unwrap();
    fs::copy(fixture("ticket.json"), dir.path().join("tickets.json")).unwrap();
    fs::write(
        dir.path().join("tenure.toml"),
        "definitions = \"tickets.json\"\n",
    )
    .unwrap();
    tenure(&dir)
        .arg("types")
        .assert()
        .success()
        .stdout(predicate::str::contains("Ticket"))
        .stdout(predicate::str::contains("Disposal").not());
}

#[test]
fn definitions_flag_overrides_config() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("tenure.toml"),
        "definitions = \"missing.json\"\n",
    )
    .unwrap();
    tenure(&dir)
        .arg("validate")
        .arg("--definitions")
        .arg(fixture("ticket.json"))
        .assert()
        .success()
        .stdout(predicate::str::contains("valid: 1 entity types"));
}

#[test]
fn explicit_config_path_resolves_relative_definitions() {
    let dir = TempDir::new().unwrap();
    let conf_dir = dir.path().join("conf");
    fs::create_dir(&conf_dir).unwrap();
    fs::copy(fixture("ticket.json"), conf_dir.join("tickets.json")).unwrap();
    fs::write(conf_dir.join("custom.toml"), "definitions = \"tickets.json\"\n").unwrap();
    tenure(&dir)
        .args(["validate", "--config", "conf/custom.toml"])
        .assert()
        .success()
        .stdout(predicate::str::contains("valid: 1 entity types"));
}

#[test]
fn malformed_config_fails() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("tenure.toml"), "log_filter = [\n").unwrap();
    tenure(&dir)
        .arg("types")
        .assert()
        .failure()
        .stderr(predicate::str::contains("error parsing config"));
}

#[test]
fn log_filter_from_config_goes_to_stderr() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("tenure.toml"),
        "log_filter = \"tenure_engine=info\"\n",
    )
    .unwrap();
    tenure(&dir)
        .arg("replay")
        .arg(fixture("closeout.json"))
        .assert()
        .success()
        .stderr(predicate::str::contains("transition committed"))
        .stdout(predicate::str::contains("transition committed").not());
}

#[test]
fn rust_log_overrides_config_filter() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("tenure.toml"),
        "log_filter = \"tenure_engine=info\"\n",
    )
    .unwrap();
    tenure(&dir)
        .env("RUST_LOG", "error")
        .arg("replay")
        .arg(fixture("closeout.json"))
        .assert()
        .success()
        .stderr(predicate::str::contains("transition committed").not());
}
