//! Begin/end snapshot drift and side-effect tracking across a full run.
//!
//! Mutations are injected through the end-snapshot delay: a watcher thread
//! waits for the judge report (the last stage artifact written before the
//! delay) and then edits the workspace while the run sleeps.

use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

use serde_json::{json, Value};

use lock_tests::evidence_fixtures::{
    execution_ledger, standard_contract, write_json, Workspace, EVIDENCE_DIR, EXEC_LEDGER,
};
use replay_harness::pipeline::{run_contract_file, RunOptions, RunOutcome, RunStatus, VerdictReason};
use replay_harness::side_effects::{TrackerEnvironment, TrackerVerdict};
use replay_harness::snapshot::{DriftLevel, Severity};
use replay_harness::stages::StageName;
use replay_kernel::evidence::TriState;

const DELAY: Duration = Duration::from_millis(1500);

fn run(ws: &Workspace, contract: &Value, options: &RunOptions) -> RunOutcome {
    let path = ws.contract(contract);
    run_contract_file(&path, options).unwrap()
}

/// Spawn a thread that runs `mutate` once the judge report appears.
fn after_judge(ws: &Workspace, mutate: impl FnOnce() + Send + 'static) -> thread::JoinHandle<()> {
    let marker: PathBuf = ws
        .path(EVIDENCE_DIR)
        .join("stage_reports")
        .join(StageName::Judge.report_filename());
    thread::spawn(move || {
        let deadline = Instant::now() + Duration::from_secs(30);
        while !marker.exists() {
            assert!(Instant::now() < deadline, "judge report never appeared");
            thread::sleep(Duration::from_millis(10));
        }
        mutate();
    })
}

fn delayed(ws: &Workspace) -> RunOptions {
    RunOptions {
        end_snapshot_delay: Some(DELAY),
        ..ws.options()
    }
}

fn with_mode(mode: &str) -> Value {
    let mut contract = standard_contract();
    contract["replay"]["mode"] = json!(mode);
    contract
}

// ---------------------------------------------------------------------------
// Snapshot drift
// ---------------------------------------------------------------------------

#[test]
fn untouched_workspace_has_no_drift() {
    let ws = Workspace::with_ledgers();
    let mut contract = with_mode("STRICT");
    contract["replay"]["side_effects"] = json!({"snapshot_root": "ledgers"});
    let outcome = run(&ws, &contract, &ws.options());

    let diff = &outcome.result.snapshot_diff;
    assert_eq!(diff.status, TriState::Pass);
    assert_eq!(diff.drift_class, DriftLevel::D0);
    assert_eq!(diff.severity, Severity::None);
    assert!(!diff.has_drift());
    // Frozen clock: both snapshots carry the same stamp.
    assert_eq!(diff.begin, diff.end);
    // Stub validators still deny; drift is not the reason.
    assert_eq!(outcome.result.reason, Some(VerdictReason::CommissionerGate));
}

#[test]
fn evidence_written_under_snapshot_root_is_strict_drift() {
    let ws = Workspace::with_ledgers();
    let mut contract = with_mode("STRICT");
    contract["replay"]["side_effects"] = json!({"snapshot_root": EVIDENCE_DIR});
    let outcome = run(&ws, &contract, &ws.options());

    let diff = &outcome.result.snapshot_diff;
    assert!(diff.file_drift);
    assert!(!diff.ledger_drift && !diff.context_drift);
    assert_eq!(diff.drift_class, DriftLevel::D1);
    assert_eq!(diff.severity_score, 40);
    assert_eq!(outcome.status(), RunStatus::Denied);
    assert_eq!(outcome.result.reason, Some(VerdictReason::SnapshotDriftStrict));
}

#[test]
fn non_strict_drift_is_recorded_only() {
    let ws = Workspace::with_ledgers();
    let mut contract = with_mode("SANDBOX");
    contract["replay"]["side_effects"] = json!({"snapshot_root": EVIDENCE_DIR});
    contract["replay"]["commissioner_requirements"] = json!({"must_have": []});
    let outcome = run(&ws, &contract, &ws.options());

    assert!(outcome.result.snapshot_diff.has_drift());
    assert_eq!(outcome.status(), RunStatus::AllowedStage13);
}

#[test]
fn ledger_mutation_during_run_is_ledger_drift() {
    let ws = Workspace::with_ledgers();
    let ledger = ws.path(EXEC_LEDGER);
    let watcher = after_judge(&ws, move || {
        let mut mutated = execution_ledger();
        mutated["events"]
            .as_array_mut()
            .unwrap()
            .push(json!({"idx": 2, "op": "rollback"}));
        write_json(&ledger, &mutated);
    });
    let outcome = run(&ws, &with_mode("SANDBOX"), &delayed(&ws));
    watcher.join().unwrap();

    let diff = &outcome.result.snapshot_diff;
    assert!(diff.ledger_drift);
    assert_eq!(diff.drift_class, DriftLevel::D2);
    assert_eq!(diff.severity, Severity::High);
    assert_eq!(diff.severity_score, 70);
    assert_ne!(outcome.result.reason, Some(VerdictReason::SnapshotDriftStrict));
}

#[test]
fn contract_edit_during_run_is_context_drift() {
    let ws = Workspace::with_ledgers();
    let contract_path = ws.path("contract.json");
    let watcher = after_judge(&ws, move || {
        let mut edited = with_mode("STRICT");
        edited["replay"]["policy_version"] = json!("policy-2026.02");
        write_json(&contract_path, &edited);
    });
    let outcome = run(&ws, &with_mode("STRICT"), &delayed(&ws));
    watcher.join().unwrap();

    let diff = &outcome.result.snapshot_diff;
    assert!(diff.context_drift);
    assert_eq!(diff.drift_class, DriftLevel::D3);
    assert_eq!(diff.severity_score, 90);
    assert_eq!(outcome.result.reason, Some(VerdictReason::SnapshotDriftStrict));
}

// ---------------------------------------------------------------------------
// Side-effect tracker
// ---------------------------------------------------------------------------

fn tracked(side_effects: &Value) -> RunOutcome {
    let ws = Workspace::with_ledgers();
    let mut contract = standard_contract();
    contract["replay"]["side_effects"] = side_effects.clone();
    run(&ws, &contract, &ws.options())
}

#[test]
fn tracker_without_scan_roots_passes_with_note() {
    let report = tracked(&json!({})).result.drift_report;
    assert_eq!(report.verdict, TrackerVerdict::Pass);
    assert_eq!(report.drift_class, DriftLevel::D0);
    assert_eq!(report.notes.len(), 2);
}

#[test]
fn blocked_file_within_budget_warns_in_dev() {
    let report = tracked(&json!({
        "scan_roots": ["ledgers"],
        "blocked_files": ["ledgers/artifacts_manifest.json"],
        "max_unexpected_effects": 1,
        "environment": "dev"
    }))
    .result
    .drift_report;
    assert_eq!(report.mode, TrackerEnvironment::Dev);
    assert_eq!(report.unexpected_files, vec!["ledgers/artifacts_manifest.json"]);
    assert_eq!(report.drift_class, DriftLevel::D1);
    assert_eq!(report.severity_score, 1);
    assert_eq!(report.verdict, TrackerVerdict::Warn);
}

#[test]
fn production_alias_fails_blocked_file() {
    let report = tracked(&json!({
        "scan_roots": ["ledgers"],
        "blocked_files": ["ledgers/artifacts_manifest.json"],
        "max_unexpected_effects": 1,
        "environment": "production"
    }))
    .result
    .drift_report;
    assert_eq!(report.mode, TrackerEnvironment::Prod);
    assert_eq!(report.drift_class, DriftLevel::D1);
    assert_eq!(report.verdict, TrackerVerdict::Fail);
}

#[test]
fn uat_alias_is_staging() {
    let report = tracked(&json!({
        "scan_roots": ["ledgers"],
        "blocked_files": ["ledgers/artifacts_manifest.json"],
        "max_unexpected_effects": 0,
        "environment": "uat"
    }))
    .result
    .drift_report;
    assert_eq!(report.mode, TrackerEnvironment::Staging);
    assert_eq!(report.drift_class, DriftLevel::D2);
    assert_eq!(report.severity_score, 2);
    assert_eq!(report.verdict, TrackerVerdict::Fail);
}

#[test]
fn any_unexpected_file_fails_in_prod() {
    let report = tracked(&json!({
        "scan_roots": ["ledgers"],
        "allowed_files": ["ledgers/execution_ledger.json"],
        "max_unexpected_effects": 5,
        "environment": "prod"
    }))
    .result
    .drift_report;
    assert_eq!(report.unexpected_files.len(), 2);
    assert_eq!(report.drift_class, DriftLevel::D1);
    assert_eq!(report.verdict, TrackerVerdict::Fail);
}

#[test]
fn invalid_pattern_degrades_tracker_not_run() {
    // Keep the workspace alive so `result_path` still exists when asserted.
    let ws = Workspace::with_ledgers();
    let mut contract = standard_contract();
    contract["replay"]["side_effects"] =
        json!({"scan_roots": ["ledgers"], "blocked_files": ["[unclosed"]});
    let outcome = run(&ws, &contract, &ws.options());
    let report = &outcome.result.drift_report;
    assert_eq!(report.verdict, TrackerVerdict::Pass);
    assert!(report.notes.iter().any(|n| n.starts_with("tracker_error:")));
    assert!(outcome.result_path.exists());
}
