//! End-to-end runs of the four-stage pipeline against on-disk evidence.
//!
//! Each test writes ledgers and a contract into a temp workspace, runs the
//! contract through `run_contract_file`, and asserts on the evidence files
//! the run leaves behind.

use std::path::Path;

use serde_json::{json, Value};

use lock_tests::evidence_fixtures::{read_json, standard_contract, Workspace};
use replay_harness::pipeline::{run_contract_file, RunOutcome, RunStatus, EXIT_ALLOWED, EXIT_DENIED};
use replay_harness::stages::{StageName, StageStatus};
use replay_harness::validators::{CheckResult, LedgerInput, LedgerValidator, ValidatorSet};
use replay_kernel::commissioner::CommissionerField;
use replay_kernel::evidence::TriState;

/// Validator with a fixed result and no required inputs.
struct Fixed {
    field: CommissionerField,
    status: TriState,
}

impl LedgerValidator for Fixed {
    fn name(&self) -> &str {
        self.field.as_str()
    }
    fn field(&self) -> CommissionerField {
        self.field
    }
    fn requires(&self) -> &[LedgerInput] {
        &[]
    }
    fn validate(&self, _inputs: &[&Path]) -> CheckResult {
        CheckResult {
            status: self.status,
            errors: Vec::new(),
        }
    }
}

struct Exploding;

impl LedgerValidator for Exploding {
    fn name(&self) -> &str {
        "exploding"
    }
    fn field(&self) -> CommissionerField {
        CommissionerField::LedgerHashChainValid
    }
    fn requires(&self) -> &[LedgerInput] {
        &[LedgerInput::ExecutionLedgerPath]
    }
    fn validate(&self, _inputs: &[&Path]) -> CheckResult {
        panic!("chain walker overflow")
    }
}

fn all_fields(status: TriState) -> ValidatorSet {
    ValidatorSet::new(
        CommissionerField::ALL
            .iter()
            .map(|&field| Box::new(Fixed { field, status }) as Box<dyn LedgerValidator>)
            .collect(),
    )
}

fn run_with(ws: &Workspace, contract: &Value, validators: ValidatorSet) -> RunOutcome {
    let path = ws.contract(contract);
    let options = replay_harness::pipeline::RunOptions {
        validators,
        ..ws.options()
    };
    run_contract_file(&path, &options).unwrap()
}

fn report(ws: &Workspace, outcome: &RunOutcome, stage: StageName) -> Value {
    ws.stage_report(&outcome.result.evidence_dir, stage)
}

// ---------------------------------------------------------------------------
// Fail-closed paths
// ---------------------------------------------------------------------------

#[test]
fn missing_inputs_deny_at_commissioner() {
    let ws = Workspace::empty();
    let contract = json!({"replay": {
        "target_execution_id": "exec-1",
        "outputs": {"evidence_dir": "ev"}
    }});
    let outcome = run_with(&ws, &contract, ValidatorSet::default());

    assert_eq!(outcome.status(), RunStatus::Denied);
    assert_eq!(outcome.exit_code(), EXIT_DENIED);

    let collector = report(&ws, &outcome, StageName::Collector);
    assert_eq!(collector["status"], "FAIL");
    assert_eq!(collector["inputs_found"], json!([]));
    assert_eq!(
        collector["missing_inputs"],
        json!(["execution_ledger_path", "decision_ledger_path", "artifacts_manifest_path"])
    );

    let inspector = report(&ws, &outcome, StageName::Inspector);
    assert_eq!(inspector["status"], "UNKNOWN");
    assert_eq!(
        inspector["skipped_validators"],
        json!(["hash_chain", "artifacts", "schema"])
    );
    assert!(inspector["errors"]
        .as_array()
        .unwrap()
        .contains(&json!("hash_chain:missing_input:execution_ledger_path")));

    let commissioner = report(&ws, &outcome, StageName::Commissioner);
    assert_eq!(commissioner["decision"], "DENY");
    let reasons: Vec<&str> = commissioner["denial_reasons"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r.as_str().unwrap())
        .collect();
    assert_eq!(reasons.len(), CommissionerField::ALL.len());
    assert!(reasons.iter().all(|r| r.ends_with(":UNKNOWN")));

    let judge = report(&ws, &outcome, StageName::Judge);
    assert_eq!(judge["status"], "SKIPPED");
    assert_eq!(judge["skip_reason"], "commissioner_denied");
    let marker = read_json(&outcome.result.evidence_dir.join("diff_report.json"));
    assert_eq!(
        marker,
        json!({"skipped": true, "reason": "commissioner_denied", "errors": []})
    );

    let result = read_json(&outcome.result_path);
    assert_eq!(result["status"], "DENIED");
    assert_eq!(result["reason"], "commissioner_gate");
}

#[test]
fn ledger_backed_requirements_yield_one_reason_each() {
    let ws = Workspace::empty();
    let contract = json!({"replay": {
        "outputs": {"evidence_dir": "ev"},
        "commissioner_requirements": {
            "must_have": [
                "ledger_hash_chain_valid",
                "artifact_hashes_valid",
                "schema_versions_compatible"
            ],
            "deny_if_missing_inputs": true
        }
    }});
    let outcome = run_with(&ws, &contract, ValidatorSet::default());

    let commissioner = report(&ws, &outcome, StageName::Commissioner);
    assert_eq!(
        commissioner["denial_reasons"],
        json!([
            "ledger_hash_chain_valid:UNKNOWN",
            "artifact_hashes_valid:UNKNOWN",
            "schema_versions_compatible:UNKNOWN"
        ])
    );
    assert_eq!(report(&ws, &outcome, StageName::Judge)["skip_reason"], "commissioner_denied");
    assert_eq!(outcome.exit_code(), EXIT_DENIED);
}

#[test]
fn missing_execution_ledger_fails_closed_even_when_others_pass() {
    let ws = Workspace::with_ledgers();
    std::fs::remove_file(ws.path(lock_tests::evidence_fixtures::EXEC_LEDGER)).unwrap();

    let mut validators = ValidatorSet::default();
    for field in [
        CommissionerField::TenantOrgScopeValid,
        CommissionerField::UserPermissionValid,
        CommissionerField::RedactionPolicySatisfied,
    ] {
        validators.push(Box::new(Fixed {
            field,
            status: TriState::Pass,
        }));
    }
    let mut contract = standard_contract();
    contract["replay"]["commissioner_requirements"] =
        json!({"must_have": ["ledger_hash_chain_valid"]});
    let outcome = run_with(&ws, &contract, validators);

    let inspector = report(&ws, &outcome, StageName::Inspector);
    assert_eq!(inspector["checks"]["ledger_hash_chain_valid"], "UNKNOWN");
    let commissioner = report(&ws, &outcome, StageName::Commissioner);
    assert_eq!(
        commissioner["denial_reasons"],
        json!(["ledger_hash_chain_valid:UNKNOWN"])
    );
    assert_eq!(outcome.status(), RunStatus::Denied);
}

#[test]
fn stub_validators_deny_by_default() {
    let ws = Workspace::with_ledgers();
    let outcome = run_with(&ws, &standard_contract(), ValidatorSet::default());

    assert_eq!(outcome.result.stage_statuses.collector, StageStatus::Pass);
    assert_eq!(outcome.result.stage_statuses.inspector, StageStatus::Unknown);
    let inspector = report(&ws, &outcome, StageName::Inspector);
    assert!(inspector["errors"]
        .as_array()
        .unwrap()
        .contains(&json!("hash_chain:not_implemented")));
    assert_eq!(outcome.status(), RunStatus::Denied);
}

#[test]
fn one_failing_field_denies_with_fail_cause() {
    let ws = Workspace::with_ledgers();
    let mut validators = all_fields(TriState::Pass);
    validators.push(Box::new(Fixed {
        field: CommissionerField::UserPermissionValid,
        status: TriState::Fail,
    }));
    let outcome = run_with(&ws, &standard_contract(), validators);

    let commissioner = report(&ws, &outcome, StageName::Commissioner);
    assert_eq!(commissioner["denial_reasons"], json!(["user_permission_valid:FAIL"]));
    assert_eq!(outcome.result.stage_statuses.inspector, StageStatus::Fail);
    assert_eq!(outcome.status(), RunStatus::Denied);
}

#[test]
fn panicking_validator_is_contained() {
    let ws = Workspace::with_ledgers();
    let outcome = run_with(
        &ws,
        &standard_contract(),
        ValidatorSet::new(vec![Box::new(Exploding)]),
    );

    let inspector = report(&ws, &outcome, StageName::Inspector);
    assert_eq!(inspector["checks"]["ledger_hash_chain_valid"], "UNKNOWN");
    assert_eq!(inspector["errors"], json!(["exploding:panic:chain walker overflow"]));
    assert_eq!(outcome.status(), RunStatus::Denied);
    assert!(outcome.result_path.exists());
}

#[test]
fn unrecognized_requirement_denies() {
    let ws = Workspace::with_ledgers();
    let mut contract = standard_contract();
    contract["replay"]["commissioner_requirements"] =
        json!({"must_have": ["ledger_hash_chain_valid", "quorum_reached"]});
    let outcome = run_with(&ws, &contract, all_fields(TriState::Pass));

    let commissioner = report(&ws, &outcome, StageName::Commissioner);
    assert_eq!(
        commissioner["denial_reasons"],
        json!(["quorum_reached:REQUIREMENT_NOT_RECOGNIZED"])
    );
}

// ---------------------------------------------------------------------------
// Allowed paths
// ---------------------------------------------------------------------------

#[test]
fn all_pass_allows_and_judges() {
    let ws = Workspace::with_ledgers();
    let outcome = run_with(&ws, &standard_contract(), all_fields(TriState::Pass));

    assert_eq!(outcome.status(), RunStatus::AllowedStage13);
    assert_eq!(outcome.exit_code(), EXIT_ALLOWED);
    assert_eq!(outcome.result.reason, None);

    let judge = report(&ws, &outcome, StageName::Judge);
    assert_eq!(judge["status"], "PASS");
    assert_eq!(judge["diff"]["equivalent"], true);
    assert!(judge["csm_fingerprint_sha256"].is_string());

    let diff_report = read_json(&outcome.result.evidence_dir.join("diff_report.json"));
    assert_eq!(diff_report["csm"]["meta"]["schema"], diff_report["schema"]);
    assert_eq!(
        diff_report["csm"]["policy_layer"]["commissioner"]["decision"],
        "ALLOW"
    );

    let result = read_json(&outcome.result_path);
    assert_eq!(result["status"], "ALLOWED_STAGE_1_3");
    assert!(result.get("reason").is_none());
}

#[test]
fn narrowed_requirements_allow_with_stub_validators() {
    let ws = Workspace::with_ledgers();
    let mut contract = standard_contract();
    contract["replay"]["commissioner_requirements"] = json!({"must_have": []});
    let outcome = run_with(&ws, &contract, ValidatorSet::default());
    assert_eq!(outcome.status(), RunStatus::AllowedStage13);
}

#[test]
fn judge_drift_does_not_change_verdict() {
    let ws = Workspace::with_ledgers();
    lock_tests::evidence_fixtures::write_json(
        &ws.path(lock_tests::evidence_fixtures::DECISION_LEDGER),
        &json!({"schema_version": "1.0", "events": [{"op": "plan"}]}),
    );
    let outcome = run_with(&ws, &standard_contract(), all_fields(TriState::Pass));

    let judge = report(&ws, &outcome, StageName::Judge);
    assert_eq!(judge["status"], "FAIL");
    assert_eq!(judge["diff"]["critical"], true);
    assert!(judge["diff"]["drift_classes"]
        .as_array()
        .unwrap()
        .contains(&json!("OUTCOME_DRIFT")));
    assert_eq!(outcome.status(), RunStatus::AllowedStage13);
}

#[test]
fn disabled_judge_is_skipped() {
    let ws = Workspace::with_ledgers();
    let mut contract = standard_contract();
    contract["replay"]["pipeline"] =
        json!({"stages_enabled": ["collector", "inspector", "commissioner"]});
    let outcome = run_with(&ws, &contract, all_fields(TriState::Pass));

    let judge = report(&ws, &outcome, StageName::Judge);
    assert_eq!(judge["status"], "SKIPPED");
    assert_eq!(judge["skip_reason"], "stage_disabled");
    let marker = read_json(&outcome.result.evidence_dir.join("diff_report.json"));
    assert_eq!(marker["skipped"], true);
    assert_eq!(marker["reason"], "stage_disabled");
    assert_eq!(outcome.status(), RunStatus::AllowedStage13);
}

// ---------------------------------------------------------------------------
// Evidence layout
// ---------------------------------------------------------------------------

#[test]
fn frozen_clock_stamps_every_artifact_identically() {
    let ws = Workspace::with_ledgers();
    let outcome = run_with(&ws, &standard_contract(), all_fields(TriState::Pass));

    let stamps: Vec<Value> = StageName::ALL
        .iter()
        .map(|&stage| report(&ws, &outcome, stage)["timestamp_utc"].clone())
        .chain([read_json(&outcome.result_path)["timestamp_utc"].clone()])
        .collect();
    assert!(stamps.iter().all(|s| *s == json!("2026-01-15T12:00:00.000000Z")));
}

#[test]
fn default_evidence_dir_is_keyed_by_execution_and_start_time() {
    let ws = Workspace::with_ledgers();
    let mut contract = standard_contract();
    contract["replay"]["outputs"] = json!({});
    let outcome = run_with(&ws, &contract, ValidatorSet::default());
    assert_eq!(
        outcome.result.evidence_dir,
        ws.path("replay/evidence/exec-42/20260115-120000Z")
    );
    assert!(outcome.result.evidence_dir.join("diff_report.json").exists());
    for stage in StageName::ALL {
        assert!(outcome
            .result
            .evidence_dir
            .join("stage_reports")
            .join(stage.report_filename())
            .exists());
    }
}
