//! Capability passport verification as part of a replay run.
//!
//! A contract whose input source is `cats-demo` makes the pipeline verify
//! the named capability's passport chain and persist the two-view artifact
//! next to the stage reports. Verification never affects the verdict.

use serde_json::{json, Value};

use lock_tests::evidence_fixtures::{
    read_json, standard_contract, Workspace, CANONICAL_NAME, CAT_ID, PASSPORT_ID,
};
use replay_harness::pipeline::{run_contract_file, RunOutcome};

fn cats_contract(cat_id: &str) -> Value {
    let mut contract = standard_contract();
    contract["replay"]["inputs"]["source"] = json!("cats-demo");
    contract["replay"]["inputs"]["cat_id"] = json!(cat_id);
    contract["replay"]["inputs"]["payload_json"] = json!({"query": "summarize", "limit": 3});
    contract
}

fn run(ws: &Workspace, contract: &Value) -> RunOutcome {
    let path = ws.contract(contract);
    run_contract_file(&path, &ws.options()).unwrap()
}

fn artifact(outcome: &RunOutcome) -> Value {
    let path = outcome
        .result
        .cats_demo_artifact
        .as_ref()
        .expect("cats-demo run writes an artifact");
    assert_eq!(path, &outcome.result.evidence_dir.join("cats_demo_artifact.json"));
    read_json(path)
}

#[test]
fn active_passport_verifies() {
    let ws = Workspace::with_ledgers();
    ws.write_cats_store("2027-01-01T00:00:00Z", "ACTIVE");
    let outcome = run(&ws, &cats_contract(CAT_ID));
    let art = artifact(&outcome);

    assert_eq!(art["public"]["verified"], true, "{:#}", art["internal"]);
    assert_eq!(art["public"]["canonical_name"], CANONICAL_NAME);
    assert_eq!(art["public"]["denial_code"], Value::Null);
    assert_eq!(
        art["public"]["allowed_side_effects"],
        json!(["read_only", "write_artifacts"])
    );
    assert_eq!(art["public"]["checked_at_utc"], "2026-01-15T12:00:00.000000Z");
    assert_eq!(art["internal"]["passport_id"], PASSPORT_ID);
    assert!(art["internal"]["payload_digest"]
        .as_str()
        .unwrap()
        .starts_with("sha256:"));

    let result = read_json(&outcome.result_path);
    assert!(result["cats_demo_artifact"].is_string());
}

#[test]
fn expiry_at_the_frozen_instant_is_expired() {
    let ws = Workspace::with_ledgers();
    ws.write_cats_store("2026-01-15T12:00:00Z", "ACTIVE");
    let art = artifact(&run(&ws, &cats_contract(CAT_ID)));

    assert_eq!(art["public"]["verified"], false);
    assert_eq!(art["public"]["denial_code"], "EXPIRED");
    assert_eq!(art["public"]["allowed_side_effects"], json!(["read_only"]));
}

#[test]
fn revoked_passport_downgrades_to_read_only() {
    let ws = Workspace::with_ledgers();
    ws.write_cats_store("2027-01-01T00:00:00Z", "REVOKED");
    let art = artifact(&run(&ws, &cats_contract(CAT_ID)));

    assert_eq!(art["public"]["denial_code"], "REVOKED");
    assert_eq!(art["public"]["allowed_side_effects"], json!(["read_only"]));
    assert!(art["public"].get("failures").is_none());
    assert_eq!(art["internal"]["failures"][0]["code"], "REVOKED");
}

#[test]
fn missing_definition_is_reported_not_raised() {
    let ws = Workspace::with_ledgers();
    let outcome = run(&ws, &cats_contract("RGPT-CAT-404"));
    let art = artifact(&outcome);
    assert_eq!(art["public"]["denial_code"], "DEFINITION_NOT_FOUND");
    assert!(outcome.result_path.exists());
}

#[test]
fn traversal_cat_id_is_rejected() {
    let ws = Workspace::with_ledgers();
    let art = artifact(&run(&ws, &cats_contract("../../etc/passwd")));
    assert_eq!(art["public"]["denial_code"], "CAT_ID_INVALID");
}

#[test]
fn other_sources_write_no_artifact() {
    let ws = Workspace::with_ledgers();
    ws.write_cats_store("2027-01-01T00:00:00Z", "ACTIVE");
    let outcome = run(&ws, &standard_contract());
    assert!(outcome.result.cats_demo_artifact.is_none());
    assert!(!outcome
        .result
        .evidence_dir
        .join("cats_demo_artifact.json")
        .exists());
}
