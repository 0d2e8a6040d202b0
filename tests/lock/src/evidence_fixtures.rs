//! Evidence workspaces for end-to-end pipeline tests.
//!
//! A [`Workspace`] is a temp directory holding ledgers, an optional
//! capability store and a contract. All runs use [`frozen_instant`] so
//! evidence directory names and timestamps are reproducible.
//!
//! # Panics
//!
//! Every helper panics on I/O failure. These are test-only invariants.

use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeZone, Utc};
use serde_json::{json, Value};

use replay_harness::pipeline::RunOptions;
use replay_harness::stages::StageName;
use replay_kernel::proof::hash::ContentHash;

pub const EXEC_LEDGER: &str = "ledgers/execution_ledger.json";
pub const DECISION_LEDGER: &str = "ledgers/decision_ledger.json";
pub const ARTIFACTS_MANIFEST: &str = "ledgers/artifacts_manifest.json";
pub const EVIDENCE_DIR: &str = "evidence/run";

pub const CAT_ID: &str = "RGPT-CAT-01";
pub const CANONICAL_NAME: &str = "rgpt.cat.summarize";
pub const PASSPORT_ID: &str = "PP-0001";

/// 2026-01-15T12:00:00Z.
#[must_use]
pub fn frozen_instant() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 15, 12, 0, 0).unwrap()
}

pub fn write_json(path: &Path, value: &Value) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, serde_json::to_vec_pretty(value).unwrap()).unwrap();
}

#[must_use]
pub fn read_json(path: &Path) -> Value {
    serde_json::from_slice(&std::fs::read(path).unwrap()).unwrap()
}

/// Execution ledger with two events.
#[must_use]
pub fn execution_ledger() -> Value {
    json!({
        "schema_version": "1.0",
        "execution_id": "exec-42",
        "events": [
            {"idx": 0, "op": "plan", "timestamp": "2026-01-15T11:59:00Z"},
            {"idx": 1, "op": "apply", "timestamp": "2026-01-15T11:59:30Z"}
        ]
    })
}

/// Decision ledger semantically equal to [`execution_ledger`] once volatile
/// keys are stripped and lists are sorted.
#[must_use]
pub fn decision_ledger() -> Value {
    json!({
        "events": [
            {"op": "apply", "idx": 1, "timestamp": "2026-01-15T11:00:00Z"},
            {"op": "plan", "idx": 0}
        ],
        "schema_version": "1.0",
        "run_id": "decider-7"
    })
}

pub struct Workspace {
    pub dir: tempfile::TempDir,
}

impl Workspace {
    #[must_use]
    pub fn empty() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
        }
    }

    /// Workspace with all three ledger inputs present.
    #[must_use]
    pub fn with_ledgers() -> Self {
        let ws = Self::empty();
        write_json(&ws.path(EXEC_LEDGER), &execution_ledger());
        write_json(&ws.path(DECISION_LEDGER), &decision_ledger());
        write_json(
            &ws.path(ARTIFACTS_MANIFEST),
            &json!({"artifacts": [{"id": "report.md", "sha256": "00"}]}),
        );
        ws
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    #[must_use]
    pub fn path(&self, rel: &str) -> PathBuf {
        self.dir.path().join(rel)
    }

    /// Write `contract` as `contract.json` and return its path.
    #[must_use]
    pub fn contract(&self, contract: &Value) -> PathBuf {
        let path = self.path("contract.json");
        write_json(&path, contract);
        path
    }

    #[must_use]
    pub fn options(&self) -> RunOptions {
        RunOptions {
            now: Some(frozen_instant()),
            ..RunOptions::new(self.root())
        }
    }

    #[must_use]
    pub fn stage_report(&self, evidence_dir: &Path, stage: StageName) -> Value {
        read_json(&evidence_dir.join("stage_reports").join(stage.report_filename()))
    }

    /// Capability store under `cats/` whose passport expires at `expires_at_utc`.
    pub fn write_cats_store(&self, expires_at_utc: &str, status: &str) {
        let definition = json!({
            "cat_id": CAT_ID,
            "canonical_name": CANONICAL_NAME,
            "passport_required": true,
            "passport_id": PASSPORT_ID,
            "allowed_side_effects": ["read_only", "write_artifacts"]
        });
        write_json(&self.path(&format!("cats/definitions/{CAT_ID}.json")), &definition);
        write_json(
            &self.path("cats/registry_index.json"),
            &json!({"namespaces": {CANONICAL_NAME: {
                "cat_id": CAT_ID,
                "status": "ACTIVE",
                "passport_id": PASSPORT_ID,
                "passport_required": true
            }}}),
        );
        write_json(
            &self.path("cats/passport_register.json"),
            &json!({"passports": [{
                "passport_id": PASSPORT_ID,
                "cat_id": CAT_ID,
                "canonical_name": CANONICAL_NAME,
                "status": status,
                "expires_at_utc": expires_at_utc,
                "bundle_digest": ContentHash::of_json(&definition).as_str()
            }]}),
        );
    }
}

/// Contract declaring the three standard ledger inputs and a fixed evidence dir.
#[must_use]
pub fn standard_contract() -> Value {
    json!({
        "replay": {
            "target_execution_id": "exec-42",
            "window": {"from_event_idx": 0, "to_event_idx": 1},
            "mode": "SANDBOX",
            "policy_version": "policy-2026.01",
            "inputs": {
                "execution_ledger_path": EXEC_LEDGER,
                "decision_ledger_path": DECISION_LEDGER,
                "artifacts_manifest_path": ARTIFACTS_MANIFEST
            },
            "outputs": {"evidence_dir": EVIDENCE_DIR},
            "determinism": {"freeze_time_utc": true}
        }
    })
}
