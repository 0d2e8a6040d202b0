//! Judge stage: canonicalizes both ledgers, diffs intent against outcome,
//! and writes the diff report. Never changes the run verdict.
//!
//! `diff_report.json` is written on every run. When no diff was computed it
//! holds a skip marker: `{"skipped": true, "reason": .., "errors": [..]}`.

use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::{json, Value};
use tracing::debug;

use replay_kernel::judge::canonicalize::{canonicalize, canonicalize_v2, CanonicalizeOptions};
use replay_kernel::judge::diff::{semantic_diff, DiffResult};
use replay_kernel::judge::{CSM_SCHEMA_V2, FP_CSM};

use crate::contract::ReplayPaths;
use crate::evidence_io::{read_json, write_json_once, EvidenceError};

use super::commissioner::CommissionerReport;
use super::inspector::InspectorReport;
use super::{StageName, StageStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    StageDisabled,
    CommissionerDenied,
}

impl SkipReason {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::StageDisabled => "stage_disabled",
            Self::CommissionerDenied => "commissioner_denied",
        }
    }
}

/// Marker reason when a ledger could not be loaded.
pub const LEDGER_UNAVAILABLE: &str = "ledger_unavailable";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JudgeReport {
    pub stage: StageName,
    pub status: StageStatus,
    pub timestamp_utc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<SkipReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diff: Option<DiffResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub csm_fingerprint_sha256: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diff_report_path: Option<PathBuf>,
    pub errors: Vec<String>,
}

impl JudgeReport {
    #[must_use]
    pub fn skipped(reason: SkipReason, timestamp_utc: String) -> Self {
        Self {
            stage: StageName::Judge,
            status: StageStatus::Skipped,
            timestamp_utc,
            skip_reason: Some(reason),
            diff: None,
            csm_fingerprint_sha256: None,
            diff_report_path: None,
            errors: Vec::new(),
        }
    }

    fn unknown(errors: Vec<String>, timestamp_utc: String) -> Self {
        Self {
            status: StageStatus::Unknown,
            skip_reason: None,
            errors,
            ..Self::skipped(SkipReason::StageDisabled, timestamp_utc)
        }
    }
}

/// Write the skip marker in place of a diff and return its path.
///
/// # Errors
///
/// [`EvidenceError`] if the marker cannot be written, including when a
/// diff report already exists.
pub fn write_skip_marker(
    paths: &ReplayPaths,
    reason: &str,
    errors: &[String],
) -> Result<PathBuf, EvidenceError> {
    let marker = json!({
        "skipped": true,
        "reason": reason,
        "errors": errors,
    });
    write_json_once(&paths.diff_report, &marker)?;
    Ok(paths.diff_report.clone())
}

/// Skip the judge and leave the marker behind.
///
/// # Errors
///
/// [`EvidenceError`] if the marker cannot be written.
pub fn skip(
    paths: &ReplayPaths,
    reason: SkipReason,
    timestamp_utc: String,
) -> Result<JudgeReport, EvidenceError> {
    let marker = write_skip_marker(paths, reason.as_str(), &[])?;
    Ok(JudgeReport {
        diff_report_path: Some(marker),
        ..JudgeReport::skipped(reason, timestamp_utc)
    })
}

/// Judge the run and write `diff_report.json`.
///
/// PASS when the decision ledger and execution ledger are semantically
/// equivalent, FAIL on drift, UNKNOWN when either ledger is unavailable
/// (the report is then a skip marker).
///
/// # Errors
///
/// Returns [`EvidenceError`] only if the diff report cannot be written.
pub fn judge(
    paths: &ReplayPaths,
    inspector: &InspectorReport,
    commissioner: &CommissionerReport,
    options: &CanonicalizeOptions,
    timestamp_utc: String,
) -> Result<JudgeReport, EvidenceError> {
    let mut errors = Vec::new();
    let intent = load(paths.decision_ledger.as_deref(), "decision_ledger", &mut errors);
    let outcome = load(paths.execution_ledger.as_deref(), "execution_ledger", &mut errors);
    let (Some(intent), Some(outcome)) = (intent, outcome) else {
        let marker = write_skip_marker(paths, LEDGER_UNAVAILABLE, &errors)?;
        return Ok(JudgeReport {
            diff_report_path: Some(marker),
            ..JudgeReport::unknown(errors, timestamp_utc)
        });
    };

    let intent_csm = canonicalize(&intent, options);
    let outcome_csm = canonicalize(&outcome, options);
    let diff = semantic_diff(&intent_csm, &outcome_csm);

    let policy_layer = json!({
        "inspector": {
            "status": inspector.status,
            "checks": &inspector.checks,
            "errors": &inspector.errors,
        },
        "commissioner": {
            "decision": commissioner.decision,
            "denial_reasons": &commissioner.denial_reasons,
        },
    });
    let csm = canonicalize_v2(&intent, &outcome, Some(&policy_layer), options);
    let csm_fingerprint = csm["meta"][FP_CSM].as_str().map(str::to_string);

    let report_body = json!({
        "schema": CSM_SCHEMA_V2,
        "diff": &diff,
        "intent_csm": intent_csm,
        "outcome_csm": outcome_csm,
        "csm": csm,
    });
    write_json_once(&paths.diff_report, &report_body)?;
    debug!(
        equivalent = diff.equivalent,
        confidence = diff.confidence,
        "judge diff written"
    );

    let status = if diff.equivalent {
        StageStatus::Pass
    } else {
        StageStatus::Fail
    };

    Ok(JudgeReport {
        stage: StageName::Judge,
        status,
        timestamp_utc,
        skip_reason: None,
        diff: Some(diff),
        csm_fingerprint_sha256: csm_fingerprint,
        diff_report_path: Some(paths.diff_report.clone()),
        errors,
    })
}

fn load(path: Option<&Path>, label: &str, errors: &mut Vec<String>) -> Option<Value> {
    let Some(path) = path else {
        errors.push(format!("{label}:not_declared"));
        return None;
    };
    match read_json(path) {
        Ok(v) => Some(v),
        Err(e) => {
            errors.push(format!("{label}:{e}"));
            None
        }
    }
}
