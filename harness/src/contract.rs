//! Run contract: typed configuration loaded from the contract JSON file, and
//! the immutable [`ReplayContext`] built from it once per run.
//!
//! Every section and field is optional. Unrecognized keys are ignored.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use replay_kernel::commissioner::{CommissionerField, CommissionerPolicy};

use crate::clock::EVIDENCE_DIR_TIME_FORMAT;
use crate::stages::StageName;

/// Mode tag used when the contract does not declare one.
pub const DEFAULT_MODE: &str = "strict_from_stage_3";

/// Evidence base used when the caller does not supply one.
pub const DEFAULT_EVIDENCE_BASE: &str = "replay/evidence";

/// Capability store root used when the contract does not supply one.
pub const DEFAULT_CATS_ROOT: &str = "cats";

/// `inputs.source` value that triggers passport verification.
pub const CATS_DEMO_SOURCE: &str = "cats-demo";

/// Directory name used when neither an execution id nor a cat id is declared.
pub const UNKNOWN_EXECUTION: &str = "unknown_execution";

/// Error loading a contract file.
#[derive(Debug, thiserror::Error)]
pub enum ContractError {
    #[error("cannot read contract {path}: {detail}")]
    Read { path: PathBuf, detail: String },

    #[error("malformed contract {path}: {detail}")]
    Parse { path: PathBuf, detail: String },
}

// ---------------------------------------------------------------------------
// Contract file shape
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplayContract {
    pub replay: ReplaySection,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplaySection {
    pub target_execution_id: Option<String>,
    pub window: WindowSection,
    pub mode: Option<String>,
    /// Part of the snapshot context identity.
    pub policy_version: Option<String>,
    pub inputs: InputsSection,
    pub outputs: OutputsSection,
    pub determinism: DeterminismFlags,
    pub pipeline: PipelineConfig,
    pub commissioner_requirements: CommissionerRequirements,
    pub side_effects: SideEffectPolicy,
}

/// Event-index window: inclusive start, optional end.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowSection {
    pub from_event_idx: u64,
    pub to_event_idx: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InputsSection {
    pub execution_ledger_path: Option<PathBuf>,
    pub decision_ledger_path: Option<PathBuf>,
    pub artifacts_manifest_path: Option<PathBuf>,
    pub source: Option<String>,
    pub cat_id: Option<String>,
    /// Either a JSON value or a string holding JSON text.
    pub payload_json: Option<Value>,
    pub cats_root: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputsSection {
    pub evidence_dir: Option<PathBuf>,
    pub stage_reports_dir: Option<PathBuf>,
    pub diff_report_path: Option<PathBuf>,
    pub replay_result_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeterminismFlags {
    pub freeze_time_utc: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// `None` enables every stage.
    pub stages_enabled: Option<Vec<String>>,
}

impl PipelineConfig {
    /// Whether `stage` is enabled. Names compare case-insensitively.
    #[must_use]
    pub fn is_enabled(&self, stage: StageName) -> bool {
        self.stages_enabled.as_ref().map_or(true, |names| {
            names
                .iter()
                .any(|n| n.trim().eq_ignore_ascii_case(stage.as_str()))
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommissionerRequirements {
    /// `None` enforces every known field. An explicit empty list enforces none.
    pub must_have: Option<Vec<String>>,
    pub deny_if_missing_inputs: bool,
}

impl Default for CommissionerRequirements {
    fn default() -> Self {
        Self {
            must_have: None,
            deny_if_missing_inputs: true,
        }
    }
}

impl CommissionerRequirements {
    #[must_use]
    pub fn to_policy(&self) -> CommissionerPolicy {
        let must_have = match &self.must_have {
            Some(names) => names.clone(),
            None => CommissionerField::ALL
                .iter()
                .map(|f| f.as_str().to_string())
                .collect(),
        };
        CommissionerPolicy {
            must_have,
            deny_if_missing_inputs: self.deny_if_missing_inputs,
        }
    }
}

/// Declared side-effect envelope for the run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SideEffectPolicy {
    pub allowed_files: Vec<String>,
    pub blocked_files: Vec<String>,
    pub allow_network: bool,
    pub allow_runtime_mode_change: bool,
    pub max_unexpected_effects: usize,
    pub strict: bool,
    pub scan_roots: Vec<PathBuf>,
    /// Directory hashed by the begin/end snapshots.
    pub snapshot_root: Option<PathBuf>,
    /// DEV / STAGING / PROD.
    pub environment: Option<String>,
}

// ---------------------------------------------------------------------------
// Mode
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplayMode {
    Strict,
    Sandbox,
    LiveAllowlist,
    /// Any other tag, kept verbatim.
    Legacy(String),
}

impl ReplayMode {
    #[must_use]
    pub fn parse(tag: &str) -> Self {
        let trimmed = tag.trim();
        match trimmed.to_ascii_uppercase().as_str() {
            "STRICT" => Self::Strict,
            "SANDBOX" => Self::Sandbox,
            "LIVE_ALLOWLIST" => Self::LiveAllowlist,
            _ => Self::Legacy(trimmed.to_string()),
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Strict => "STRICT",
            Self::Sandbox => "SANDBOX",
            Self::LiveAllowlist => "LIVE_ALLOWLIST",
            Self::Legacy(tag) => tag,
        }
    }

    /// Only `STRICT` turns snapshot drift into a denial.
    #[must_use]
    pub fn is_strict(&self) -> bool {
        matches!(self, Self::Strict)
    }
}

impl Default for ReplayMode {
    fn default() -> Self {
        Self::Legacy(DEFAULT_MODE.to_string())
    }
}

impl std::fmt::Display for ReplayMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Resolved run context
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayConfig {
    pub target_execution_id: Option<String>,
    pub from_event_idx: u64,
    pub to_event_idx: Option<u64>,
    pub mode: ReplayMode,
    pub policy_version: Option<String>,
}

/// Resolved locations for one run. Undeclared inputs stay `None`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayPaths {
    pub execution_ledger: Option<PathBuf>,
    pub decision_ledger: Option<PathBuf>,
    pub artifacts_manifest: Option<PathBuf>,
    pub evidence_dir: PathBuf,
    pub stage_reports_dir: PathBuf,
    pub diff_report: PathBuf,
    pub replay_result: PathBuf,
    pub cats_artifact: PathBuf,
}

/// Passport verification request (`inputs.source == "cats-demo"`).
#[derive(Debug, Clone, PartialEq)]
pub struct CatsRequest {
    pub cat_id: String,
    pub payload: Option<Value>,
    pub cats_root: PathBuf,
}

/// Everything a run needs, built once and never mutated.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplayContext {
    pub config: ReplayConfig,
    pub paths: ReplayPaths,
    pub side_effects: SideEffectPolicy,
    pub determinism: DeterminismFlags,
    pub pipeline: PipelineConfig,
    pub commissioner: CommissionerRequirements,
    pub cats: Option<CatsRequest>,
    pub contract_path: PathBuf,
    pub workdir: PathBuf,
}

/// Read and parse a contract file.
///
/// # Errors
///
/// [`ContractError::Read`] if the file is unreadable, [`ContractError::Parse`]
/// if it is not a JSON object of the expected shape.
pub fn load_contract(path: &Path) -> Result<ReplayContract, ContractError> {
    let bytes = std::fs::read(path).map_err(|e| ContractError::Read {
        path: path.to_path_buf(),
        detail: e.to_string(),
    })?;
    serde_json::from_slice(&bytes).map_err(|e| ContractError::Parse {
        path: path.to_path_buf(),
        detail: e.to_string(),
    })
}

/// Build the run context.
///
/// Relative paths resolve against `workdir`. Output locations not given by
/// the contract default under the evidence directory, which itself defaults
/// to `<evidence_base>/<execution-or-cat-id>/<UTC timestamp>`.
#[must_use]
pub fn build_context(
    contract: &ReplayContract,
    contract_path: &Path,
    workdir: &Path,
    evidence_base: &Path,
    started_at: DateTime<Utc>,
) -> ReplayContext {
    let r = &contract.replay;
    let resolve = |p: &Path| -> PathBuf {
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            workdir.join(p)
        }
    };

    let config = ReplayConfig {
        target_execution_id: r.target_execution_id.clone(),
        from_event_idx: r.window.from_event_idx,
        to_event_idx: r.window.to_event_idx,
        mode: r.mode.as_deref().map(ReplayMode::parse).unwrap_or_default(),
        policy_version: r.policy_version.clone(),
    };

    let evidence_dir = match &r.outputs.evidence_dir {
        Some(dir) => resolve(dir),
        None => {
            let run_key = r
                .target_execution_id
                .as_deref()
                .or(r.inputs.cat_id.as_deref())
                .filter(|s| !s.trim().is_empty())
                .map_or_else(|| UNKNOWN_EXECUTION.to_string(), dir_component);
            resolve(evidence_base)
                .join(run_key)
                .join(started_at.format(EVIDENCE_DIR_TIME_FORMAT).to_string())
        }
    };
    let out = |declared: Option<&PathBuf>, default_name: &str| -> PathBuf {
        declared.map_or_else(|| evidence_dir.join(default_name), |p| resolve(p))
    };

    let paths = ReplayPaths {
        execution_ledger: r.inputs.execution_ledger_path.as_deref().map(resolve),
        decision_ledger: r.inputs.decision_ledger_path.as_deref().map(resolve),
        artifacts_manifest: r.inputs.artifacts_manifest_path.as_deref().map(resolve),
        stage_reports_dir: out(r.outputs.stage_reports_dir.as_ref(), "stage_reports"),
        diff_report: out(r.outputs.diff_report_path.as_ref(), "diff_report.json"),
        replay_result: out(r.outputs.replay_result_path.as_ref(), "replay_result.json"),
        cats_artifact: evidence_dir.join("cats_demo_artifact.json"),
        evidence_dir,
    };

    let cats = (r.inputs.source.as_deref().map(str::trim) == Some(CATS_DEMO_SOURCE)).then(|| {
        CatsRequest {
            cat_id: r.inputs.cat_id.clone().unwrap_or_default(),
            payload: r.inputs.payload_json.clone(),
            cats_root: resolve(
                r.inputs
                    .cats_root
                    .as_deref()
                    .unwrap_or_else(|| Path::new(DEFAULT_CATS_ROOT)),
            ),
        }
    });

    ReplayContext {
        config,
        paths,
        side_effects: r.side_effects.clone(),
        determinism: r.determinism,
        pipeline: r.pipeline.clone(),
        commissioner: r.commissioner_requirements.clone(),
        cats,
        contract_path: resolve(contract_path),
        workdir: workdir.to_path_buf(),
    }
}

/// Make an id safe to use as one directory name.
fn dir_component(id: &str) -> String {
    id.trim()
        .chars()
        .map(|c| if matches!(c, '/' | '\\') { '_' } else { c })
        .collect::<String>()
        .replace("..", "__")
}
