//! Begin/end side-effect snapshots and their drift classification.
//!
//! A [`Snapshot`] holds three independent digests:
//!
//! | Surface  | Input                                                   |
//! |----------|---------------------------------------------------------|
//! | ledger   | canonical JSON of the ledger's exported state           |
//! | files    | `relpath \0 contents \0` for every file under the root  |
//! | context  | canonical JSON of runtime mode, policy version, contract hash |
//!
//! An absent surface digests to [`EMPTY_DIGEST`]. Severity ordering is
//! context > ledger > files.

use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use walkdir::WalkDir;

use replay_kernel::evidence::TriState;
use replay_kernel::proof::hash::{fingerprint, sha256_hex};

use crate::evidence_io::read_json;

/// Digest of a surface that does not exist.
pub const EMPTY_DIGEST: &str = "EMPTY";

#[derive(Debug, thiserror::Error)]
pub enum SnapshotFault {
    #[error("cannot walk snapshot root {path}: {detail}")]
    Walk { path: PathBuf, detail: String },
}

/// Optional capability: a collaborator that can export its current state.
pub trait LedgerStateExport {
    /// `None` when there is no state to export.
    fn exports_state(&self) -> Option<Map<String, Value>>;
}

/// A JSON ledger file. A non-object document is exported under `"document"`.
#[derive(Debug, Clone)]
pub struct FileLedger {
    path: PathBuf,
}

impl FileLedger {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl LedgerStateExport for FileLedger {
    fn exports_state(&self) -> Option<Map<String, Value>> {
        match read_json(&self.path).ok()? {
            Value::Object(map) => Some(map),
            other => {
                let mut map = Map::new();
                map.insert("document".into(), other);
                Some(map)
            }
        }
    }
}

/// Identity of the run's governing context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContextIdentity {
    pub runtime_mode: String,
    pub policy_version: Option<String>,
    /// Hex SHA-256 of the contract file bytes; `None` if unreadable.
    pub contract_sha256: Option<String>,
}

impl ContextIdentity {
    /// Capture the identity, reading the contract file now.
    #[must_use]
    pub fn capture(runtime_mode: &str, policy_version: Option<&str>, contract_path: &Path) -> Self {
        Self {
            runtime_mode: runtime_mode.to_string(),
            policy_version: policy_version.map(str::to_string),
            contract_sha256: std::fs::read(contract_path).ok().map(|b| sha256_hex(&b)),
        }
    }

    fn digest(&self) -> String {
        let value = serde_json::json!({
            "runtime_mode": self.runtime_mode,
            "policy_version": self.policy_version,
            "contract_sha256": self.contract_sha256,
        });
        fingerprint(&value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Snapshot {
    pub ledger_digest: String,
    pub files_digest: String,
    pub context_digest: String,
    pub taken_at_utc: String,
}

/// Take a snapshot.
///
/// # Errors
///
/// [`SnapshotFault::Walk`] if `files_root` exists but cannot be walked.
pub fn take_snapshot(
    ledger: Option<&dyn LedgerStateExport>,
    files_root: Option<&Path>,
    context: &ContextIdentity,
    taken_at_utc: String,
) -> Result<Snapshot, SnapshotFault> {
    let ledger_digest = ledger
        .and_then(|l| l.exports_state())
        .map_or_else(|| EMPTY_DIGEST.to_string(), |m| fingerprint(&Value::Object(m)));
    let files_digest = match files_root {
        Some(root) => hash_file_tree(root)?,
        None => EMPTY_DIGEST.to_string(),
    };
    Ok(Snapshot {
        ledger_digest,
        files_digest,
        context_digest: context.digest(),
        taken_at_utc,
    })
}

/// Digest a directory tree by relative path and contents.
///
/// Files are visited in relative-path order; paths use `/` separators.
/// Unreadable files and entries are skipped. A missing root is
/// [`EMPTY_DIGEST`].
///
/// # Errors
///
/// [`SnapshotFault::Walk`] if the root itself cannot be read.
pub fn hash_file_tree(root: &Path) -> Result<String, SnapshotFault> {
    if !root.exists() {
        return Ok(EMPTY_DIGEST.to_string());
    }

    let mut files: Vec<(String, PathBuf)> = Vec::new();
    for entry in WalkDir::new(root).follow_links(false) {
        let entry = match entry {
            Ok(e) => e,
            Err(e) if e.depth() == 0 => {
                return Err(SnapshotFault::Walk {
                    path: root.to_path_buf(),
                    detail: e.to_string(),
                })
            }
            Err(_) => continue,
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = entry.path().strip_prefix(root).unwrap_or(entry.path());
        let rel = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        files.push((rel, entry.into_path()));
    }
    files.sort();

    let mut hasher = Sha256::new();
    for (rel, path) in &files {
        let Ok(contents) = std::fs::read(path) else {
            continue;
        };
        hasher.update(rel.as_bytes());
        hasher.update([0u8]);
        hasher.update(&contents);
        hasher.update([0u8]);
    }
    Ok(hex::encode(hasher.finalize()))
}

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

/// Drift level, shared by the snapshot diff and the side-effect tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum DriftLevel {
    D0,
    D1,
    D2,
    D3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    None,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SnapshotDiff {
    /// PASS: no drift. FAIL: drift. UNKNOWN: a snapshot could not be taken.
    pub status: TriState,
    pub ledger_drift: bool,
    pub file_drift: bool,
    pub context_drift: bool,
    pub drift_class: DriftLevel,
    pub severity: Severity,
    pub severity_score: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub begin: Option<Snapshot>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<Snapshot>,
    pub notes: Vec<String>,
}

impl SnapshotDiff {
    #[must_use]
    pub fn has_drift(&self) -> bool {
        self.ledger_drift || self.file_drift || self.context_drift
    }

    /// Neutral result for a run whose snapshots could not be taken.
    #[must_use]
    pub fn degraded(note: impl Into<String>) -> Self {
        Self {
            status: TriState::Unknown,
            ledger_drift: false,
            file_drift: false,
            context_drift: false,
            drift_class: DriftLevel::D0,
            severity: Severity::None,
            severity_score: 0,
            begin: None,
            end: None,
            notes: vec![note.into()],
        }
    }
}

/// Compare two snapshots. Context drift dominates, then ledger, then files.
#[must_use]
pub fn diff_snapshots(begin: &Snapshot, end: &Snapshot) -> SnapshotDiff {
    let ledger_drift = begin.ledger_digest != end.ledger_digest;
    let file_drift = begin.files_digest != end.files_digest;
    let context_drift = begin.context_digest != end.context_digest;

    let (drift_class, severity, severity_score) = if context_drift {
        (DriftLevel::D3, Severity::High, 90)
    } else if ledger_drift {
        (DriftLevel::D2, Severity::High, 70)
    } else if file_drift {
        (DriftLevel::D1, Severity::Medium, 40)
    } else {
        (DriftLevel::D0, Severity::None, 0)
    };

    let status = if drift_class == DriftLevel::D0 {
        TriState::Pass
    } else {
        TriState::Fail
    };

    SnapshotDiff {
        status,
        ledger_drift,
        file_drift,
        context_drift,
        drift_class,
        severity,
        severity_score,
        begin: Some(begin.clone()),
        end: Some(end.clone()),
        notes: Vec::new(),
    }
}
