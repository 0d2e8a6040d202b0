//! Side-effect tracker: end-of-run file scan against the declared envelope.
//!
//! Files under `scan_roots` are matched (as working-directory-relative POSIX
//! paths) against `blocked_files` and `allowed_files`. The unexpected count,
//! the destructive flags and the environment select a drift level and a
//! verdict:
//!
//! | Condition                          | Level | PROD | STAGING           | DEV               |
//! |------------------------------------|-------|------|-------------------|-------------------|
//! | nothing unexpected                 | D0    | PASS | PASS              | PASS              |
//! | destructive                        | D3    | FAIL | FAIL              | FAIL              |
//! | count <= `max_unexpected_effects`  | D1    | FAIL | WARN (FAIL strict)| WARN (FAIL strict)|
//! | count >  `max_unexpected_effects`  | D2    | FAIL | FAIL              | FAIL              |
//!
//! Network and table sensors are not wired in: `network_calls_detected` is
//! always false and `unexpected_tables` always empty.

use std::path::{Path, PathBuf};

use glob::Pattern;
use serde::Serialize;
use walkdir::WalkDir;

use crate::contract::SideEffectPolicy;
use crate::snapshot::DriftLevel;

pub const NOTE_SCAN_DISABLED: &str =
    "progressive scaffolding: detection disabled (policy.scan_roots empty).";
pub const NOTE_FILE_PATTERNS_ONLY: &str = "file-pattern evaluation only";

#[derive(Debug, thiserror::Error)]
pub enum TrackerFault {
    #[error("invalid glob pattern {pattern:?}: {detail}")]
    Pattern { pattern: String, detail: String },

    #[error("cannot scan {path}: {detail}")]
    Scan { path: PathBuf, detail: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TrackerEnvironment {
    Dev,
    Staging,
    Prod,
}

impl TrackerEnvironment {
    #[must_use]
    pub fn parse(tag: &str) -> Option<Self> {
        match tag.trim().to_ascii_uppercase().as_str() {
            "DEV" => Some(Self::Dev),
            "STAGING" | "PREPROD" | "UAT" => Some(Self::Staging),
            "PROD" | "PRODUCTION" => Some(Self::Prod),
            _ => None,
        }
    }

    /// Declared environment, else the mode tag if it names one, else DEV.
    #[must_use]
    pub fn resolve(declared: Option<&str>, mode_tag: &str) -> Self {
        declared
            .and_then(Self::parse)
            .or_else(|| Self::parse(mode_tag))
            .unwrap_or(Self::Dev)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TrackerVerdict {
    Pass,
    Warn,
    Fail,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DriftReport {
    pub mode: TrackerEnvironment,
    pub drift_class: DriftLevel,
    pub unexpected_files: Vec<String>,
    pub unexpected_tables: Vec<String>,
    pub network_calls_detected: bool,
    pub runtime_mode_changed: bool,
    pub severity_score: u8,
    pub verdict: TrackerVerdict,
    pub generated_at_utc: String,
    pub notes: Vec<String>,
}

impl DriftReport {
    /// Neutral report used when the tracker itself failed.
    #[must_use]
    pub fn degraded(mode: TrackerEnvironment, note: String, generated_at_utc: String) -> Self {
        Self {
            mode,
            drift_class: DriftLevel::D0,
            unexpected_files: Vec::new(),
            unexpected_tables: Vec::new(),
            network_calls_detected: false,
            runtime_mode_changed: false,
            severity_score: 0,
            verdict: TrackerVerdict::Pass,
            generated_at_utc,
            notes: vec![note],
        }
    }
}

/// Tracker score: the drift level's ordinal (0..=3). The snapshot diff
/// keeps its own 0..=90 scale.
#[must_use]
pub const fn severity_score(level: DriftLevel) -> u8 {
    match level {
        DriftLevel::D0 => 0,
        DriftLevel::D1 => 1,
        DriftLevel::D2 => 2,
        DriftLevel::D3 => 3,
    }
}

/// Drift level and verdict for an evaluated scan.
#[must_use]
pub fn classify(
    unexpected: usize,
    destructive: bool,
    policy: &SideEffectPolicy,
    env: TrackerEnvironment,
) -> (DriftLevel, TrackerVerdict) {
    if destructive {
        return (DriftLevel::D3, TrackerVerdict::Fail);
    }
    if unexpected == 0 {
        return (DriftLevel::D0, TrackerVerdict::Pass);
    }
    let level = if unexpected <= policy.max_unexpected_effects {
        DriftLevel::D1
    } else {
        DriftLevel::D2
    };
    let verdict = match env {
        TrackerEnvironment::Prod => TrackerVerdict::Fail,
        TrackerEnvironment::Staging | TrackerEnvironment::Dev => {
            if level == DriftLevel::D1 && !policy.strict {
                TrackerVerdict::Warn
            } else {
                TrackerVerdict::Fail
            }
        }
    };
    (level, verdict)
}

pub struct SideEffectTracker<'a> {
    policy: &'a SideEffectPolicy,
    environment: TrackerEnvironment,
    workdir: &'a Path,
    allowed: Vec<Pattern>,
    blocked: Vec<Pattern>,
}

impl<'a> SideEffectTracker<'a> {
    /// Compile the policy's glob patterns.
    ///
    /// # Errors
    ///
    /// [`TrackerFault::Pattern`] on the first invalid pattern.
    pub fn new(
        policy: &'a SideEffectPolicy,
        environment: TrackerEnvironment,
        workdir: &'a Path,
    ) -> Result<Self, TrackerFault> {
        Ok(Self {
            policy,
            environment,
            workdir,
            allowed: compile(&policy.allowed_files)?,
            blocked: compile(&policy.blocked_files)?,
        })
    }

    fn is_unexpected(&self, rel: &str) -> bool {
        if self.blocked.iter().any(|p| p.matches(rel)) {
            return true;
        }
        !self.allowed.is_empty() && !self.allowed.iter().any(|p| p.matches(rel))
    }

    /// Scan and classify.
    ///
    /// # Errors
    ///
    /// [`TrackerFault::Scan`] if an existing scan root cannot be walked.
    pub fn evaluate(&self, generated_at_utc: String) -> Result<DriftReport, TrackerFault> {
        let mut notes = vec![NOTE_FILE_PATTERNS_ONLY.to_string()];
        let mut unexpected_files = Vec::new();

        if self.policy.scan_roots.is_empty() {
            notes.push(NOTE_SCAN_DISABLED.to_string());
        }
        for root in &self.policy.scan_roots {
            let abs = if root.is_absolute() {
                root.clone()
            } else {
                self.workdir.join(root)
            };
            if !abs.exists() {
                notes.push(format!("scan root missing: {}", root.display()));
                continue;
            }
            for rel in self.scan_root(&abs)? {
                if self.is_unexpected(&rel) {
                    unexpected_files.push(rel);
                }
            }
        }
        unexpected_files.sort();
        unexpected_files.dedup();

        let network_calls_detected = false;
        let runtime_mode_changed = false;
        let destructive = (network_calls_detected && !self.policy.allow_network)
            || (runtime_mode_changed && !self.policy.allow_runtime_mode_change);

        let (drift_class, verdict) = classify(
            unexpected_files.len(),
            destructive,
            self.policy,
            self.environment,
        );

        Ok(DriftReport {
            mode: self.environment,
            drift_class,
            unexpected_files,
            unexpected_tables: Vec::new(),
            network_calls_detected,
            runtime_mode_changed,
            severity_score: severity_score(drift_class),
            verdict,
            generated_at_utc,
            notes,
        })
    }

    fn scan_root(&self, root: &Path) -> Result<Vec<String>, TrackerFault> {
        let mut out = Vec::new();
        for entry in WalkDir::new(root).follow_links(false) {
            let entry = match entry {
                Ok(e) => e,
                Err(e) if e.depth() == 0 => {
                    return Err(TrackerFault::Scan {
                        path: root.to_path_buf(),
                        detail: e.to_string(),
                    })
                }
                Err(_) => continue,
            };
            if entry.file_type().is_file() {
                out.push(posix_relative(entry.path(), self.workdir));
            }
        }
        Ok(out)
    }
}

fn compile(patterns: &[String]) -> Result<Vec<Pattern>, TrackerFault> {
    patterns
        .iter()
        .map(|p| {
            Pattern::new(p).map_err(|e| TrackerFault::Pattern {
                pattern: p.clone(),
                detail: e.to_string(),
            })
        })
        .collect()
}

/// `path` relative to `base` when possible, with `/` separators.
fn posix_relative(path: &Path, base: &Path) -> String {
    let rel = path.strip_prefix(base).unwrap_or(path);
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
