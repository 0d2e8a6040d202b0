//! The four pipeline stages and their shared report plumbing.
//!
//! Each stage writes exactly one report into the stage-reports directory,
//! write-once, before the next stage starts.

pub mod collector;
pub mod commissioner;
pub mod inspector;
pub mod judge;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use replay_kernel::evidence::TriState;

use crate::evidence_io::{write_json_once, EvidenceError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageName {
    Collector,
    Inspector,
    Commissioner,
    Judge,
}

impl StageName {
    /// Execution order.
    pub const ALL: [Self; 4] = [Self::Collector, Self::Inspector, Self::Commissioner, Self::Judge];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Collector => "collector",
            Self::Inspector => "inspector",
            Self::Commissioner => "commissioner",
            Self::Judge => "judge",
        }
    }

    #[must_use]
    pub const fn report_filename(self) -> &'static str {
        match self {
            Self::Collector => "01_collector_report.json",
            Self::Inspector => "02_inspector_report.json",
            Self::Commissioner => "03_commissioner_report.json",
            Self::Judge => "04_judge_report.json",
        }
    }
}

impl std::fmt::Display for StageName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stage outcome as recorded in its report. `Skipped` is judge-only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StageStatus {
    Pass,
    Fail,
    Unknown,
    Skipped,
}

impl StageStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pass => "PASS",
            Self::Fail => "FAIL",
            Self::Unknown => "UNKNOWN",
            Self::Skipped => "SKIPPED",
        }
    }
}

impl From<TriState> for StageStatus {
    fn from(t: TriState) -> Self {
        match t {
            TriState::Pass => Self::Pass,
            TriState::Fail => Self::Fail,
            TriState::Unknown => Self::Unknown,
        }
    }
}

impl std::fmt::Display for StageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persist `report` as the stage's report file. Returns the written path.
///
/// # Errors
///
/// Fails if the directory cannot be created, the file cannot be written, or a
/// report for this stage already exists.
pub fn write_stage_report<T: Serialize>(
    reports_dir: &Path,
    stage: StageName,
    report: &T,
) -> Result<PathBuf, EvidenceError> {
    let path = reports_dir.join(stage.report_filename());
    write_json_once(&path, report)?;
    Ok(path)
}
