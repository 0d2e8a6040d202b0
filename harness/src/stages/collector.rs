//! Collector: records which declared inputs exist. Never opens file contents.

use serde::Serialize;

use crate::contract::ReplayPaths;
use crate::validators::LedgerInput;

use super::{StageName, StageStatus};

pub const COLLECTOR_NOTES: &str = "best_effort stage (collect what exists; report missing)";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CollectorReport {
    pub stage: StageName,
    pub status: StageStatus,
    pub timestamp_utc: String,
    pub inputs_found: Vec<LedgerInput>,
    pub missing_inputs: Vec<LedgerInput>,
    pub notes: &'static str,
}

impl CollectorReport {
    #[must_use]
    pub fn is_found(&self, input: LedgerInput) -> bool {
        self.inputs_found.contains(&input)
    }
}

/// An input is found iff it was declared and its path exists.
/// Status is FAIL iff anything is missing.
#[must_use]
pub fn collect(paths: &ReplayPaths, timestamp_utc: String) -> CollectorReport {
    let (inputs_found, missing_inputs): (Vec<LedgerInput>, Vec<LedgerInput>) = LedgerInput::ALL
        .into_iter()
        .partition(|input| input.resolve(paths).is_some_and(std::path::Path::exists));

    let status = if missing_inputs.is_empty() {
        StageStatus::Pass
    } else {
        StageStatus::Fail
    };

    CollectorReport {
        stage: StageName::Collector,
        status,
        timestamp_utc,
        inputs_found,
        missing_inputs,
        notes: COLLECTOR_NOTES,
    }
}
