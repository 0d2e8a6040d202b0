//! Inspector: runs the validators unblocked by the collector and aggregates
//! their tri-states.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Serialize;
use tracing::debug;

use replay_kernel::commissioner::{CommissionerField, CommissionerInputs};
use replay_kernel::evidence::TriState;

use crate::contract::ReplayPaths;
use crate::validators::{run_isolated, LedgerInput, ValidatorSet};

use super::collector::CollectorReport;
use super::{StageName, StageStatus};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InspectorReport {
    pub stage: StageName,
    pub status: StageStatus,
    pub timestamp_utc: String,
    /// One entry per field populated by some validator.
    pub checks: BTreeMap<CommissionerField, TriState>,
    /// Validator errors, each prefixed `<validator>:`.
    pub errors: Vec<String>,
    /// Validators not run because an input was missing.
    pub skipped_validators: Vec<String>,
}

impl InspectorReport {
    /// Commissioner evidence. Fields no validator covers stay UNKNOWN.
    #[must_use]
    pub fn commissioner_inputs(&self) -> CommissionerInputs {
        let mut inputs = CommissionerInputs::default();
        for (field, status) in &self.checks {
            inputs.set(*field, *status);
        }
        inputs
    }
}

/// Run every validator whose required inputs the collector found.
///
/// A blocked validator records UNKNOWN for its field plus one
/// `<validator>:missing_input:<input>` error per missing input. Two
/// validators on the same field combine by worst result. Overall status is
/// the aggregate of all checks (UNKNOWN when there are none).
#[must_use]
pub fn inspect(
    paths: &ReplayPaths,
    collector: &CollectorReport,
    validators: &ValidatorSet,
    timestamp_utc: String,
) -> InspectorReport {
    let mut checks: BTreeMap<CommissionerField, TriState> = BTreeMap::new();
    let mut errors = Vec::new();
    let mut skipped_validators = Vec::new();

    for validator in validators.iter() {
        let name = validator.name();
        let required = validator.requires();
        let missing: Vec<LedgerInput> = required
            .iter()
            .copied()
            .filter(|input| !collector.is_found(*input))
            .collect();

        let result_status = if missing.is_empty() {
            let inputs: Vec<&Path> = required
                .iter()
                .filter_map(|input| input.resolve(paths))
                .collect();
            let result = run_isolated(validator, &inputs);
            debug!(validator = name, status = %result.status, "validator finished");
            errors.extend(result.errors.iter().map(|e| format!("{name}:{e}")));
            result.status
        } else {
            debug!(validator = name, "validator skipped: missing input");
            skipped_validators.push(name.to_string());
            errors.extend(
                missing
                    .iter()
                    .map(|input| format!("{name}:missing_input:{}", input.as_str())),
            );
            TriState::Unknown
        };

        checks
            .entry(validator.field())
            .and_modify(|s| *s = s.worst(result_status))
            .or_insert(result_status);
    }

    let status: StageStatus = TriState::aggregate(checks.values().copied()).into();

    InspectorReport {
        stage: StageName::Inspector,
        status,
        timestamp_utc,
        checks,
        errors,
        skipped_validators,
    }
}
