//! Commissioner stage: applies the strict gate to the inspector's evidence.

use serde::Serialize;

use replay_kernel::commissioner::{decide, CommissionerInputs, Decision, DenialReason};

use crate::contract::CommissionerRequirements;

use super::inspector::InspectorReport;
use super::{StageName, StageStatus};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommissionerReport {
    pub stage: StageName,
    pub status: StageStatus,
    pub timestamp_utc: String,
    pub decision: Decision,
    pub denial_reasons: Vec<DenialReason>,
    pub inputs: CommissionerInputs,
    pub must_have: Vec<String>,
    pub deny_if_missing_inputs: bool,
    pub policy_references: Vec<String>,
}

impl CommissionerReport {
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        self.decision == Decision::Allow
    }
}

/// Status is PASS on ALLOW, FAIL on DENY.
#[must_use]
pub fn adjudicate(
    inspector: &InspectorReport,
    requirements: &CommissionerRequirements,
    timestamp_utc: String,
) -> CommissionerReport {
    let inputs = inspector.commissioner_inputs();
    let policy = requirements.to_policy();
    let result = decide(&inputs, &policy);
    let status = if result.is_allowed() {
        StageStatus::Pass
    } else {
        StageStatus::Fail
    };

    CommissionerReport {
        stage: StageName::Commissioner,
        status,
        timestamp_utc,
        decision: result.decision,
        denial_reasons: result.denial_reasons,
        inputs,
        must_have: policy.must_have,
        deny_if_missing_inputs: policy.deny_if_missing_inputs,
        policy_references: Vec::new(),
    }
}
