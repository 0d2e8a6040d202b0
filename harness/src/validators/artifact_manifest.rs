//! Artifact manifest digest check.

use std::path::Path;

use replay_kernel::commissioner::CommissionerField;

use super::{load_ledger, CheckResult, LedgerInput, LedgerValidator, NOT_IMPLEMENTED};

/// Verifies every manifest entry's declared digest against the artifact bytes.
///
/// Currently parses the manifest and returns `UNKNOWN` / `not_implemented`.
/// The finished check reports `FAIL` with the ids of all mismatching
/// artifacts.
#[derive(Debug, Clone, Copy, Default)]
pub struct ArtifactManifestValidator;

impl LedgerValidator for ArtifactManifestValidator {
    fn name(&self) -> &str {
        "artifacts"
    }

    fn field(&self) -> CommissionerField {
        CommissionerField::ArtifactHashesValid
    }

    fn requires(&self) -> &[LedgerInput] {
        &[LedgerInput::ArtifactsManifestPath]
    }

    fn validate(&self, inputs: &[&Path]) -> CheckResult {
        let Some(manifest) = inputs.first() else {
            return CheckResult::unknown("artifacts manifest path not supplied");
        };
        match load_ledger(manifest) {
            Ok(_) => CheckResult::unknown(NOT_IMPLEMENTED),
            Err(unreadable) => unreadable,
        }
    }
}
