//! Ledger schema version compatibility check.

use std::path::Path;

use replay_kernel::commissioner::CommissionerField;
use replay_kernel::evidence::TriState;

use super::{load_ledger, CheckResult, LedgerInput, LedgerValidator, NOT_IMPLEMENTED};

/// Compares the schema version embedded in both ledgers against the
/// supported set. Returns `UNKNOWN` / `not_implemented` until the supported
/// set is defined; `FAIL` on incompatibility once it is.
#[derive(Debug, Clone, Copy, Default)]
pub struct SchemaCompatValidator;

impl LedgerValidator for SchemaCompatValidator {
    fn name(&self) -> &str {
        "schema"
    }

    fn field(&self) -> CommissionerField {
        CommissionerField::SchemaVersionsCompatible
    }

    fn requires(&self) -> &[LedgerInput] {
        &[LedgerInput::ExecutionLedgerPath, LedgerInput::DecisionLedgerPath]
    }

    fn validate(&self, inputs: &[&Path]) -> CheckResult {
        if inputs.len() < 2 {
            return CheckResult::unknown("execution and decision ledger paths required");
        }
        let errors: Vec<String> = inputs
            .iter()
            .filter_map(|p| load_ledger(p).err())
            .flat_map(|r| r.errors)
            .collect();
        if errors.is_empty() {
            CheckResult::unknown(NOT_IMPLEMENTED)
        } else {
            CheckResult {
                status: TriState::Unknown,
                errors,
            }
        }
    }
}
