//! Execution-ledger hash chain check.

use std::path::Path;

use replay_kernel::commissioner::CommissionerField;

use super::{load_ledger, CheckResult, LedgerInput, LedgerValidator, NOT_IMPLEMENTED};

/// Verifies the per-record chained hash across the execution ledger.
///
/// Chain recomputation is not wired in yet: a readable ledger yields
/// `UNKNOWN` / `not_implemented`, an unreadable one `UNKNOWN` with the read
/// error. Once implemented, a broken link must report `FAIL` naming the first
/// broken record index, and a verified chain `PASS`.
#[derive(Debug, Clone, Copy, Default)]
pub struct HashChainValidator;

impl LedgerValidator for HashChainValidator {
    fn name(&self) -> &str {
        "hash_chain"
    }

    fn field(&self) -> CommissionerField {
        CommissionerField::LedgerHashChainValid
    }

    fn requires(&self) -> &[LedgerInput] {
        &[LedgerInput::ExecutionLedgerPath]
    }

    fn validate(&self, inputs: &[&Path]) -> CheckResult {
        let Some(ledger) = inputs.first() else {
            return CheckResult::unknown("execution ledger path not supplied");
        };
        if let Err(unreadable) = load_ledger(ledger) {
            return unreadable;
        }
        CheckResult::unknown(NOT_IMPLEMENTED)
    }
}
