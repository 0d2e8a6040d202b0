//! Ledger validators: pluggable checks feeding the commissioner's evidence
//! fields.
//!
//! A validator declares which ledger inputs it needs and which commissioner
//! field its result populates. The inspector only runs a validator whose
//! inputs were all found by the collector, and runs it through
//! [`run_isolated`] so a panic inside a check becomes an UNKNOWN result.

mod artifact_manifest;
mod hash_chain;
mod schema_compat;

pub use artifact_manifest::ArtifactManifestValidator;
pub use hash_chain::HashChainValidator;
pub use schema_compat::SchemaCompatValidator;

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;

use serde::Serialize;
use serde_json::Value;

use replay_kernel::commissioner::CommissionerField;
use replay_kernel::evidence::TriState;

use crate::contract::ReplayPaths;
use crate::evidence_io::read_json;

/// Error string returned by checks whose verification logic is not wired in.
pub const NOT_IMPLEMENTED: &str = "not_implemented";

/// The declared ledger inputs a validator may require.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerInput {
    ExecutionLedgerPath,
    DecisionLedgerPath,
    ArtifactsManifestPath,
}

impl LedgerInput {
    pub const ALL: [Self; 3] = [
        Self::ExecutionLedgerPath,
        Self::DecisionLedgerPath,
        Self::ArtifactsManifestPath,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ExecutionLedgerPath => "execution_ledger_path",
            Self::DecisionLedgerPath => "decision_ledger_path",
            Self::ArtifactsManifestPath => "artifacts_manifest_path",
        }
    }

    #[must_use]
    pub fn resolve(self, paths: &ReplayPaths) -> Option<&Path> {
        match self {
            Self::ExecutionLedgerPath => paths.execution_ledger.as_deref(),
            Self::DecisionLedgerPath => paths.decision_ledger.as_deref(),
            Self::ArtifactsManifestPath => paths.artifacts_manifest.as_deref(),
        }
    }
}

/// Tri-state outcome plus the errors that explain it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckResult {
    pub status: TriState,
    pub errors: Vec<String>,
}

impl CheckResult {
    #[must_use]
    pub fn pass() -> Self {
        Self {
            status: TriState::Pass,
            errors: Vec::new(),
        }
    }

    #[must_use]
    pub fn fail(errors: Vec<String>) -> Self {
        Self {
            status: TriState::Fail,
            errors,
        }
    }

    #[must_use]
    pub fn unknown(error: impl Into<String>) -> Self {
        Self {
            status: TriState::Unknown,
            errors: vec![error.into()],
        }
    }
}

/// A single ledger check.
///
/// `validate` receives the resolved paths of [`LedgerValidator::requires`],
/// in the same order, and must report every failure through its
/// [`CheckResult`] rather than by panicking.
pub trait LedgerValidator: Send + Sync {
    /// Short name used to namespace error strings (`<name>:<error>`).
    fn name(&self) -> &str;

    /// Commissioner field populated by this check.
    fn field(&self) -> CommissionerField;

    fn requires(&self) -> &[LedgerInput];

    fn validate(&self, inputs: &[&Path]) -> CheckResult;
}

/// Ordered collection of validators run by the inspector.
pub struct ValidatorSet {
    validators: Vec<Box<dyn LedgerValidator>>,
}

impl ValidatorSet {
    #[must_use]
    pub fn new(validators: Vec<Box<dyn LedgerValidator>>) -> Self {
        Self { validators }
    }

    #[must_use]
    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    pub fn push(&mut self, validator: Box<dyn LedgerValidator>) {
        self.validators.push(validator);
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn LedgerValidator> {
        self.validators.iter().map(AsRef::as_ref)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.validators.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }
}

impl Default for ValidatorSet {
    /// Hash-chain, artifact-manifest and schema-compatibility checks.
    fn default() -> Self {
        Self::new(vec![
            Box::new(HashChainValidator),
            Box::new(ArtifactManifestValidator),
            Box::new(SchemaCompatValidator),
        ])
    }
}

impl std::fmt::Debug for ValidatorSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.iter().map(|v| v.name())).finish()
    }
}

/// Run `validator`, converting a panic into `UNKNOWN` with `panic:<message>`.
#[must_use]
pub fn run_isolated(validator: &dyn LedgerValidator, inputs: &[&Path]) -> CheckResult {
    match catch_unwind(AssertUnwindSafe(|| validator.validate(inputs))) {
        Ok(result) => result,
        Err(payload) => CheckResult::unknown(format!("panic:{}", panic_message(&*payload))),
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Read and parse one ledger, mapping failure to an UNKNOWN result.
pub(crate) fn load_ledger(path: &Path) -> Result<Value, CheckResult> {
    read_json(path).map_err(|e| CheckResult::unknown(e.to_string()))
}
