//! Judge: Canonical Semantic Model (CSM) construction and semantic diff.
//!
//! ```text
//! raw record ──canonicalize──▶ CSM v1 { meta, execution }
//! decision + execution ledgers ──canonicalize_v2──▶ CSM v2 { meta, intent_layer, outcome_layer, policy_layer? }
//! (CSM | raw) × (CSM | raw) ──semantic_diff──▶ DiffResult
//! ```

pub mod canonicalize;
pub mod diff;

/// Schema tag of a single-block CSM.
pub const CSM_SCHEMA_V1: &str = "rgpt.csm.v1";

/// Schema tag of a CSM with separate intent/outcome/policy layers.
pub const CSM_SCHEMA_V2: &str = "rgpt.csm.v2";

/// `meta` key of the v1 execution-block fingerprint.
pub const FP_EXECUTION: &str = "execution_fingerprint_sha256";

/// `meta` key of the v2 whole-model fingerprint.
pub const FP_CSM: &str = "csm_fingerprint_sha256";

/// `meta` key of the v2 intent-layer fingerprint.
pub const FP_INTENT: &str = "intent_fingerprint_sha256";

/// `meta` key of the v2 outcome-layer fingerprint.
pub const FP_OUTCOME: &str = "outcome_fingerprint_sha256";

/// `meta` key of the v2 policy-layer fingerprint.
pub const FP_POLICY: &str = "policy_fingerprint_sha256";
