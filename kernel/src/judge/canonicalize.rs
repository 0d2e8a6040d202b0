//! Canonicalization: raw execution record → Canonical Semantic Model.
//!
//! The cleaning pass removes data that legitimately differs between two
//! runs of the same execution (timestamps, ids, nonces, telemetry) and fixes
//! ordering so logically-equivalent records compare equal:
//!
//! 1. Keys in the volatile-key set are dropped wherever they appear.
//! 2. Any value whose path contains a volatile snippet is dropped. Paths
//!    are built as `$.key.child[3].leaf`, so `.metrics.` matches everything
//!    *below* a `metrics` key.
//! 3. `null` values are dropped (they carry no semantic content).
//! 4. List elements are sorted by their canonical JSON encoding.
//!
//! The pass is a fixed point: cleaning an already-clean tree returns it
//! unchanged.

use std::collections::BTreeSet;

use serde_json::{Map, Value};

use super::{CSM_SCHEMA_V1, CSM_SCHEMA_V2, FP_CSM, FP_EXECUTION, FP_INTENT, FP_OUTCOME, FP_POLICY};
use crate::proof::canon::canonical_json_string;
use crate::proof::hash::fingerprint;

/// Keys stripped by default: wall-clock stamps, per-run identifiers, randomness.
pub const DEFAULT_VOLATILE_KEYS: [&str; 13] = [
    "correlation_id",
    "created_at",
    "execution_id",
    "nonce",
    "request_id",
    "run_id",
    "seed",
    "span_id",
    "time",
    "timestamp",
    "trace_id",
    "ts",
    "updated_at",
];

/// Path snippets whose subtrees are stripped by default.
pub const DEFAULT_VOLATILE_PATH_SNIPPETS: [&str; 4] =
    [".timestamps.", ".metrics.", ".telemetry.", ".debug."];

/// Knobs for the cleaning pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalizeOptions {
    pub drop_volatile_keys: bool,
    pub volatile_keys: BTreeSet<String>,
    pub volatile_path_snippets: Vec<String>,
    /// Sort list elements by canonical encoding (order-independent compare).
    pub sort_lists: bool,
    /// Attach SHA-256 fingerprints to the model's `meta` block.
    pub hash_blocks: bool,
}

impl Default for CanonicalizeOptions {
    fn default() -> Self {
        Self {
            drop_volatile_keys: true,
            volatile_keys: DEFAULT_VOLATILE_KEYS.iter().map(|k| (*k).to_string()).collect(),
            volatile_path_snippets: DEFAULT_VOLATILE_PATH_SNIPPETS
                .iter()
                .map(|s| (*s).to_string())
                .collect(),
            sort_lists: true,
            hash_blocks: true,
        }
    }
}

/// Run the cleaning pass over `value`.
///
/// A root that cleans away entirely (e.g. `null`) becomes `{}`.
#[must_use]
pub fn clean(value: &Value, options: &CanonicalizeOptions) -> Value {
    clean_at(value, "$", options).unwrap_or_else(|| Value::Object(Map::new()))
}

/// Build a v1 CSM: `{ "meta": { "schema", "execution_fingerprint_sha256" }, "execution": .. }`.
#[must_use]
pub fn canonicalize(raw: &Value, options: &CanonicalizeOptions) -> Value {
    let execution = clean(raw, options);

    let mut meta = Map::new();
    meta.insert("schema".into(), Value::from(CSM_SCHEMA_V1));
    if options.hash_blocks {
        meta.insert(FP_EXECUTION.into(), Value::from(fingerprint(&execution)));
    }

    let mut csm = Map::new();
    csm.insert("meta".into(), Value::Object(meta));
    csm.insert("execution".into(), execution);
    Value::Object(csm)
}

/// Build a v2 CSM with separately fingerprinted layers.
///
/// - `intent_layer`: the cleaned decision ledger
/// - `outcome_layer`: the cleaned execution ledger
/// - `policy_layer`: inspector/commissioner findings, cleaned the same way
///
/// The whole-model fingerprint covers all present layers.
#[must_use]
pub fn canonicalize_v2(
    intent: &Value,
    outcome: &Value,
    policy: Option<&Value>,
    options: &CanonicalizeOptions,
) -> Value {
    let intent_layer = clean(intent, options);
    let outcome_layer = clean(outcome, options);
    let policy_layer = policy.map(|p| clean(p, options));

    let mut layers = Map::new();
    layers.insert("intent_layer".into(), intent_layer);
    layers.insert("outcome_layer".into(), outcome_layer);
    if let Some(p) = policy_layer {
        layers.insert("policy_layer".into(), p);
    }

    let mut meta = Map::new();
    meta.insert("schema".into(), Value::from(CSM_SCHEMA_V2));
    if options.hash_blocks {
        meta.insert(FP_INTENT.into(), Value::from(fingerprint(&layers["intent_layer"])));
        meta.insert(FP_OUTCOME.into(), Value::from(fingerprint(&layers["outcome_layer"])));
        if let Some(p) = layers.get("policy_layer") {
            meta.insert(FP_POLICY.into(), Value::from(fingerprint(p)));
        }
        let whole = Value::Object(layers.clone());
        meta.insert(FP_CSM.into(), Value::from(fingerprint(&whole)));
    }

    layers.insert("meta".into(), Value::Object(meta));
    Value::Object(layers)
}

fn is_volatile_path(path: &str, snippets: &[String]) -> bool {
    snippets.iter().any(|s| path.contains(s.as_str()))
}

/// `None` means "removed".
fn clean_at(value: &Value, path: &str, options: &CanonicalizeOptions) -> Option<Value> {
    if is_volatile_path(path, &options.volatile_path_snippets) {
        return None;
    }

    match value {
        Value::Null => None,
        Value::Object(map) => {
            let mut out = Map::new();
            for (key, child) in map {
                if options.drop_volatile_keys && options.volatile_keys.contains(key) {
                    continue;
                }
                if let Some(v) = clean_at(child, &format!("{path}.{key}"), options) {
                    out.insert(key.clone(), v);
                }
            }
            Some(Value::Object(out))
        }
        Value::Array(items) => {
            let mut cleaned: Vec<Value> = items
                .iter()
                .enumerate()
                .filter_map(|(i, item)| clean_at(item, &format!("{path}[{i}]"), options))
                .collect();
            if options.sort_lists {
                cleaned.sort_by_cached_key(canonical_json_string);
            }
            Some(Value::Array(cleaned))
        }
        other => Some(other.clone()),
    }
}
