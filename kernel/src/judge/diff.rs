//! Semantic diff: classify drift between two execution records.
//!
//! Comparison proceeds in ordered layers and stops at the strongest signal:
//!
//! 1. Both sides carry a top-level fingerprint and they match ⇒ equivalent, 1.0.
//! 2. Both sides are v2 and intent + outcome fingerprints match ⇒ equivalent, 1.0.
//! 3. Layered comparison of the record body:
//!    - declared schema version mismatch ⇒ `STRUCTURAL_DRIFT`
//!    - `events` length mismatch ⇒ `OUTCOME_DRIFT`, critical
//!    - top-level key asymmetry ⇒ `STRUCTURAL_DRIFT`
//!    - (v2) intent fingerprint mismatch ⇒ `PARAM_DRIFT`
//!    - (v2) policy fingerprint mismatch ⇒ `POLICY_DRIFT`
//!
//! Confidence is a fixed scalar per branch, not a computed probability: the
//! layers are discrete evidence.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{CSM_SCHEMA_V2, FP_CSM, FP_EXECUTION, FP_INTENT, FP_OUTCOME, FP_POLICY};

/// Fingerprint match (layer 1 or 2).
pub const CONFIDENCE_FINGERPRINT_MATCH: f64 = 1.0;
/// Layered comparison found no drift.
pub const CONFIDENCE_LAYERED_CLEAN: f64 = 0.90;
/// Layered comparison found drift; both sides were fingerprinted.
pub const CONFIDENCE_LAYERED_DRIFT: f64 = 0.65;
/// Layered comparison found drift with no fingerprints to anchor it.
pub const CONFIDENCE_NO_FINGERPRINT: f64 = 0.55;

/// Fixed drift taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DriftClass {
    StructuralDrift,
    ParamDrift,
    PolicyDrift,
    SideEffectDrift,
    OutcomeDrift,
    SecurityDrift,
    NonDeterministic,
    CriticalDivergence,
}

impl DriftClass {
    pub const ALL: [Self; 8] = [
        Self::StructuralDrift,
        Self::ParamDrift,
        Self::PolicyDrift,
        Self::SideEffectDrift,
        Self::OutcomeDrift,
        Self::SecurityDrift,
        Self::NonDeterministic,
        Self::CriticalDivergence,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::StructuralDrift => "STRUCTURAL_DRIFT",
            Self::ParamDrift => "PARAM_DRIFT",
            Self::PolicyDrift => "POLICY_DRIFT",
            Self::SideEffectDrift => "SIDE_EFFECT_DRIFT",
            Self::OutcomeDrift => "OUTCOME_DRIFT",
            Self::SecurityDrift => "SECURITY_DRIFT",
            Self::NonDeterministic => "NON_DETERMINISTIC",
            Self::CriticalDivergence => "CRITICAL_DIVERGENCE",
        }
    }
}

/// Outcome of [`semantic_diff`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiffResult {
    pub equivalent: bool,
    pub confidence: f64,
    pub drift_classes: BTreeSet<DriftClass>,
    pub critical: bool,
    pub summary: String,
    pub details: Map<String, Value>,
}

impl DiffResult {
    fn matched(summary: &str, details: Map<String, Value>) -> Self {
        Self {
            equivalent: true,
            confidence: CONFIDENCE_FINGERPRINT_MATCH,
            drift_classes: BTreeSet::new(),
            critical: false,
            summary: summary.to_string(),
            details,
        }
    }
}

/// Compare two records (CSM v1, CSM v2, or raw).
#[must_use]
pub fn semantic_diff(a: &Value, b: &Value) -> DiffResult {
    let fp_a = top_fingerprint(a);
    let fp_b = top_fingerprint(b);

    if let (Some(fa), Some(fb)) = (fp_a, fp_b) {
        if fa == fb {
            let mut details = Map::new();
            details.insert("layer".into(), Value::from("fingerprint"));
            details.insert("fingerprint_a".into(), Value::from(fa));
            details.insert("fingerprint_b".into(), Value::from(fb));
            return DiffResult::matched("Fingerprint match.", details);
        }
    }

    if is_v2(a) && is_v2(b) {
        let intents = (meta_str(a, FP_INTENT), meta_str(b, FP_INTENT));
        let outcomes = (meta_str(a, FP_OUTCOME), meta_str(b, FP_OUTCOME));
        if let ((Some(ia), Some(ib)), (Some(oa), Some(ob))) = (intents, outcomes) {
            if ia == ib && oa == ob {
                let mut details = Map::new();
                details.insert("layer".into(), Value::from("intent_outcome"));
                details.insert("intent_fingerprint".into(), Value::from(ia));
                details.insert("outcome_fingerprint".into(), Value::from(oa));
                return DiffResult::matched("Intent and outcome fingerprints match.", details);
            }
        }
    }

    layered_compare(a, b, fp_a.is_some() && fp_b.is_some())
}

fn layered_compare(a: &Value, b: &Value, fingerprinted: bool) -> DiffResult {
    let mut drift = BTreeSet::new();
    let mut critical = false;
    let mut details = Map::new();
    details.insert("layer".into(), Value::from("layered"));
    details.insert("has_fingerprint".into(), Value::from(fingerprinted));
    if let (Some(fa), Some(fb)) = (top_fingerprint(a), top_fingerprint(b)) {
        details.insert("fingerprint_a".into(), Value::from(fa));
        details.insert("fingerprint_b".into(), Value::from(fb));
    }

    let body_a = body(a);
    let body_b = body(b);

    let schema_a = schema_version(a, body_a);
    let schema_b = schema_version(b, body_b);
    if schema_a != schema_b {
        drift.insert(DriftClass::StructuralDrift);
        details.insert("schema_version_a".into(), schema_a.cloned().unwrap_or(Value::Null));
        details.insert("schema_version_b".into(), schema_b.cloned().unwrap_or(Value::Null));
    }

    if let (Some(ea), Some(eb)) = (event_count(body_a), event_count(body_b)) {
        details.insert("event_count_a".into(), Value::from(ea));
        details.insert("event_count_b".into(), Value::from(eb));
        if ea != eb {
            drift.insert(DriftClass::OutcomeDrift);
            critical = true;
        }
    }

    match (body_a.as_object(), body_b.as_object()) {
        (Some(ma), Some(mb)) => {
            let keys_a: BTreeSet<&String> = ma.keys().collect();
            let keys_b: BTreeSet<&String> = mb.keys().collect();
            let only_a: Vec<Value> = keys_a.difference(&keys_b).map(|k| Value::from(k.as_str())).collect();
            let only_b: Vec<Value> = keys_b.difference(&keys_a).map(|k| Value::from(k.as_str())).collect();
            if !only_a.is_empty() || !only_b.is_empty() {
                drift.insert(DriftClass::StructuralDrift);
                details.insert("keys_only_in_a".into(), Value::Array(only_a));
                details.insert("keys_only_in_b".into(), Value::Array(only_b));
            }
        }
        (None, None) => {}
        _ => {
            drift.insert(DriftClass::StructuralDrift);
            details.insert("body_shape_mismatch".into(), Value::Bool(true));
        }
    }

    if is_v2(a) && is_v2(b) {
        if let (Some(ia), Some(ib)) = (meta_str(a, FP_INTENT), meta_str(b, FP_INTENT)) {
            if ia != ib {
                drift.insert(DriftClass::ParamDrift);
                details.insert("intent_fingerprint_a".into(), Value::from(ia));
                details.insert("intent_fingerprint_b".into(), Value::from(ib));
            }
        }
        if let (Some(pa), Some(pb)) = (meta_str(a, FP_POLICY), meta_str(b, FP_POLICY)) {
            if pa != pb {
                drift.insert(DriftClass::PolicyDrift);
                details.insert("policy_fingerprint_a".into(), Value::from(pa));
                details.insert("policy_fingerprint_b".into(), Value::from(pb));
            }
        }
    }

    let equivalent = drift.is_empty();
    let confidence = if equivalent {
        CONFIDENCE_LAYERED_CLEAN
    } else if fingerprinted {
        CONFIDENCE_LAYERED_DRIFT
    } else {
        CONFIDENCE_NO_FINGERPRINT
    };
    let summary = if equivalent {
        "Layered compare found no drift.".to_string()
    } else {
        let names: Vec<&str> = drift.iter().map(|d| d.as_str()).collect();
        format!("Layered compare found drift: {}.", names.join(", "))
    };

    DiffResult {
        equivalent,
        confidence,
        drift_classes: drift,
        critical,
        summary,
        details,
    }
}

/// Non-empty, trimmed string at `meta.<key>`.
fn meta_str<'a>(doc: &'a Value, key: &str) -> Option<&'a str> {
    doc.get("meta")?
        .get(key)?
        .as_str()
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn top_fingerprint(doc: &Value) -> Option<&str> {
    meta_str(doc, FP_EXECUTION).or_else(|| meta_str(doc, FP_CSM))
}

fn is_v2(doc: &Value) -> bool {
    meta_str(doc, "schema") == Some(CSM_SCHEMA_V2)
        || (doc.get("intent_layer").is_some() && doc.get("outcome_layer").is_some())
}

/// The part of a record the layered compare reads.
fn body(doc: &Value) -> &Value {
    if is_v2(doc) {
        if let Some(outcome) = doc.get("outcome_layer") {
            return outcome;
        }
    }
    if doc.get("meta").is_some() {
        if let Some(execution) = doc.get("execution") {
            return execution;
        }
    }
    doc
}

fn schema_version<'a>(doc: &'a Value, body: &'a Value) -> Option<&'a Value> {
    body.get("schema_version")
        .or_else(|| doc.get("schema_version"))
        .or_else(|| doc.get("meta").and_then(|m| m.get("schema")))
}

fn event_count(body: &Value) -> Option<usize> {
    body.get("events")?.as_array().map(Vec::len)
}
