//! Passport verification: cross-checks a capability definition, the
//! namespace registry and the passport register.
//!
//! # Store layout
//!
//! ```text
//! <cats_root>/
//!   definitions/<cat_id>.json   capability definition
//!   registry_index.json         {"namespaces": {<canonical_name>: {cat_id, status, passport_id, passport_required}}}
//!   passport_register.json      {"passports": [{passport_id, cat_id, canonical_name, status, expires_at_utc, bundle_digest}]}
//! ```
//!
//! Every check runs even after a failure so the internal view carries the
//! full trail; the first failure is the public denial code. Any failure
//! collapses the allowed side effects to `read_only`.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

use replay_kernel::proof::hash::{normalized_sha256_hex, ContentHash};

use crate::evidence_io::{read_json, EvidenceError};

pub const READ_ONLY: &str = "read_only";

const DEFINITIONS_DIR: &str = "definitions";
const REGISTRY_FILE: &str = "registry_index.json";
const REGISTER_FILE: &str = "passport_register.json";

#[derive(Debug, thiserror::Error)]
pub enum CatsLoadError {
    #[error("invalid cat id {0:?}")]
    InvalidCatId(String),

    #[error("not found: {0}")]
    NotFound(PathBuf),

    #[error(transparent)]
    Evidence(#[from] EvidenceError),

    #[error("{path}: {detail}")]
    Shape { path: PathBuf, detail: String },
}

/// Read-only view of a capability store. Nothing is cached between calls.
#[derive(Debug, Clone)]
pub struct CatsStore {
    root: PathBuf,
}

impl CatsStore {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// # Errors
    ///
    /// [`CatsLoadError::InvalidCatId`] before touching the filesystem if the
    /// id is empty or could escape the definitions directory.
    pub fn load_definition(&self, cat_id: &str) -> Result<Map<String, Value>, CatsLoadError> {
        if !is_valid_cat_id(cat_id) {
            return Err(CatsLoadError::InvalidCatId(cat_id.to_string()));
        }
        let path = self.root.join(DEFINITIONS_DIR).join(format!("{cat_id}.json"));
        load_object(&path)
    }

    /// The `namespaces` map of the registry index.
    ///
    /// # Errors
    ///
    /// Fails if the index is missing, unreadable, or has no `namespaces` object.
    pub fn load_namespaces(&self) -> Result<Map<String, Value>, CatsLoadError> {
        let path = self.root.join(REGISTRY_FILE);
        let mut index = load_object(&path)?;
        match index.remove("namespaces") {
            Some(Value::Object(ns)) => Ok(ns),
            _ => Err(CatsLoadError::Shape {
                path,
                detail: "missing \"namespaces\" object".into(),
            }),
        }
    }

    /// The `passports` list of the register.
    ///
    /// # Errors
    ///
    /// Fails if the register is missing, unreadable, or has no `passports` list.
    pub fn load_passports(&self) -> Result<Vec<Value>, CatsLoadError> {
        let path = self.root.join(REGISTER_FILE);
        let mut register = load_object(&path)?;
        match register.remove("passports") {
            Some(Value::Array(list)) => Ok(list),
            _ => Err(CatsLoadError::Shape {
                path,
                detail: "missing \"passports\" list".into(),
            }),
        }
    }
}

fn load_object(path: &Path) -> Result<Map<String, Value>, CatsLoadError> {
    if !path.exists() {
        return Err(CatsLoadError::NotFound(path.to_path_buf()));
    }
    match read_json(path)? {
        Value::Object(map) => Ok(map),
        _ => Err(CatsLoadError::Shape {
            path: path.to_path_buf(),
            detail: "expected a JSON object".into(),
        }),
    }
}

#[must_use]
pub fn is_valid_cat_id(cat_id: &str) -> bool {
    !cat_id.trim().is_empty()
        && !cat_id.contains("..")
        && !cat_id.contains('/')
        && !cat_id.contains('\\')
}

// ---------------------------------------------------------------------------
// Verification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PassportFailure {
    CatIdInvalid,
    DefinitionNotFound,
    DefinitionInvalid,
    DefinitionCatIdMismatch,
    RegistryUnavailable,
    NamespaceNotFound,
    RegistryCatIdMismatch,
    PassportIdMissing,
    PassportIdMismatch,
    PassportNotFound,
    CanonicalNameMismatch,
    PassportCatIdMismatch,
    Revoked,
    Suspended,
    StatusInvalid,
    ExpiryInvalid,
    Expired,
    DigestMismatch,
}

/// One failed check, with whatever both sides said.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureNote {
    pub code: PassportFailure,
    pub detail: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublicView {
    pub cat_id: String,
    pub canonical_name: Option<String>,
    pub verified: bool,
    pub passport_required: bool,
    pub denial_code: Option<PassportFailure>,
    pub allowed_side_effects: Vec<String>,
    pub checked_at_utc: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InternalView {
    pub failures: Vec<FailureNote>,
    pub notes: Vec<String>,
    pub definition_digest: Option<String>,
    pub passport_id: Option<String>,
    pub passport_bundle_digest: Option<String>,
    pub passport_expires_at_utc: Option<String>,
    pub payload_digest: Option<String>,
    pub declared_side_effects: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerificationArtifact {
    pub public: PublicView,
    pub internal: InternalView,
}

impl VerificationArtifact {
    #[must_use]
    pub fn is_verified(&self) -> bool {
        self.public.verified
    }
}

/// Accumulates failures in evaluation order.
#[derive(Default)]
struct Trail {
    failures: Vec<FailureNote>,
    notes: Vec<String>,
}

impl Trail {
    fn fail(&mut self, code: PassportFailure, detail: impl Into<String>) {
        let detail = detail.into();
        self.notes.push(format!("{}: {detail}", as_code(code)));
        self.failures.push(FailureNote { code, detail });
    }

    fn note(&mut self, text: impl Into<String>) {
        self.notes.push(text.into());
    }
}

fn as_code(code: PassportFailure) -> String {
    serde_json::to_value(code)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_default()
}

fn str_field<'a>(obj: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    obj.get(key).and_then(Value::as_str)
}

fn bool_field(obj: &Map<String, Value>, key: &str) -> bool {
    obj.get(key).and_then(Value::as_bool).unwrap_or(false)
}

/// Verify `cat_id` against the store at instant `now`.
#[must_use]
pub fn verify_passport(
    store: &CatsStore,
    cat_id: &str,
    payload: Option<&Value>,
    now: DateTime<Utc>,
    checked_at_utc: String,
) -> VerificationArtifact {
    let mut trail = Trail::default();
    let mut internal = InternalView {
        failures: Vec::new(),
        notes: Vec::new(),
        definition_digest: None,
        passport_id: None,
        passport_bundle_digest: None,
        passport_expires_at_utc: None,
        payload_digest: payload.map(payload_digest),
        declared_side_effects: Vec::new(),
    };
    let mut canonical_name: Option<String> = None;
    let mut passport_required = false;

    match store.load_definition(cat_id) {
        Err(CatsLoadError::InvalidCatId(id)) => {
            trail.fail(PassportFailure::CatIdInvalid, format!("cat id {id:?} rejected"));
        }
        Err(CatsLoadError::NotFound(path)) => {
            trail.fail(
                PassportFailure::DefinitionNotFound,
                format!("no definition at {}", path.display()),
            );
        }
        Err(e) => trail.fail(PassportFailure::DefinitionInvalid, e.to_string()),
        Ok(definition) => {
            let (name, required) = check_chain(store, cat_id, &definition, now, &mut trail, &mut internal);
            canonical_name = name;
            passport_required = required;
        }
    }

    let verified = trail.failures.is_empty();
    let allowed_side_effects = if verified {
        internal.declared_side_effects.clone()
    } else {
        vec![READ_ONLY.to_string()]
    };
    let denial_code = trail.failures.first().map(|f| f.code);
    internal.failures = trail.failures;
    internal.notes = trail.notes;

    VerificationArtifact {
        public: PublicView {
            cat_id: cat_id.to_string(),
            canonical_name,
            verified,
            passport_required,
            denial_code,
            allowed_side_effects,
            checked_at_utc,
        },
        internal,
    }
}

/// Definition → registry → passport. Returns the canonical name and whether a
/// passport was required.
fn check_chain(
    store: &CatsStore,
    cat_id: &str,
    definition: &Map<String, Value>,
    now: DateTime<Utc>,
    trail: &mut Trail,
    internal: &mut InternalView,
) -> (Option<String>, bool) {
    let digest = ContentHash::of_json(&Value::Object(definition.clone()));
    internal.definition_digest = Some(digest.as_str().to_string());
    internal.declared_side_effects = definition
        .get("allowed_side_effects")
        .and_then(Value::as_array)
        .map(|list| {
            list.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    if let Some(declared) = str_field(definition, "cat_id") {
        if declared != cat_id {
            trail.fail(
                PassportFailure::DefinitionCatIdMismatch,
                format!("definition declares {declared:?}, requested {cat_id:?}"),
            );
        }
    }

    let canonical_name = str_field(definition, "canonical_name").map(str::to_string);
    let Some(name) = canonical_name.as_deref() else {
        trail.fail(PassportFailure::DefinitionInvalid, "definition has no canonical_name");
        return (None, bool_field(definition, "passport_required"));
    };

    // (1) registry
    let entry = match store.load_namespaces() {
        Err(e) => {
            trail.fail(PassportFailure::RegistryUnavailable, e.to_string());
            None
        }
        Ok(mut namespaces) => match namespaces.remove(name) {
            Some(Value::Object(entry)) => Some(entry),
            _ => {
                trail.fail(
                    PassportFailure::NamespaceNotFound,
                    format!("no registry namespace {name:?}"),
                );
                None
            }
        },
    };
    if let Some(entry) = &entry {
        let registered = str_field(entry, "cat_id");
        if registered != Some(cat_id) {
            trail.fail(
                PassportFailure::RegistryCatIdMismatch,
                format!("registry maps {name:?} to {registered:?}, definition is {cat_id:?}"),
            );
        } else {
            trail.note(format!("registry: {name} -> {cat_id}"));
        }
    }

    let passport_required = bool_field(definition, "passport_required")
        || entry
            .as_ref()
            .is_some_and(|e| bool_field(e, "passport_required"));
    if !passport_required {
        trail.note("passport not required");
        return (canonical_name, false);
    }

    // (2) passport identity
    let def_pid = str_field(definition, "passport_id");
    let reg_pid = entry.as_ref().and_then(|e| str_field(e, "passport_id"));
    let passport_id = match (def_pid, reg_pid) {
        (None, None) => {
            trail.fail(PassportFailure::PassportIdMissing, "no passport_id declared");
            return (canonical_name, true);
        }
        (Some(d), Some(r)) if d != r => {
            trail.fail(
                PassportFailure::PassportIdMismatch,
                format!("definition {d:?}, registry {r:?}"),
            );
            d
        }
        (Some(id), _) | (None, Some(id)) => id,
    };
    internal.passport_id = Some(passport_id.to_string());

    let passport = match store.load_passports() {
        Err(e) => {
            trail.note(format!("passport register unavailable: {e}"));
            None
        }
        Ok(list) => list.into_iter().find_map(|p| match p {
            Value::Object(obj) if str_field(&obj, "passport_id") == Some(passport_id) => Some(obj),
            _ => None,
        }),
    };
    let Some(passport) = passport else {
        trail.fail(
            PassportFailure::PassportNotFound,
            format!("passport {passport_id:?} not in register"),
        );
        return (canonical_name, true);
    };

    let p_name = str_field(&passport, "canonical_name");
    if p_name != Some(name) {
        trail.fail(
            PassportFailure::CanonicalNameMismatch,
            format!("passport names {p_name:?}, definition {name:?}"),
        );
    }
    if let Some(p_cat) = str_field(&passport, "cat_id") {
        if p_cat != cat_id {
            trail.fail(
                PassportFailure::PassportCatIdMismatch,
                format!("passport cat id {p_cat:?}, definition {cat_id:?}"),
            );
        }
    }

    // (3) status, expiry, content binding
    match str_field(&passport, "status").map(|s| s.trim().to_ascii_uppercase()) {
        Some(s) if s == "ACTIVE" => {}
        Some(s) if s == "REVOKED" => trail.fail(PassportFailure::Revoked, "status REVOKED"),
        Some(s) if s == "SUSPENDED" => trail.fail(PassportFailure::Suspended, "status SUSPENDED"),
        other => trail.fail(PassportFailure::StatusInvalid, format!("status {other:?}")),
    }

    let expires_raw = str_field(&passport, "expires_at_utc");
    internal.passport_expires_at_utc = expires_raw.map(str::to_string);
    match expires_raw.and_then(|s| DateTime::parse_from_rfc3339(s).ok()) {
        None => trail.fail(
            PassportFailure::ExpiryInvalid,
            format!("expires_at_utc {expires_raw:?} is not RFC 3339"),
        ),
        Some(expires) if expires.with_timezone(&Utc) <= now => trail.fail(
            PassportFailure::Expired,
            format!("expired at {expires}, checked at {}", now.to_rfc3339()),
        ),
        Some(_) => {}
    }

    let bundle = str_field(&passport, "bundle_digest");
    internal.passport_bundle_digest = bundle.map(str::to_string);
    let matches = bundle
        .and_then(normalized_sha256_hex)
        .is_some_and(|hex| hex == digest.hex_digest());
    if !matches {
        trail.fail(
            PassportFailure::DigestMismatch,
            format!("passport {bundle:?}, definition {}", digest.as_str()),
        );
    }

    (canonical_name, true)
}

/// `sha256:` digest of the payload: canonical JSON if it is (or holds) JSON,
/// else the raw text.
#[must_use]
pub fn payload_digest(payload: &Value) -> String {
    match payload {
        Value::String(text) => match serde_json::from_str::<Value>(text) {
            Ok(parsed) => ContentHash::of_json(&parsed),
            Err(_) => ContentHash::sha256(text.as_bytes()),
        },
        other => ContentHash::of_json(other),
    }
    .as_str()
    .to_string()
}
