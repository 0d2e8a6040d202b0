//! Commissioner: the strict ALLOW/DENY gate over tri-state evidence.
//!
//! [`decide`] is a total, pure function. Every enforced field is evaluated
//! and every denial is reported; the result never stops at the first match.
//!
//! Denial reason wire form: `<field>:<cause>` with cause one of `FAIL`,
//! `UNKNOWN`, `REQUIREMENT_NOT_RECOGNIZED`.

use serde::{Deserialize, Serialize, Serializer};

use crate::evidence::TriState;

/// The six evidence fields the commissioner knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommissionerField {
    LedgerHashChainValid,
    ArtifactHashesValid,
    SchemaVersionsCompatible,
    TenantOrgScopeValid,
    UserPermissionValid,
    RedactionPolicySatisfied,
}

impl CommissionerField {
    /// All fields in canonical order (also the default `must_have` list).
    pub const ALL: [Self; 6] = [
        Self::LedgerHashChainValid,
        Self::ArtifactHashesValid,
        Self::SchemaVersionsCompatible,
        Self::TenantOrgScopeValid,
        Self::UserPermissionValid,
        Self::RedactionPolicySatisfied,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::LedgerHashChainValid => "ledger_hash_chain_valid",
            Self::ArtifactHashesValid => "artifact_hashes_valid",
            Self::SchemaVersionsCompatible => "schema_versions_compatible",
            Self::TenantOrgScopeValid => "tenant_org_scope_valid",
            Self::UserPermissionValid => "user_permission_valid",
            Self::RedactionPolicySatisfied => "redaction_policy_satisfied",
        }
    }

    /// Exact-match lookup by wire name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.as_str() == name)
    }
}

impl std::fmt::Display for CommissionerField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tri-state evidence handed to the commissioner.
///
/// `Default` is all-UNKNOWN: nothing has been proven yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommissionerInputs {
    pub ledger_hash_chain_valid: TriState,
    pub artifact_hashes_valid: TriState,
    pub schema_versions_compatible: TriState,
    pub tenant_org_scope_valid: TriState,
    pub user_permission_valid: TriState,
    pub redaction_policy_satisfied: TriState,
}

impl Default for CommissionerInputs {
    fn default() -> Self {
        Self {
            ledger_hash_chain_valid: TriState::Unknown,
            artifact_hashes_valid: TriState::Unknown,
            schema_versions_compatible: TriState::Unknown,
            tenant_org_scope_valid: TriState::Unknown,
            user_permission_valid: TriState::Unknown,
            redaction_policy_satisfied: TriState::Unknown,
        }
    }
}

impl CommissionerInputs {
    #[must_use]
    pub fn get(&self, field: CommissionerField) -> TriState {
        match field {
            CommissionerField::LedgerHashChainValid => self.ledger_hash_chain_valid,
            CommissionerField::ArtifactHashesValid => self.artifact_hashes_valid,
            CommissionerField::SchemaVersionsCompatible => self.schema_versions_compatible,
            CommissionerField::TenantOrgScopeValid => self.tenant_org_scope_valid,
            CommissionerField::UserPermissionValid => self.user_permission_valid,
            CommissionerField::RedactionPolicySatisfied => self.redaction_policy_satisfied,
        }
    }

    pub fn set(&mut self, field: CommissionerField, value: TriState) {
        let slot = match field {
            CommissionerField::LedgerHashChainValid => &mut self.ledger_hash_chain_valid,
            CommissionerField::ArtifactHashesValid => &mut self.artifact_hashes_valid,
            CommissionerField::SchemaVersionsCompatible => &mut self.schema_versions_compatible,
            CommissionerField::TenantOrgScopeValid => &mut self.tenant_org_scope_valid,
            CommissionerField::UserPermissionValid => &mut self.user_permission_valid,
            CommissionerField::RedactionPolicySatisfied => &mut self.redaction_policy_satisfied,
        };
        *slot = value;
    }
}

/// Requirement set: which fields are enforced and how UNKNOWN is treated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommissionerPolicy {
    /// Enforced field names, in evaluation order. Names are kept as raw
    /// strings so an unrecognized requirement can be reported, not dropped.
    pub must_have: Vec<String>,
    /// UNKNOWN on an enforced field denies when true.
    pub deny_if_missing_inputs: bool,
}

impl Default for CommissionerPolicy {
    fn default() -> Self {
        Self {
            must_have: CommissionerField::ALL
                .iter()
                .map(|f| f.as_str().to_string())
                .collect(),
            deny_if_missing_inputs: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Decision {
    Allow,
    Deny,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DenialCause {
    Fail,
    Unknown,
    RequirementNotRecognized,
}

impl DenialCause {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Fail => "FAIL",
            Self::Unknown => "UNKNOWN",
            Self::RequirementNotRecognized => "REQUIREMENT_NOT_RECOGNIZED",
        }
    }
}

/// One denial: `<field>:<cause>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DenialReason {
    pub field: String,
    pub cause: DenialCause,
}

impl std::fmt::Display for DenialReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.field, self.cause.as_str())
    }
}

impl Serialize for DenialReason {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommissionerResult {
    pub decision: Decision,
    pub denial_reasons: Vec<DenialReason>,
}

impl CommissionerResult {
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        self.decision == Decision::Allow
    }
}

/// Render the gate decision.
///
/// For each name in `policy.must_have`, in order:
/// - unknown name ⇒ `name:REQUIREMENT_NOT_RECOGNIZED`
/// - FAIL ⇒ `name:FAIL`
/// - UNKNOWN ⇒ `name:UNKNOWN` iff `deny_if_missing_inputs`
///
/// ALLOW iff no reasons accumulated.
#[must_use]
pub fn decide(inputs: &CommissionerInputs, policy: &CommissionerPolicy) -> CommissionerResult {
    let mut denial_reasons = Vec::new();

    for name in &policy.must_have {
        let Some(field) = CommissionerField::from_name(name) else {
            denial_reasons.push(DenialReason {
                field: name.clone(),
                cause: DenialCause::RequirementNotRecognized,
            });
            continue;
        };

        let cause = match inputs.get(field) {
            TriState::Pass => None,
            TriState::Fail => Some(DenialCause::Fail),
            TriState::Unknown if policy.deny_if_missing_inputs => Some(DenialCause::Unknown),
            TriState::Unknown => None,
        };
        if let Some(cause) = cause {
            denial_reasons.push(DenialReason {
                field: name.clone(),
                cause,
            });
        }
    }

    let decision = if denial_reasons.is_empty() {
        Decision::Allow
    } else {
        Decision::Deny
    };
    CommissionerResult {
        decision,
        denial_reasons,
    }
}
