//! SHA-256 digests: plain hex fingerprints and `algorithm:hex` content hashes.
//!
//! Judge fingerprints and snapshot digests are bare lowercase hex. Capability
//! digests that travel between records (definition digest vs. passport bundle
//! digest) use the prefixed [`ContentHash`] form so the algorithm is explicit.

use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::proof::canon::canonical_json_bytes;

/// Algorithm tag for every digest produced in this workspace.
pub const SHA256: &str = "sha256";

/// A content-addressed hash with algorithm identifier.
///
/// Format: `"algorithm:hex_digest"` (e.g., `"sha256:abcdef..."`)
///
/// Invariant: the inner string always contains exactly one `:` separator,
/// with non-empty substrings on both sides (enforced by [`ContentHash::parse`]).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentHash {
    full: String,
    colon: usize,
}

impl ContentHash {
    /// Parse from `"algorithm:hex"` format.
    ///
    /// Returns `None` if the format is invalid (missing colon,
    /// empty algorithm, or empty digest).
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        let colon = s.find(':')?;
        if colon == 0 || colon == s.len() - 1 {
            return None;
        }
        Some(Self {
            full: s.to_string(),
            colon,
        })
    }

    /// SHA-256 over raw bytes.
    #[must_use]
    pub fn sha256(data: &[u8]) -> Self {
        let hex = sha256_hex(data);
        Self {
            colon: SHA256.len(),
            full: format!("{SHA256}:{hex}"),
        }
    }

    /// SHA-256 over the canonical JSON encoding of `value`.
    #[must_use]
    pub fn of_json(value: &Value) -> Self {
        Self::sha256(&canonical_json_bytes(value))
    }

    /// The algorithm portion (e.g., "sha256").
    #[must_use]
    pub fn algorithm(&self) -> &str {
        &self.full[..self.colon]
    }

    /// The hex digest portion.
    #[must_use]
    pub fn hex_digest(&self) -> &str {
        &self.full[self.colon + 1..]
    }

    /// The full string representation (`"algorithm:hex_digest"`).
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.full
    }
}

impl std::fmt::Display for ContentHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.full)
    }
}

/// Lowercase hex SHA-256 of `data`.
#[must_use]
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Fingerprint of a JSON value: hex SHA-256 over its canonical JSON bytes.
#[must_use]
pub fn fingerprint(value: &Value) -> String {
    sha256_hex(&canonical_json_bytes(value))
}

/// Normalize a digest string for comparison: accept either bare hex or
/// `sha256:<hex>`, lowercase the hex.
///
/// Returns `None` for a digest tagged with another algorithm or an empty one.
#[must_use]
pub fn normalized_sha256_hex(digest: &str) -> Option<String> {
    let trimmed = digest.trim();
    let hex = match ContentHash::parse(trimmed) {
        Some(h) if h.algorithm().eq_ignore_ascii_case(SHA256) => h.hex_digest().to_string(),
        Some(_) => return None,
        None => trimmed.to_string(),
    };
    if hex.is_empty() {
        return None;
    }
    Some(hex.to_ascii_lowercase())
}
