//! Tri-state evidence: PASS / FAIL / UNKNOWN.
//!
//! UNKNOWN means "required evidence absent or check not runnable". It is
//! never read as success. Aggregation follows the total order
//! FAIL > UNKNOWN > PASS.

use serde::{Deserialize, Serialize};

/// Three-valued evidence result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TriState {
    Pass,
    Fail,
    Unknown,
}

impl TriState {
    /// Rank in the aggregation order (higher dominates).
    const fn rank(self) -> u8 {
        match self {
            Self::Pass => 0,
            Self::Unknown => 1,
            Self::Fail => 2,
        }
    }

    /// The dominant of two results.
    #[must_use]
    pub fn worst(self, other: Self) -> Self {
        if other.rank() > self.rank() {
            other
        } else {
            self
        }
    }

    /// Aggregate a set of results: any FAIL ⇒ FAIL, else any UNKNOWN ⇒
    /// UNKNOWN, else PASS.
    ///
    /// An empty set carries no evidence and aggregates to UNKNOWN.
    pub fn aggregate<I: IntoIterator<Item = Self>>(results: I) -> Self {
        let mut iter = results.into_iter();
        let Some(first) = iter.next() else {
            return Self::Unknown;
        };
        iter.fold(first, Self::worst)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pass => "PASS",
            Self::Fail => "FAIL",
            Self::Unknown => "UNKNOWN",
        }
    }

    /// Parse the wire form. Anything unrecognized is UNKNOWN: an
    /// unreadable verdict is missing evidence, not a pass.
    #[must_use]
    pub fn parse_lenient(s: &str) -> Self {
        match s.trim().to_ascii_uppercase().as_str() {
            "PASS" => Self::Pass,
            "FAIL" => Self::Fail,
            _ => Self::Unknown,
        }
    }
}

impl PartialOrd for TriState {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TriState {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.rank().cmp(&other.rank())
    }
}

impl std::fmt::Display for TriState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
