//! Run clock: one UTC instant per run, optionally frozen.
//!
//! With `determinism.freeze_time_utc`, every timestamp written by the run and
//! every passport expiry comparison use the instant captured at run start.

use chrono::{DateTime, SecondsFormat, Utc};

/// `strftime` pattern for the timestamp component of a default evidence directory.
pub const EVIDENCE_DIR_TIME_FORMAT: &str = "%Y%m%d-%H%M%SZ";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunClock {
    started_at: DateTime<Utc>,
    frozen: bool,
}

impl RunClock {
    #[must_use]
    pub fn new(started_at: DateTime<Utc>, frozen: bool) -> Self {
        Self { started_at, frozen }
    }

    /// A clock pinned to `at`.
    #[must_use]
    pub fn frozen_at(at: DateTime<Utc>) -> Self {
        Self::new(at, true)
    }

    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    #[must_use]
    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        if self.frozen {
            self.started_at
        } else {
            Utc::now()
        }
    }

    /// RFC 3339 timestamp of [`RunClock::now`].
    #[must_use]
    pub fn timestamp(&self) -> String {
        format_utc(self.now())
    }
}

/// RFC 3339 with microseconds and a `Z` suffix.
#[must_use]
pub fn format_utc(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}
