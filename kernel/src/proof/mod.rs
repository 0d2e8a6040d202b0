//! Proof module: canonical JSON bytes and SHA-256 content digests.
//!
//! Nothing in here knows about ledgers or stages; the judge and the harness
//! build on these two primitives.

pub mod canon;
pub mod hash;
