//! Replay Kernel: the deterministic core of replay verification.
//!
//! # API Surface
//!
//! - [`judge::canonicalize::canonicalize`] / [`judge::canonicalize::canonicalize_v2`]
//!   -- project a raw execution record into a Canonical Semantic Model (CSM)
//! - [`judge::diff::semantic_diff`] -- classify drift between two CSMs or raw records
//! - [`commissioner::decide`] -- strict ALLOW/DENY gate over tri-state evidence
//!
//! # Module Dependency Direction
//!
//! `evidence` ← `proof` ← `judge`, `evidence` ← `commissioner`
//!
//! The kernel never touches the filesystem, never reads the clock and never
//! logs. Same inputs, same bytes out.

#![forbid(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]

pub mod commissioner;
pub mod evidence;
pub mod judge;
pub mod proof;
