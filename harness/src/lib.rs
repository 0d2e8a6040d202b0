//! Replay harness: everything in the verification pipeline that touches the
//! filesystem or the clock.
//!
//! The kernel decides (tri-state aggregation, commissioner gate, CSM
//! canonicalization and diff); the harness gathers evidence, runs the stages
//! in order, and persists every report. Entry point:
//! [`pipeline::run_contract_file`].

#![forbid(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]

pub mod clock;
pub mod contract;
pub mod evidence_io;
pub mod passport;
pub mod pipeline;
pub mod side_effects;
pub mod snapshot;
pub mod stages;
pub mod validators;
