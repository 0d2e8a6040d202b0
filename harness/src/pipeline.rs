//! Pipeline orchestrator: collector → inspector → commissioner → judge.
//!
//! ```text
//! load contract ─▶ build context ─▶ BEGIN snapshot
//!   ─▶ collector ─▶ inspector ─▶ commissioner ─▶ judge (or SKIPPED)
//!   ─▶ passport artifact (cats-demo only) ─▶ side-effect tracker
//!   ─▶ [test delay] ─▶ END snapshot ─▶ snapshot diff ─▶ replay_result.json
//! ```
//!
//! Each stage report is durably written before the next stage starts. The
//! terminal verdict is `DENIED` on strict snapshot drift, else `DENIED` on a
//! commissioner denial, else `ALLOWED_STAGE_1_3`. Snapshot, tracker and
//! passport faults degrade to neutral results; only contract, directory and
//! report-write failures abort the run as [`RunError`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use replay_kernel::judge::canonicalize::CanonicalizeOptions;

use crate::clock::RunClock;
use crate::contract::{
    build_context, load_contract, ContractError, ReplayContext, ReplayContract,
    DEFAULT_EVIDENCE_BASE,
};
use crate::evidence_io::{ensure_dir, write_json_once, EvidenceError};
use crate::passport::{verify_passport, CatsStore};
use crate::side_effects::{DriftReport, SideEffectTracker, TrackerEnvironment};
use crate::snapshot::{
    diff_snapshots, take_snapshot, ContextIdentity, FileLedger, LedgerStateExport, Snapshot,
    SnapshotDiff, SnapshotFault,
};
use crate::stages::collector::collect;
use crate::stages::commissioner::adjudicate;
use crate::stages::inspector::inspect;
use crate::stages::judge::{judge, skip as skip_judge, SkipReason};
use crate::stages::{write_stage_report, StageName, StageStatus};
use crate::validators::ValidatorSet;

pub const EXIT_ALLOWED: i32 = 0;
pub const EXIT_DENIED: i32 = 2;
/// Infrastructure fault: distinct from a policy denial.
pub const EXIT_FAULT: i32 = 3;

#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error(transparent)]
    Contract(#[from] ContractError),

    #[error(transparent)]
    Evidence(#[from] EvidenceError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunStatus {
    #[serde(rename = "ALLOWED_STAGE_1_3")]
    AllowedStage13,
    #[serde(rename = "DENIED")]
    Denied,
}

impl RunStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AllowedStage13 => "ALLOWED_STAGE_1_3",
            Self::Denied => "DENIED",
        }
    }

    #[must_use]
    pub const fn exit_code(self) -> i32 {
        match self {
            Self::AllowedStage13 => EXIT_ALLOWED,
            Self::Denied => EXIT_DENIED,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VerdictReason {
    CommissionerGate,
    SnapshotDriftStrict,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StageStatuses {
    pub collector: StageStatus,
    pub inspector: StageStatus,
    pub commissioner: StageStatus,
    pub judge: StageStatus,
}

/// Contents of `replay_result.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReplayResult {
    pub status: RunStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<VerdictReason>,
    pub timestamp_utc: String,
    pub evidence_dir: PathBuf,
    pub drift_report: DriftReport,
    pub snapshot_diff: SnapshotDiff,
    pub stage_statuses: StageStatuses,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cats_demo_artifact: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    pub result: ReplayResult,
    pub result_path: PathBuf,
}

impl RunOutcome {
    #[must_use]
    pub fn status(&self) -> RunStatus {
        self.result.status
    }

    #[must_use]
    pub fn exit_code(&self) -> i32 {
        self.result.status.exit_code()
    }
}

/// Knobs supplied by the caller rather than the contract.
#[derive(Debug)]
pub struct RunOptions {
    /// Base for relative contract paths.
    pub workdir: PathBuf,
    /// Parent of default evidence directories (relative to `workdir`).
    pub evidence_base: PathBuf,
    /// Run start instant; `None` reads the system clock.
    pub now: Option<DateTime<Utc>>,
    /// Pause between the side-effect check and the END snapshot.
    pub end_snapshot_delay: Option<Duration>,
    pub validators: ValidatorSet,
    pub canonicalize: CanonicalizeOptions,
}

impl RunOptions {
    #[must_use]
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
            ..Self::default()
        }
    }
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            workdir: PathBuf::from("."),
            evidence_base: PathBuf::from(DEFAULT_EVIDENCE_BASE),
            now: None,
            end_snapshot_delay: None,
            validators: ValidatorSet::default(),
            canonicalize: CanonicalizeOptions::default(),
        }
    }
}

/// Load `contract_path` and run it.
///
/// # Errors
///
/// [`RunError`] on an unreadable contract or an evidence write failure.
pub fn run_contract_file(contract_path: &Path, options: &RunOptions) -> Result<RunOutcome, RunError> {
    let contract = load_contract(contract_path)?;
    run(&contract, contract_path, options)
}

/// Run an already-parsed contract. `contract_path` is hashed into the
/// snapshot context identity at BEGIN and END.
///
/// # Errors
///
/// [`RunError::Evidence`] if an evidence directory, stage report, or the
/// terminal result cannot be written.
pub fn run(
    contract: &ReplayContract,
    contract_path: &Path,
    options: &RunOptions,
) -> Result<RunOutcome, RunError> {
    let started_at = options.now.unwrap_or_else(Utc::now);
    let ctx = build_context(
        contract,
        contract_path,
        &options.workdir,
        &options.evidence_base,
        started_at,
    );
    let clock = RunClock::new(started_at, ctx.determinism.freeze_time_utc);
    let paths = &ctx.paths;

    ensure_dir(&paths.evidence_dir)?;
    ensure_dir(&paths.stage_reports_dir)?;
    info!(
        evidence_dir = %paths.evidence_dir.display(),
        mode = %ctx.config.mode,
        "replay started"
    );

    let ledger = paths.execution_ledger.as_deref().map(FileLedger::new);
    let begin = snapshot(&ctx, ledger.as_ref(), &clock);

    // -- stages -----------------------------------------------------------

    let collector = collect(paths, clock.timestamp());
    write_stage_report(&paths.stage_reports_dir, StageName::Collector, &collector)?;
    info!(stage = "collector", status = %collector.status, "stage complete");

    let inspector = inspect(paths, &collector, &options.validators, clock.timestamp());
    write_stage_report(&paths.stage_reports_dir, StageName::Inspector, &inspector)?;
    info!(stage = "inspector", status = %inspector.status, "stage complete");

    let commissioner = adjudicate(&inspector, &ctx.commissioner, clock.timestamp());
    write_stage_report(&paths.stage_reports_dir, StageName::Commissioner, &commissioner)?;
    info!(
        stage = "commissioner",
        status = %commissioner.status,
        denials = commissioner.denial_reasons.len(),
        "stage complete"
    );

    let judge_report = if !ctx.pipeline.is_enabled(StageName::Judge) {
        skip_judge(paths, SkipReason::StageDisabled, clock.timestamp())?
    } else if !commissioner.is_allowed() {
        skip_judge(paths, SkipReason::CommissionerDenied, clock.timestamp())?
    } else {
        judge(
            paths,
            &inspector,
            &commissioner,
            &options.canonicalize,
            clock.timestamp(),
        )?
    };
    write_stage_report(&paths.stage_reports_dir, StageName::Judge, &judge_report)?;
    info!(stage = "judge", status = %judge_report.status, "stage complete");

    // -- side artifacts ---------------------------------------------------

    let cats_demo_artifact = write_cats_artifact(&ctx, &clock);
    let drift_report = track_side_effects(&ctx, &clock);

    if let Some(delay) = options.end_snapshot_delay {
        std::thread::sleep(delay);
    }

    let end = snapshot(&ctx, ledger.as_ref(), &clock);
    let snapshot_diff = match (begin, end) {
        (Ok(b), Ok(e)) => diff_snapshots(&b, &e),
        (Err(fault), _) | (_, Err(fault)) => {
            warn!(error = %fault, "snapshot unavailable, drift not evaluated");
            SnapshotDiff::degraded(format!("snapshot_error: {fault}"))
        }
    };

    // -- verdict ----------------------------------------------------------

    let (status, reason) = if ctx.config.mode.is_strict() && snapshot_diff.has_drift() {
        (RunStatus::Denied, Some(VerdictReason::SnapshotDriftStrict))
    } else if !commissioner.is_allowed() {
        (RunStatus::Denied, Some(VerdictReason::CommissionerGate))
    } else {
        (RunStatus::AllowedStage13, None)
    };

    let result = ReplayResult {
        status,
        reason,
        timestamp_utc: clock.timestamp(),
        evidence_dir: paths.evidence_dir.clone(),
        drift_report,
        snapshot_diff,
        stage_statuses: StageStatuses {
            collector: collector.status,
            inspector: inspector.status,
            commissioner: commissioner.status,
            judge: judge_report.status,
        },
        cats_demo_artifact,
    };
    write_json_once(&paths.replay_result, &result)?;
    info!(status = status.as_str(), reason = ?reason, "replay finished");

    Ok(RunOutcome {
        result,
        result_path: paths.replay_result.clone(),
    })
}

fn snapshot(
    ctx: &ReplayContext,
    ledger: Option<&FileLedger>,
    clock: &RunClock,
) -> Result<Snapshot, SnapshotFault> {
    let identity = ContextIdentity::capture(
        ctx.config.mode.as_str(),
        ctx.config.policy_version.as_deref(),
        &ctx.contract_path,
    );
    let root = ctx.side_effects.snapshot_root.as_ref().map(|r| {
        if r.is_absolute() {
            r.clone()
        } else {
            ctx.workdir.join(r)
        }
    });
    take_snapshot(
        ledger.map(|l| l as &dyn LedgerStateExport),
        root.as_deref(),
        &identity,
        clock.timestamp(),
    )
}

fn write_cats_artifact(ctx: &ReplayContext, clock: &RunClock) -> Option<PathBuf> {
    let request = ctx.cats.as_ref()?;
    let artifact = verify_passport(
        &CatsStore::new(&request.cats_root),
        &request.cat_id,
        request.payload.as_ref(),
        clock.now(),
        clock.timestamp(),
    );
    info!(
        cat_id = %request.cat_id,
        verified = artifact.is_verified(),
        "passport verification complete"
    );
    match write_json_once(&ctx.paths.cats_artifact, &artifact) {
        Ok(()) => Some(ctx.paths.cats_artifact.clone()),
        Err(e) => {
            warn!(error = %e, "passport artifact not written");
            None
        }
    }
}

fn track_side_effects(ctx: &ReplayContext, clock: &RunClock) -> DriftReport {
    let env = TrackerEnvironment::resolve(
        ctx.side_effects.environment.as_deref(),
        ctx.config.mode.as_str(),
    );
    let evaluated = SideEffectTracker::new(&ctx.side_effects, env, &ctx.workdir)
        .and_then(|tracker| tracker.evaluate(clock.timestamp()));
    match evaluated {
        Ok(report) => report,
        Err(fault) => {
            warn!(error = %fault, "side-effect tracker degraded");
            DriftReport::degraded(env, format!("tracker_error: {fault}"), clock.timestamp())
        }
    }
}
