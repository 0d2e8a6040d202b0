//! replay - re-verify a completed execution against its evidence.
//!
//! Prints one JSON line to stdout: `{"status", "exit_code", "result_path"}`.
//! Logs go to stderr. Exit codes: 0 allowed, 2 denied, 3 fault.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use serde_json::json;
use tracing::error;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use replay_harness::contract::DEFAULT_EVIDENCE_BASE;
use replay_harness::pipeline::{run_contract_file, RunOptions, EXIT_FAULT};

/// Replay verification pipeline
#[derive(Parser, Debug)]
#[command(name = "replay")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to the run contract (JSON)
    #[arg(long)]
    contract: PathBuf,

    /// Parent directory for default evidence directories
    #[arg(long, default_value = DEFAULT_EVIDENCE_BASE)]
    evidence_base: PathBuf,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(long, default_value = "warn")]
    log_level: String,
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if e.use_stderr() => {
            let _ = e.print();
            return exit(EXIT_FAULT);
        }
        Err(e) => e.exit(),
    };

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cli.log_level))
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let options = RunOptions {
        evidence_base: cli.evidence_base,
        ..RunOptions::default()
    };

    match run_contract_file(&cli.contract, &options) {
        Ok(outcome) => {
            println!(
                "{}",
                json!({
                    "status": outcome.status().as_str(),
                    "exit_code": outcome.exit_code(),
                    "result_path": outcome.result_path,
                })
            );
            exit(outcome.exit_code())
        }
        Err(e) => {
            error!(error = %e, "replay aborted");
            println!(
                "{}",
                json!({"status": "FAULT", "exit_code": EXIT_FAULT, "error": e.to_string()})
            );
            exit(EXIT_FAULT)
        }
    }
}

fn exit(code: i32) -> ExitCode {
    ExitCode::from(u8::try_from(code).unwrap_or(1))
}
