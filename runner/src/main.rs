//! `contract-runner`: compare a candidate backend against the golden reference.
//!
//! Stdout carries only the `PASS`/`FAIL` lines (or the `list` output); logs and the failure
//! report go to stderr.

use std::io::Write;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use contract_runner::cases::{self, CaseContext};
use contract_runner::config::Config;
use contract_runner::registry::run_cases;
use contract_runner::{paths, seed};

#[derive(Parser, Debug)]
#[command(
    name = "contract-runner",
    version,
    about = "Compare a candidate backend against the golden reference"
)]
struct Cli {
    /// Case names to run (unioned with CASE_FILTER), or `list` to print the registered names
    cases: Vec<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load environment variables from `.env` first so RUST_LOG there applies
    paths::load_dotenv();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// Spawn the watchers that cancel the run on Ctrl-C or when the run deadline passes.
fn spawn_cancel_watchers(config: &Config, cancel: &CancellationToken) {
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = on_signal.cancelled() => {}
            result = tokio::signal::ctrl_c() => match result {
                Ok(()) => {
                    warn!("[RUNNER] Ctrl-C received, cancelling run");
                    on_signal.cancel();
                }
                Err(e) => warn!("[RUNNER] Failed to listen for Ctrl-C: {}", e),
            },
        }
    });

    if let Some(deadline) = config.run_timeout {
        let on_deadline = cancel.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = on_deadline.cancelled() => {}
                _ = tokio::time::sleep(deadline) => {
                    warn!("[RUNNER] Run timeout of {:?} reached, cancelling run", deadline);
                    on_deadline.cancel();
                }
            }
        });
    }
}

async fn run(cli: Cli) -> Result<bool> {
    let registry = cases::registry();

    if cli.cases.first().map(String::as_str) == Some("list") {
        let mut out = std::io::stdout().lock();
        for name in registry.names() {
            writeln!(out, "{}", name)?;
        }
        return Ok(true);
    }

    let config = Config::from_env().context("Invalid configuration")?;

    let mut requested = cli.cases;
    requested.extend(config.case_filter.iter().cloned());
    let selected = registry.select(&requested)?;

    info!(
        "[RUNNER] golden={} candidate={} cases={}",
        config.golden_base,
        config.candidate_base,
        selected.len()
    );

    // The run deadline and Ctrl-C cover seeding too
    let cancel = CancellationToken::new();
    spawn_cancel_watchers(&config, &cancel);

    seed::seed_databases_until(&config, &cancel).await?;

    let ctx = CaseContext::from_config(&config)?;

    let mut stdout = std::io::stdout();
    let report = run_cases(&selected, &ctx, &cancel, &mut stdout).await?;
    cancel.cancel();

    report.write_failures(&mut std::io::stderr())?;
    if report.cancelled {
        warn!("[RUNNER] Run cancelled after {} case(s)", report.results.len());
    }

    Ok(report.passed())
}
