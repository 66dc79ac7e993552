//! Case registry and the sequential runner.
//!
//! Cases run strictly one after another in registry order. A failing or panicking case is
//! recorded and the loop moves on; cancellation stops the loop after recording the
//! in-flight case as failed.

use std::io::{self, Write};
use std::panic::AssertUnwindSafe;
use std::time::{Duration, Instant};

use anyhow::anyhow;
use async_trait::async_trait;
use futures_util::FutureExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::cases::CaseContext;

/// Message recorded for the case interrupted by cancellation.
pub const CANCELLED: &str = "cancelled";

/// One named scenario driving both targets.
#[async_trait]
pub trait Case: Send + Sync {
    fn name(&self) -> &'static str;

    async fn run(&self, ctx: &CaseContext) -> anyhow::Result<()>;
}

/// Outcome of one case
#[derive(Debug, Clone, PartialEq)]
pub struct CaseResult {
    pub name: &'static str,
    pub passed: bool,
    pub elapsed: Duration,
    pub error: Option<String>,
}

impl CaseResult {
    pub fn ok(name: &'static str, elapsed: Duration) -> Self {
        Self { name, passed: true, elapsed, error: None }
    }

    pub fn err(name: &'static str, elapsed: Duration, error: impl Into<String>) -> Self {
        Self { name, passed: false, elapsed, error: Some(error.into()) }
    }

    /// `PASS <name> (<ms>ms)` or `FAIL <name> (<ms>ms)`
    pub fn progress_line(&self) -> String {
        format!(
            "{} {} ({}ms)",
            if self.passed { "PASS" } else { "FAIL" },
            self.name,
            self.elapsed.as_millis()
        )
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown case(s): {}; valid cases: {}", .unknown.join(", "), .valid.join(", "))]
pub struct SelectionError {
    pub unknown: Vec<String>,
    pub valid: Vec<&'static str>,
}

/// Fixed, ordered set of cases. Insertion order is execution order.
pub struct Registry {
    cases: Vec<Box<dyn Case>>,
}

impl Registry {
    pub fn new(cases: Vec<Box<dyn Case>>) -> Self {
        Self { cases }
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.cases.iter().map(|c| c.name()).collect()
    }

    /// Cases matching `requested`, in registry order. An empty request selects everything;
    /// any name not in the registry rejects the whole selection.
    pub fn select(&self, requested: &[String]) -> Result<Vec<&dyn Case>, SelectionError> {
        if requested.is_empty() {
            return Ok(self.cases.iter().map(|c| c.as_ref()).collect());
        }

        let valid = self.names();
        let mut unknown: Vec<String> = requested
            .iter()
            .filter(|name| !valid.contains(&name.as_str()))
            .cloned()
            .collect();
        if !unknown.is_empty() {
            unknown.dedup();
            return Err(SelectionError { unknown, valid });
        }

        Ok(self
            .cases
            .iter()
            .filter(|c| requested.iter().any(|r| r == c.name()))
            .map(|c| c.as_ref())
            .collect())
    }
}

/// Results of one run, in execution order
#[derive(Debug, Default)]
pub struct RunReport {
    pub results: Vec<CaseResult>,
    /// Set when cancellation stopped the run early
    pub cancelled: bool,
}

impl RunReport {
    pub fn failures(&self) -> impl Iterator<Item = &CaseResult> {
        self.results.iter().filter(|r| !r.passed)
    }

    /// True iff nothing failed and the run was not cancelled.
    pub fn passed(&self) -> bool {
        !self.cancelled && self.results.iter().all(|r| r.passed)
    }

    /// One `\n[<name>] <message>` block per failed case.
    pub fn write_failures<W: Write>(&self, err: &mut W) -> io::Result<()> {
        for failure in self.failures() {
            write!(
                err,
                "\n[{}] {}\n",
                failure.name,
                failure.error.as_deref().unwrap_or("failed")
            )?;
        }
        Ok(())
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Run `cases` in order, writing one progress line per case to `out` as soon as it
/// finishes.
pub async fn run_cases<W: Write>(
    cases: &[&dyn Case],
    ctx: &CaseContext,
    cancel: &CancellationToken,
    out: &mut W,
) -> io::Result<RunReport> {
    let mut report = RunReport::default();

    for case in cases {
        if cancel.is_cancelled() {
            report.cancelled = true;
            break;
        }

        let name = case.name();
        debug!("[RUNNER] Starting {}", name);
        let start = Instant::now();

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            result = AssertUnwindSafe(case.run(ctx)).catch_unwind() => Some(match result {
                Ok(result) => result,
                Err(payload) => Err(anyhow!("panicked: {}", panic_message(&*payload))),
            }),
        };
        let elapsed = start.elapsed();

        let result = match outcome {
            Some(Ok(())) => CaseResult::ok(name, elapsed),
            Some(Err(e)) => CaseResult::err(name, elapsed, format!("{:#}", e)),
            None => {
                warn!("[RUNNER] Run cancelled during {}", name);
                report.cancelled = true;
                CaseResult::err(name, elapsed, CANCELLED)
            }
        };

        writeln!(out, "{}", result.progress_line())?;
        out.flush()?;
        report.results.push(result);

        if report.cancelled {
            break;
        }
    }

    Ok(report)
}
