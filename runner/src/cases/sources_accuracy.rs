use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;

use super::support::{CaseContext, Request};
use crate::registry::Case;
use crate::seed::fixture::{accuracy_record_count, accuracy_window_days, expected_avg_error_rate};

const SOURCE: &str = "eastmoney";
const AVG_TOLERANCE: f64 = 1e-6;
const CROSS_TARGET_TOLERANCE: f64 = 1e-9;

/// Accuracy summary for one source; value checks against the seeded rows.
pub struct SourcesAccuracy;

/// Numbers, or strings holding numbers.
fn as_number(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|n| n.is_finite())
}

fn show(value: Option<&Value>) -> String {
    value.map(Value::to_string).unwrap_or_else(|| "undefined".to_string())
}

#[async_trait]
impl Case for SourcesAccuracy {
    fn name(&self) -> &'static str {
        "sources_accuracy"
    }

    async fn run(&self, ctx: &CaseContext) -> Result<()> {
        let path = format!("/api/sources/{}/accuracy/", SOURCE);
        let accuracy = ctx.both("sources.accuracy", Request::get(path.as_str())).await?;
        accuracy.same_status("sources.accuracy")?;
        accuracy.same_schema("sources.accuracy")?;

        if !ctx.db_seeded {
            return Ok(());
        }

        let days = accuracy_window_days(Utc::now().date_naive());
        let step = "sources.accuracy(seeded)";
        let seeded = ctx
            .both(step, Request::get(format!("{}?days={}", path, days)))
            .await?;
        if seeded.golden.status != 200 || seeded.candidate.status != 200 {
            bail!(
                "{} unexpected status: golden={} candidate={}",
                step,
                seeded.golden.status,
                seeded.candidate.status
            );
        }

        let golden_count = seeded.golden.field("record_count");
        let candidate_count = seeded.candidate.field("record_count");
        let (Some(g_count), Some(c_count)) = (
            golden_count.and_then(Value::as_f64),
            candidate_count.and_then(Value::as_f64),
        ) else {
            bail!(
                "{} record_count is not a number: {} / {}",
                step,
                show(golden_count),
                show(candidate_count)
            );
        };
        let expected_count = accuracy_record_count(SOURCE) as f64;
        if g_count != expected_count || c_count != expected_count {
            bail!(
                "{} record_count: golden={} candidate={} expected={}",
                step,
                g_count,
                c_count,
                expected_count
            );
        }

        let golden_avg = seeded.golden.field("avg_error_rate");
        let candidate_avg = seeded.candidate.field("avg_error_rate");
        let (Some(g_avg), Some(c_avg)) = (as_number(golden_avg), as_number(candidate_avg)) else {
            bail!(
                "{} avg_error_rate is not a number: {} / {}",
                step,
                show(golden_avg),
                show(candidate_avg)
            );
        };
        let Some(expected) = expected_avg_error_rate(SOURCE) else {
            bail!("no seeded accuracy rows for {}", SOURCE);
        };
        if (g_avg - expected).abs() > AVG_TOLERANCE || (c_avg - expected).abs() > AVG_TOLERANCE {
            bail!(
                "{} avg_error_rate: golden={} candidate={} expected={}",
                step,
                g_avg,
                c_avg,
                expected
            );
        }
        if (g_avg - c_avg).abs() > CROSS_TARGET_TOLERANCE {
            bail!(
                "{} avg_error_rate differs: golden={} candidate={}",
                step,
                g_avg,
                c_avg
            );
        }
        Ok(())
    }
}
