use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::Value;

use super::support::{CaseContext, Request};
use crate::registry::Case;

/// `GET /api/health/`: same shape, `database` may differ but must be a string.
pub struct Health;

#[async_trait]
impl Case for Health {
    fn name(&self) -> &'static str {
        "health"
    }

    async fn run(&self, ctx: &CaseContext) -> Result<()> {
        let health = ctx.both("health", Request::get("/api/health/")).await?;
        health.same_status("health")?;
        health.same_shape("health", &["$.database"])?;

        match health.candidate.field("database") {
            Some(Value::String(_)) => Ok(()),
            other => bail!(
                "candidate database is not a string: {}",
                other.map(Value::to_string).unwrap_or_else(|| "undefined".to_string())
            ),
        }
    }
}
