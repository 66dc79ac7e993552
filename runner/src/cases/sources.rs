use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::Value;

use super::support::{CaseContext, Request};
use crate::registry::Case;

/// Source catalogue: identical names on both targets, `eastmoney` included.
pub struct Sources;

fn sorted_names(step: &str, list: &Value) -> Result<Vec<String>> {
    let Some(items) = list.as_array() else {
        bail!("{} response is not an array", step);
    };
    let mut names: Vec<String> = items
        .iter()
        .map(|item| match item.get("name") {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => "undefined".to_string(),
        })
        .collect();
    names.sort();
    Ok(names)
}

#[async_trait]
impl Case for Sources {
    fn name(&self) -> &'static str {
        "sources"
    }

    async fn run(&self, ctx: &CaseContext) -> Result<()> {
        let sources = ctx.both("sources", Request::get("/api/sources/")).await?;
        sources.expect_status("sources", 200)?;

        let golden = sorted_names("sources", &sources.golden.json)?;
        let candidate = sorted_names("sources", &sources.candidate.json)?;
        if golden != candidate {
            bail!(
                "sources lists differ: golden={} candidate={}",
                golden.join(","),
                candidate.join(",")
            );
        }
        if !candidate.iter().any(|name| name == "eastmoney") {
            bail!("sources must include eastmoney");
        }
        Ok(())
    }
}
