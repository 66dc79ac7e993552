use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use tracing::info;

use contract::HttpResponse;

use super::support::{encode_segment, CaseContext, Pair, Request};
use crate::registry::Case;
use crate::seed::fixture::{
    accuracy_window_days, QUERY_NAV_DATE, QUERY_NAV_EXPECTED_NAV_DATE, SEED_FUND_CODE,
};

const MISSING_FUND_CODE: &str = "999999";

/// Fund list, retrieve, estimates, accuracy, batch endpoints and `query_nav`.
pub struct Funds;

async fn schema_step(
    ctx: &CaseContext,
    step: &str,
    request: Request,
) -> Result<Pair<HttpResponse>> {
    let responses = ctx.both(step, request).await?;
    responses.same_status(step)?;
    responses.same_schema(step)?;
    Ok(responses)
}

async fn query_nav(
    ctx: &CaseContext,
    step: &str,
    fund_code: &str,
    date: &str,
) -> Result<Pair<HttpResponse>> {
    ctx.both(
        step,
        Request::post(
            "/api/funds/query_nav/",
            json!({
                "fund_code": fund_code,
                "operation_date": date,
                "before_15": true,
            }),
        ),
    )
    .await
}

#[async_trait]
impl Case for Funds {
    fn name(&self) -> &'static str {
        "funds"
    }

    async fn run(&self, ctx: &CaseContext) -> Result<()> {
        if !ctx.db_cases {
            info!("[CASE:{}] skipped: ENABLE_DB_CASES not set", self.name());
            return Ok(());
        }

        let list = ctx
            .both("funds.list", Request::get("/api/funds/?page=1&page_size=5"))
            .await?;
        list.expect_status("funds.list", 200)?;
        list.same_schema("funds.list")?;

        let first_code = list
            .candidate
            .json
            .pointer("/results/0/fund_code")
            .and_then(Value::as_str)
            .filter(|code| !code.is_empty())
            .map(str::to_string);
        let Some(first_code) = first_code else {
            info!("[CASE:{}] no funds listed, stopping after list", self.name());
            return Ok(());
        };
        let first = encode_segment(&first_code);

        let one = ctx
            .both("funds.retrieve", Request::get(format!("/api/funds/{}/", first)))
            .await?;
        one.expect_status("funds.retrieve", 200)?;
        one.same_schema("funds.retrieve")?;

        schema_step(
            ctx,
            "funds.estimate(404)",
            Request::get(format!("/api/funds/{}/estimate/", MISSING_FUND_CODE)),
        )
        .await?;
        schema_step(
            ctx,
            "funds.accuracy(404)",
            Request::get(format!("/api/funds/{}/accuracy/", MISSING_FUND_CODE)),
        )
        .await?;

        // At least two sources so the per-source map is not a single key
        let days = accuracy_window_days(Utc::now().date_naive());
        let accuracy = ctx
            .both(
                "funds.accuracy(ok)",
                Request::get(format!("/api/funds/{}/accuracy/?days={}", first, days)),
            )
            .await?;
        accuracy.expect_status("funds.accuracy(ok)", 200)?;
        accuracy.same_schema("funds.accuracy(ok)")?;
        let sources: Vec<&String> = accuracy
            .golden
            .json
            .as_object()
            .map(|map| map.keys().collect())
            .unwrap_or_default();
        if sources.len() < 2 {
            bail!(
                "funds.accuracy(ok) expected at least 2 sources, got {}",
                sources.len()
            );
        }
        if !sources.iter().any(|s| s.as_str() == "eastmoney") {
            bail!(
                "funds.accuracy(ok) expected source eastmoney, sources=[{}]",
                sources.iter().map(|s| s.as_str()).collect::<Vec<_>>().join(",")
            );
        }

        schema_step(
            ctx,
            "funds.batch_estimate(bad)",
            Request::post("/api/funds/batch_estimate/", json!({})),
        )
        .await?;
        schema_step(
            ctx,
            "funds.batch_estimate(missing fund)",
            Request::post(
                "/api/funds/batch_estimate/",
                json!({"fund_codes": [MISSING_FUND_CODE]}),
            ),
        )
        .await?;
        schema_step(
            ctx,
            "funds.batch_update_nav(bad)",
            Request::post("/api/funds/batch_update_nav/", json!({})),
        )
        .await?;
        schema_step(
            ctx,
            "funds.batch_update_nav(missing fund)",
            Request::post(
                "/api/funds/batch_update_nav/",
                json!({"fund_codes": [MISSING_FUND_CODE]}),
            ),
        )
        .await?;

        let missing =
            query_nav(ctx, "funds.query_nav(404)", MISSING_FUND_CODE, "2024-01-15").await?;
        missing.same_status("funds.query_nav(404)")?;
        missing.same_schema("funds.query_nav(404)")?;

        // Seeded history answers without an upstream fetch
        let step = "funds.query_nav(ok)";
        let seeded = query_nav(ctx, step, SEED_FUND_CODE, QUERY_NAV_DATE).await?;
        seeded.expect_status(step, 200)?;
        seeded.same_schema(step)?;
        match seeded.golden.field("nav_date") {
            Some(Value::String(date)) if date == QUERY_NAV_EXPECTED_NAV_DATE => Ok(()),
            other => bail!(
                "{} expected nav_date={}, got {}",
                step,
                QUERY_NAV_EXPECTED_NAV_DATE,
                other.map(Value::to_string).unwrap_or_else(|| "undefined".to_string())
            ),
        }
    }
}
