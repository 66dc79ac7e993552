use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::{json, Value};

use super::support::{encode_query, AuthSession, CaseContext, Pair, Request};
use crate::registry::Case;
use crate::seed::fixture::{NAV_WINDOW_END, NAV_WINDOW_START, SEED_FUND_CODE};

const MISSING_ID: &str = "00000000-0000-0000-0000-000000000000";
const MISSING_FUND_CODE: &str = "999999";
const INVALID_TOKEN: &str = "invalid-token-for-contract-tests";

/// More codes than an anonymous sync may request.
const OVERSIZED_SYNC_CODES: u32 = 16;

/// NAV history list, retrieve, batch query and sync guards.
pub struct NavHistory;

fn oversized_sync_codes() -> Vec<String> {
    (0..OVERSIZED_SYNC_CODES)
        .map(|i| (100_000 + i).to_string())
        .collect()
}

async fn schema_step(ctx: &CaseContext, step: &str, request: Request) -> Result<()> {
    let responses = ctx.both(step, request).await?;
    responses.same_status(step)?;
    responses.same_schema(step)
}

impl NavHistory {
    /// Seeded window must come back non-empty from the list and batch query endpoints.
    async fn seeded_window(&self, ctx: &CaseContext) -> Result<()> {
        let step = "nav-history.list(seed filter)";
        let list = ctx
            .both(
                step,
                Request::get(format!(
                    "/api/nav-history/?fund_code={}&start_date={}&end_date={}",
                    encode_query(SEED_FUND_CODE),
                    encode_query(NAV_WINDOW_START),
                    encode_query(NAV_WINDOW_END)
                )),
            )
            .await?;
        list.expect_status(step, 200)?;
        match list.golden.json.as_array() {
            Some(rows) if !rows.is_empty() => {}
            other => bail!(
                "{} expected a non-empty array, got length={}",
                step,
                other.map(|rows| rows.len().to_string()).unwrap_or_else(|| "undefined".to_string())
            ),
        }
        list.same_schema(step)?;

        let step = "nav-history.batch_query(seed ok)";
        let batch = ctx
            .both(
                step,
                Request::post(
                    "/api/nav-history/batch_query/",
                    json!({
                        "fund_codes": [SEED_FUND_CODE],
                        "start_date": NAV_WINDOW_START,
                        "end_date": NAV_WINDOW_END,
                    }),
                ),
            )
            .await?;
        batch.expect_status(step, 200)?;
        let rows = batch.golden.json.get(SEED_FUND_CODE).and_then(Value::as_array);
        if rows.map_or(true, |rows| rows.is_empty()) {
            bail!("{} expected a non-empty array for {}", step, SEED_FUND_CODE);
        }
        batch.same_schema(step)
    }
}

#[async_trait]
impl Case for NavHistory {
    fn name(&self) -> &'static str {
        "nav_history"
    }

    async fn run(&self, ctx: &CaseContext) -> Result<()> {
        schema_step(ctx, "nav-history.list", Request::get("/api/nav-history/")).await?;

        // Without seeded rows the list is empty and the schema check stays shallow
        if ctx.db_cases {
            self.seeded_window(ctx).await?;
        }

        schema_step(
            ctx,
            "nav-history.retrieve(404)",
            Request::get(format!("/api/nav-history/{}/", MISSING_ID)),
        )
        .await?;
        schema_step(
            ctx,
            "nav-history.batch_query(bad)",
            Request::post("/api/nav-history/batch_query/", json!({})),
        )
        .await?;
        schema_step(
            ctx,
            "nav-history.batch_query(ok missing fund)",
            Request::post(
                "/api/nav-history/batch_query/",
                json!({"fund_codes": [MISSING_FUND_CODE]}),
            ),
        )
        .await?;
        schema_step(
            ctx,
            "nav-history.sync(bad)",
            Request::post("/api/nav-history/sync/", json!({})),
        )
        .await?;

        let codes = json!({"fund_codes": oversized_sync_codes()});
        schema_step(
            ctx,
            "nav-history.sync(>15 forbidden)",
            Request::post("/api/nav-history/sync/", codes.clone()),
        )
        .await?;

        // An invalid bearer token is rejected by authentication before the size check
        let invalid = AuthSession {
            access_token: INVALID_TOKEN.to_string(),
            refresh_token: String::new(),
        };
        let sessions = Pair::new(invalid.clone(), invalid);
        let step = "nav-history.sync(>15 invalid token)";
        let rejected = ctx
            .both_authed(step, &sessions, Request::post("/api/nav-history/sync/", codes))
            .await?;
        rejected.same_status(step)?;
        rejected.same_schema(step)
    }
}
