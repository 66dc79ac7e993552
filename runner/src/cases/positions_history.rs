use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use tracing::info;

use super::positions::create_account_pair;
use super::support::{encode_query, unique_name, CaseContext, Request};
use crate::registry::Case;
use crate::seed::fixture::SEED_FUND_CODE;

const HISTORY_DAYS: u32 = 7;

/// Position history: argument errors, parent rejection, and a child with one buy.
pub struct PositionsHistory;

#[async_trait]
impl Case for PositionsHistory {
    fn name(&self) -> &'static str {
        "positions_history"
    }

    async fn run(&self, ctx: &CaseContext) -> Result<()> {
        if !ctx.both_initialized(self.name()).await? {
            return Ok(());
        }
        let Some(sessions) = ctx.admin_sessions(self.name()).await? else {
            return Ok(());
        };

        let name = unique_name("acct_hist");
        let (parent_ids, child_ids) =
            match create_account_pair(ctx, &sessions, &name, "positions_history").await? {
                Ok(accounts) => (accounts.parent, accounts.child),
                Err(not_created) => {
                    info!("[CASE:{}] skipped: {}", self.name(), not_created);
                    return Ok(());
                }
            };

        let step = "positions.history(missing account_id)";
        let missing = ctx
            .both_authed(step, &sessions, Request::get("/api/positions/history/"))
            .await?;
        missing.same_status(step)?;
        missing.same_schema(step)?;

        let step = "positions.history(parent account)";
        let parent = ctx
            .each_authed(step, &sessions, |side| {
                Request::get(format!(
                    "/api/positions/history/?account_id={}&days={}",
                    encode_query(&parent_ids[side]),
                    HISTORY_DAYS
                ))
            })
            .await?;
        parent.same_status(step)?;
        parent.same_schema(step)?;

        // Relies on the seed fund; unseeded targets answer 400 on both sides
        let step = "operations.create(for positions_history)";
        let today = Utc::now().date_naive().format("%Y-%m-%d").to_string();
        let operation = ctx
            .each_authed(step, &sessions, |side| {
                Request::post(
                    "/api/positions/operations/",
                    json!({
                        "account": child_ids[side],
                        "fund_code": SEED_FUND_CODE,
                        "operation_type": "BUY",
                        "operation_date": today,
                        "before_15": true,
                        "amount": "1000",
                        "share": "100",
                        "nav": "1.0000",
                    }),
                )
            })
            .await?;
        operation.same_status(step)?;

        let step = "positions.history(ok)";
        let history = ctx
            .each_authed(step, &sessions, |side| {
                Request::get(format!(
                    "/api/positions/history/?account_id={}&days={}",
                    encode_query(&child_ids[side]),
                    HISTORY_DAYS
                ))
            })
            .await?;
        let status = history.same_status(step)?;
        history.same_schema(step)?;

        if let (200, Some(golden), Some(candidate)) = (
            status,
            history.golden.json.as_array(),
            history.candidate.json.as_array(),
        ) {
            if golden.len() != candidate.len() {
                bail!(
                    "{} length mismatch: golden={} candidate={}",
                    step,
                    golden.len(),
                    candidate.len()
                );
            }
        }
        Ok(())
    }
}
