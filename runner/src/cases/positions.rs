use std::fmt;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde_json::json;

use super::support::{
    encode_query, str_field, unique_name, AuthSession, CaseContext, Pair, Request,
};
use crate::registry::Case;

const MISSING_ID: &str = "00000000-0000-0000-0000-000000000000";

/// Positions and operations, mostly error branches; schema comparison only.
pub struct Positions;

/// Account creation step that did not answer 201.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct NotCreated {
    pub step: String,
    pub status: u16,
}

impl fmt::Display for NotCreated {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} status is not 201: {}", self.step, self.status)
    }
}

/// Parent and child account ids on both targets.
pub(crate) struct AccountPair {
    pub parent: Pair<String>,
    pub child: Pair<String>,
}

/// Create a parent account and a child under it on both targets; both must return 201.
pub(crate) async fn create_account_pair(
    ctx: &CaseContext,
    sessions: &Pair<AuthSession>,
    name: &str,
    purpose: &str,
) -> Result<std::result::Result<AccountPair, NotCreated>> {
    let step = format!("accounts.create(for {})", purpose);
    let parent = ctx
        .both_authed(
            &step,
            sessions,
            Request::post(
                "/api/accounts/",
                json!({"name": name, "parent": null, "is_default": false}),
            ),
        )
        .await?;
    let status = parent.same_status(&step)?;
    if status != 201 {
        return Ok(Err(NotCreated { step, status }));
    }
    let parent_ids = parent.try_map(|_, r| str_field(&r.json, "id").context(step.clone()))?;

    let step = format!("accounts.create(child for {})", purpose);
    let child_name = format!("{}_child", name);
    let child = ctx
        .each_authed(&step, sessions, |side| {
            Request::post(
                "/api/accounts/",
                json!({"name": child_name, "parent": parent_ids[side], "is_default": false}),
            )
        })
        .await?;
    let status = child.same_status(&step)?;
    if status != 201 {
        return Ok(Err(NotCreated { step, status }));
    }
    let child_ids = child.try_map(|_, r| str_field(&r.json, "id").context(step.clone()))?;

    Ok(Ok(AccountPair {
        parent: parent_ids,
        child: child_ids,
    }))
}

#[async_trait]
impl Case for Positions {
    fn name(&self) -> &'static str {
        "positions"
    }

    async fn run(&self, ctx: &CaseContext) -> Result<()> {
        if !ctx.both_initialized(self.name()).await? {
            return Ok(());
        }
        let Some(sessions) = ctx.admin_sessions(self.name()).await? else {
            return Ok(());
        };

        // A child account for the operation error branch
        let name = unique_name("acct_pos");
        let child_ids = match create_account_pair(ctx, &sessions, &name, "positions").await? {
            Ok(accounts) => accounts.child,
            Err(not_created) => bail!("{}", not_created),
        };

        let list = ctx
            .both_authed("positions.list", &sessions, Request::get("/api/positions/"))
            .await?;
        list.expect_status("positions.list", 200)?;
        list.same_schema("positions.list")?;

        let filtered = ctx
            .each_authed("positions.list(filter)", &sessions, |side| {
                Request::get(format!(
                    "/api/positions/?account={}",
                    encode_query(&child_ids[side])
                ))
            })
            .await?;
        filtered.same_status("positions.list(filter)")?;
        filtered.same_schema("positions.list(filter)")?;

        let operations = ctx
            .both_authed(
                "operations.list",
                &sessions,
                Request::get("/api/positions/operations/"),
            )
            .await?;
        operations.expect_status("operations.list", 200)?;
        operations.same_schema("operations.list")?;

        let step = "operations.create(missing fund)";
        let missing_fund_code = unique_name("no_such");
        let created = ctx
            .each_authed(step, &sessions, |side| {
                Request::post(
                    "/api/positions/operations/",
                    json!({
                        "account": child_ids[side],
                        "fund_code": missing_fund_code,
                        "operation_type": "BUY",
                        "operation_date": "2024-02-11",
                        "before_15": true,
                        "amount": "1000",
                        "share": "100",
                        "nav": "10",
                    }),
                )
            })
            .await?;
        created.same_status(step)?;
        created.same_schema(step)?;

        for (step, path) in [
            ("positions.retrieve(404)", format!("/api/positions/{}/", MISSING_ID)),
            (
                "operations.retrieve(404)",
                format!("/api/positions/operations/{}/", MISSING_ID),
            ),
        ] {
            let missing = ctx.both_authed(step, &sessions, Request::get(path)).await?;
            missing.same_status(step)?;
            missing.same_schema(step)?;
        }

        // Admin-only; the admin session must be allowed
        let recalculated = ctx
            .both_authed(
                "positions.recalculate",
                &sessions,
                Request::post("/api/positions/recalculate/", json!({})),
            )
            .await?;
        recalculated.same_status("positions.recalculate")?;
        recalculated.same_schema("positions.recalculate")
    }
}
