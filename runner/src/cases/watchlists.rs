use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde_json::{json, Value};

use super::support::{same_shape, str_field, unique_name, CaseContext, Request};
use crate::registry::Case;

const MISSING_FUND_CODE: &str = "999999";

/// Watchlist lifecycle: create, list, retrieve, rename, item errors, reorder, delete.
pub struct Watchlists;

fn replace_strings(value: &Value, fields: &[(&str, &str)]) -> Value {
    let Value::Object(map) = value else {
        return value.clone();
    };
    let mut map = map.clone();
    for (key, placeholder) in fields {
        if let Some(field) = map.get_mut(*key) {
            if field.is_string() {
                *field = Value::String(placeholder.to_string());
            }
        }
    }
    Value::Object(map)
}

fn normalize_watchlist_item(value: &Value) -> Value {
    replace_strings(value, &[("id", "uuid"), ("fund", "uuid"), ("created_at", "ts")])
}

/// Replace generated ids and timestamps, including those of nested items.
fn normalize_watchlist(value: &Value) -> Value {
    let mut normalized = replace_strings(value, &[("id", "uuid"), ("created_at", "ts")]);
    if let Some(Value::Array(items)) = normalized.get_mut("items") {
        for item in items.iter_mut() {
            *item = normalize_watchlist_item(item);
        }
    }
    normalized
}

fn same_watchlist(step: &str, golden: &Value, candidate: &Value) -> Result<()> {
    same_shape(
        step,
        &normalize_watchlist(golden),
        &normalize_watchlist(candidate),
        &[],
    )
}

fn find_by_id<'a>(list: &'a Value, id: &str) -> Result<&'a Value> {
    let Some(items) = list.as_array() else {
        bail!("watchlists.list response is not an array");
    };
    items
        .iter()
        .find(|item| item.get("id").and_then(Value::as_str) == Some(id))
        .context("watchlists.list does not contain the new watchlist")
}

#[async_trait]
impl Case for Watchlists {
    fn name(&self) -> &'static str {
        "watchlists"
    }

    async fn run(&self, ctx: &CaseContext) -> Result<()> {
        if !ctx.both_initialized(self.name()).await? {
            return Ok(());
        }
        let Some(sessions) = ctx.admin_sessions(self.name()).await? else {
            return Ok(());
        };

        let name = unique_name("wl");

        let step = "watchlists.create";
        let created = ctx
            .both_authed(
                step,
                &sessions,
                Request::post("/api/watchlists/", json!({"name": name})),
            )
            .await?;
        if created.same_status(step)? != 201 {
            return created.same_schema(step);
        }
        same_watchlist(step, &created.golden.json, &created.candidate.json)?;
        let ids = created.try_map(|_, r| str_field(&r.json, "id").context(step))?;

        let step = "watchlists.list";
        let list = ctx
            .both_authed(step, &sessions, Request::get("/api/watchlists/"))
            .await?;
        list.same_status(step)?;
        list.same_schema(step)?;
        same_watchlist(
            step,
            find_by_id(&list.golden.json, &ids.golden)?,
            find_by_id(&list.candidate.json, &ids.candidate)?,
        )?;

        let step = "watchlists.retrieve";
        let detail = ctx
            .each_authed(step, &sessions, |side| {
                Request::get(format!("/api/watchlists/{}/", ids[side]))
            })
            .await?;
        detail.same_status(step)?;
        same_watchlist(step, &detail.golden.json, &detail.candidate.json)?;

        let step = "watchlists.patch";
        let new_name = format!("{}_new", name);
        let patched = ctx
            .each_authed(step, &sessions, |side| {
                Request::patch(
                    format!("/api/watchlists/{}/", ids[side]),
                    json!({"name": new_name}),
                )
            })
            .await?;
        patched.same_status(step)?;
        same_watchlist(step, &patched.golden.json, &patched.candidate.json)?;

        let step = "watchlists.items.add(missing)";
        let added = ctx
            .each_authed(step, &sessions, |side| {
                Request::post(
                    format!("/api/watchlists/{}/items/", ids[side]),
                    json!({"fund_code": MISSING_FUND_CODE}),
                )
            })
            .await?;
        added.same_status(step)?;
        added.same_shape(step, &[])?;

        let step = "watchlists.items.remove(missing)";
        let removed = ctx
            .each_authed(step, &sessions, |side| {
                Request::delete(format!(
                    "/api/watchlists/{}/items/{}/",
                    ids[side], MISSING_FUND_CODE
                ))
            })
            .await?;
        removed.same_status(step)?;
        removed.same_shape(step, &[])?;

        let step = "watchlists.reorder(bad)";
        let reordered = ctx
            .each_authed(step, &sessions, |side| {
                Request::put(
                    format!("/api/watchlists/{}/reorder/", ids[side]),
                    json!({"fund_codes": []}),
                )
            })
            .await?;
        reordered.same_status(step)?;
        reordered.same_shape(step, &[])?;

        // 204 with no body; status only
        let step = "watchlists.delete";
        let deleted = ctx
            .each_authed(step, &sessions, |side| {
                Request::delete(format!("/api/watchlists/{}/", ids[side]))
            })
            .await?;
        deleted.expect_status(step, 204)
    }
}
