use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde_json::{json, Value};

use super::support::{array_len, same_shape, str_field, unique_name, CaseContext, Pair, Request};
use crate::registry::Case;

/// Parent and child accounts: create, list, positions, retrieve.
///
/// Payloads are compared exactly after ids and timestamps are replaced by placeholders.
pub struct Accounts;

/// Replace generated ids and timestamps so two systems' accounts compare equal.
fn normalize_account(value: &Value) -> Value {
    let Value::Object(map) = value else {
        return value.clone();
    };
    let mut map = map.clone();
    for (key, placeholder) in [
        ("id", "uuid"),
        ("created_at", "ts"),
        ("updated_at", "ts"),
        ("parent", "uuid"),
    ] {
        if let Some(field) = map.get_mut(key) {
            if field.is_string() {
                *field = Value::String(placeholder.to_string());
            }
        }
    }
    if let Some(Value::Array(children)) = map.get_mut("children") {
        for child in children.iter_mut() {
            *child = normalize_account(child);
        }
    }
    Value::Object(map)
}

fn same_account(step: &str, golden: &Value, candidate: &Value) -> Result<()> {
    same_shape(
        step,
        &normalize_account(golden),
        &normalize_account(candidate),
        &[],
    )
}

fn find_by_id<'a>(list: &'a [Value], id: &str) -> Option<&'a Value> {
    list.iter()
        .find(|item| item.get("id").and_then(Value::as_str) == Some(id))
}

/// Parent and child from the account list, checking that the parent nests the child and the
/// child has no `children` key.
fn parent_and_child<'a>(
    list: &'a Value,
    parent_id: &str,
    child_id: &str,
) -> Result<(&'a Value, &'a Value)> {
    let Some(items) = list.as_array() else {
        bail!("accounts.list response is not an array");
    };
    let parent = find_by_id(items, parent_id).context("accounts.list does not contain the parent")?;
    let child = find_by_id(items, child_id).context("accounts.list does not contain the child")?;

    let Some(children) = parent.get("children").and_then(Value::as_array) else {
        bail!("accounts.list parent has no children array");
    };
    if find_by_id(children, child_id).is_none() {
        bail!("accounts.list parent children do not contain the child");
    }
    if child.get("children").is_some() {
        bail!("accounts.list child must not have a children field");
    }
    Ok((parent, child))
}

#[async_trait]
impl Case for Accounts {
    fn name(&self) -> &'static str {
        "accounts"
    }

    async fn run(&self, ctx: &CaseContext) -> Result<()> {
        if !ctx.both_initialized(self.name()).await? {
            return Ok(());
        }
        let Some(sessions) = ctx.admin_sessions(self.name()).await? else {
            return Ok(());
        };

        let name = unique_name("acct");

        let step = "accounts.create(parent)";
        let parent = ctx
            .both_authed(
                step,
                &sessions,
                Request::post(
                    "/api/accounts/",
                    json!({"name": name, "parent": null, "is_default": true}),
                ),
            )
            .await?;
        parent.same_status(step)?;
        same_account(step, &parent.golden.json, &parent.candidate.json)?;
        let parent_ids = parent.try_map(|_, r| str_field(&r.json, "id").context(step))?;

        let step = "accounts.create(child)";
        let child_name = format!("{}_child", name);
        let child = ctx
            .each_authed(step, &sessions, |side| {
                Request::post(
                    "/api/accounts/",
                    json!({"name": child_name, "parent": parent_ids[side], "is_default": false}),
                )
            })
            .await?;
        child.same_status(step)?;
        same_account(step, &child.golden.json, &child.candidate.json)?;
        let child_ids = child.try_map(|_, r| str_field(&r.json, "id").context(step))?;

        let step = "accounts.list";
        let list = ctx
            .both_authed(step, &sessions, Request::get("/api/accounts/"))
            .await?;
        list.same_status(step)?;
        let golden = parent_and_child(&list.golden.json, &parent_ids.golden, &child_ids.golden)?;
        let candidate =
            parent_and_child(&list.candidate.json, &parent_ids.candidate, &child_ids.candidate)?;
        same_account("accounts.list(parent)", golden.0, candidate.0)?;
        same_account("accounts.list(child)", golden.1, candidate.1)?;

        let step = "accounts.positions";
        let positions = ctx
            .each_authed(step, &sessions, |side| {
                Request::get(format!("/api/accounts/{}/positions/", parent_ids[side]))
            })
            .await?;
        positions.same_status(step)?;
        positions.same_shape(step, &[])?;
        let lengths = Pair::new(
            array_len(step, &positions.golden.json)?,
            array_len(step, &positions.candidate.json)?,
        );
        if lengths.golden != lengths.candidate {
            bail!(
                "{} count mismatch: golden={} candidate={}",
                step,
                lengths.golden,
                lengths.candidate
            );
        }

        let step = "accounts.retrieve(parent)";
        let parent_detail = ctx
            .each_authed(step, &sessions, |side| {
                Request::get(format!("/api/accounts/{}/", parent_ids[side]))
            })
            .await?;
        parent_detail.same_status(step)?;
        let has_children = parent_detail.map(|r| r.json.get("children").is_some_and(Value::is_array));
        if !has_children.golden || !has_children.candidate {
            bail!("{} children is not an array", step);
        }
        same_account(step, &parent_detail.golden.json, &parent_detail.candidate.json)?;

        let step = "accounts.retrieve(child)";
        let child_detail = ctx
            .each_authed(step, &sessions, |side| {
                Request::get(format!("/api/accounts/{}/", child_ids[side]))
            })
            .await?;
        child_detail.same_status(step)?;
        if child_detail.golden.json.get("children").is_some()
            || child_detail.candidate.json.get("children").is_some()
        {
            bail!("{} child account must not have a children field", step);
        }
        same_account(step, &child_detail.golden.json, &child_detail.candidate.json)
    }
}
