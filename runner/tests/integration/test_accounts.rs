//! Tests for the `accounts` case.

use serde_json::{json, Value};
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use super::targets::{mount, run_case, Targets};

/// Creation time as each target would stamp it.
fn timestamp(prefix: &str, second: u32) -> String {
    let hour = if prefix == "g" { 8 } else { 9 };
    format!("2026-02-11T{:02}:00:{:02}Z", hour, second)
}

fn parent(prefix: &str, children: Value) -> Value {
    json!({
        "id": format!("{}-parent", prefix),
        "name": "acct",
        "parent": null,
        "is_default": true,
        "created_at": timestamp(prefix, 0),
        "children": children
    })
}

fn child(prefix: &str) -> Value {
    json!({
        "id": format!("{}-child", prefix),
        "name": "acct_child",
        "parent": format!("{}-parent", prefix),
        "is_default": false,
        "created_at": timestamp(prefix, 1)
    })
}

/// Account endpoints on one server. `listed_child` is the child row as the list returns it.
async fn mount_accounts(server: &MockServer, prefix: &str, listed_child: Value) {
    Mock::given(method("POST"))
        .and(path("/api/accounts/"))
        .and(body_partial_json(json!({"parent": null})))
        .respond_with(ResponseTemplate::new(201).set_body_json(parent(prefix, json!([]))))
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/accounts/"))
        .and(body_partial_json(json!({"parent": format!("{}-parent", prefix)})))
        .respond_with(ResponseTemplate::new(201).set_body_json(child(prefix)))
        .mount(server)
        .await;

    mount(
        server,
        "GET",
        "/api/accounts/",
        200,
        json!([parent(prefix, json!([child(prefix)])), listed_child]),
    )
    .await;
    mount(
        server,
        "GET",
        &format!("/api/accounts/{}-parent/positions/", prefix),
        200,
        json!([]),
    )
    .await;
    mount(
        server,
        "GET",
        &format!("/api/accounts/{}-parent/", prefix),
        200,
        parent(prefix, json!([child(prefix)])),
    )
    .await;
    mount(
        server,
        "GET",
        &format!("/api/accounts/{}-child/", prefix),
        200,
        child(prefix),
    )
    .await;
}

/// Ids and timestamps differ per target; everything else matches after normalising.
#[tokio::test]
async fn test_accounts_parent_child_lifecycle() {
    let targets = Targets::start().await;
    targets.mount_admin().await;
    for (server, prefix) in targets.sides() {
        mount_accounts(server, prefix, child(prefix)).await;
    }

    let result = run_case("accounts", &targets.context()).await;
    assert!(result.is_ok(), "accounts should pass: {:?}", result.err());
}

#[tokio::test]
async fn test_accounts_listed_child_must_not_have_children() {
    let targets = Targets::start().await;
    targets.mount_admin().await;
    mount_accounts(&targets.golden, "g", child("g")).await;

    let mut nested = child("c");
    nested["children"] = json!([]);
    mount_accounts(&targets.candidate, "c", nested).await;

    let err = run_case("accounts", &targets.context()).await.unwrap_err();
    assert_eq!(
        err.to_string(),
        "accounts.list child must not have a children field"
    );
}

#[tokio::test]
async fn test_accounts_child_must_be_nested_under_parent() {
    let targets = Targets::start().await;
    targets.mount_admin().await;
    mount_accounts(&targets.golden, "g", child("g")).await;

    // Higher priority list without the nesting
    Mock::given(method("GET"))
        .and(path("/api/accounts/"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!([parent("c", json!([])), child("c")])),
        )
        .with_priority(1)
        .mount(&targets.candidate)
        .await;
    mount_accounts(&targets.candidate, "c", child("c")).await;

    let err = run_case("accounts", &targets.context()).await.unwrap_err();
    assert_eq!(
        err.to_string(),
        "accounts.list parent children do not contain the child"
    );
}

#[tokio::test]
async fn test_accounts_name_difference_fails_create() {
    let targets = Targets::start().await;
    targets.mount_admin().await;
    mount_accounts(&targets.golden, "g", child("g")).await;

    let mut renamed = parent("c", json!([]));
    renamed["name"] = json!("account");
    Mock::given(method("POST"))
        .and(path("/api/accounts/"))
        .respond_with(ResponseTemplate::new(201).set_body_json(renamed))
        .mount(&targets.candidate)
        .await;

    let err = run_case("accounts", &targets.context()).await.unwrap_err();
    assert_eq!(
        format!("{:#}", err),
        "accounts.create(parent): value mismatch @ $.name: golden=acct candidate=account"
    );
}
