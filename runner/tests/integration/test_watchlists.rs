//! Tests for the `watchlists` case.

use serde_json::json;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, ResponseTemplate};

use super::targets::{mount, run_case, Targets};

/// A refused create compares only the error schema and ends the case.
#[tokio::test]
async fn test_watchlists_refused_create_compares_schema() {
    let targets = Targets::start().await;
    targets.mount_admin().await;

    for (server, detail) in [
        (&targets.golden, "forbidden"),
        (&targets.candidate, "not allowed"),
    ] {
        Mock::given(method("POST"))
            .and(path("/api/watchlists/"))
            .and(header("authorization", "Bearer token"))
            .respond_with(ResponseTemplate::new(403).set_body_json(json!({"detail": detail})))
            .expect(1)
            .mount(server)
            .await;
    }

    let result = run_case("watchlists", &targets.context()).await;
    assert!(result.is_ok(), "watchlists should pass: {:?}", result.err());
}

#[tokio::test]
async fn test_watchlists_refused_create_schema_mismatch() {
    let targets = Targets::start().await;
    targets.mount_admin().await;

    for (server, body) in [
        (&targets.golden, json!({"detail": "forbidden"})),
        (&targets.candidate, json!({"error": "forbidden"})),
    ] {
        Mock::given(method("POST"))
            .and(path("/api/watchlists/"))
            .respond_with(ResponseTemplate::new(403).set_body_json(body))
            .mount(server)
            .await;
    }

    let err = run_case("watchlists", &targets.context()).await.unwrap_err();
    assert!(
        format!("{:#}", err).starts_with("watchlists.create: object key sets differ @ $"),
        "{:#}",
        err
    );
}

/// Failed admin login skips the case without touching watchlists.
#[tokio::test]
async fn test_watchlists_skip_without_admin_session() {
    let targets = Targets::start().await;
    targets.mount_health(true).await;
    targets
        .mount_both("POST", "/api/auth/login", 401, json!({"detail": "bad credentials"}))
        .await;

    for server in [&targets.golden, &targets.candidate] {
        Mock::given(path("/api/watchlists/"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({})))
            .expect(0)
            .mount(server)
            .await;
    }

    let result = run_case("watchlists", &targets.context()).await;
    assert!(result.is_ok());
}

fn watchlist(prefix: &str, name: &str) -> serde_json::Value {
    json!({
        "id": format!("{}-wl", prefix),
        "name": name,
        "created_at": if prefix == "g" { "2026-02-11T08:00:00Z" } else { "2026-02-11T09:30:00Z" },
        "items": []
    })
}

/// Every lifecycle step on one server; `delete_status` answers the final DELETE.
async fn mount_lifecycle(server: &wiremock::MockServer, prefix: &str, delete_status: u16) {
    let detail = format!("/api/watchlists/{}-wl/", prefix);

    mount(server, "POST", "/api/watchlists/", 201, watchlist(prefix, "wl")).await;
    mount(server, "GET", "/api/watchlists/", 200, json!([watchlist(prefix, "wl")])).await;
    mount(server, "GET", &detail, 200, watchlist(prefix, "wl")).await;
    mount(server, "PATCH", &detail, 200, watchlist(prefix, "wl_new")).await;
    mount(
        server,
        "POST",
        &format!("{}items/", detail),
        404,
        json!({"error": "fund not found"}),
    )
    .await;
    mount(
        server,
        "DELETE",
        &format!("{}items/999999/", detail),
        404,
        json!({"error": "fund not in watchlist"}),
    )
    .await;
    mount(
        server,
        "PUT",
        &format!("{}reorder/", detail),
        400,
        json!({"error": "fund_codes must not be empty"}),
    )
    .await;

    let deleted = if delete_status == 204 {
        ResponseTemplate::new(204)
    } else {
        ResponseTemplate::new(delete_status).set_body_json(json!({}))
    };
    Mock::given(method("DELETE"))
        .and(path(detail.as_str()))
        .respond_with(deleted)
        .mount(server)
        .await;
}

/// Full lifecycle with per-target ids; the body-less 204 DELETE ends it.
#[tokio::test]
async fn test_watchlists_full_lifecycle() {
    let targets = Targets::start().await;
    targets.mount_admin().await;
    for (server, prefix) in targets.sides() {
        mount_lifecycle(server, prefix, 204).await;
    }

    let result = run_case("watchlists", &targets.context()).await;
    assert!(result.is_ok(), "watchlists should pass: {:?}", result.err());
}

#[tokio::test]
async fn test_watchlists_delete_must_be_204() {
    let targets = Targets::start().await;
    targets.mount_admin().await;
    mount_lifecycle(&targets.golden, "g", 204).await;
    mount_lifecycle(&targets.candidate, "c", 200).await;

    let err = run_case("watchlists", &targets.context()).await.unwrap_err();
    assert_eq!(
        err.to_string(),
        "watchlists.delete status mismatch: golden=204 candidate=200"
    );
}

#[tokio::test]
async fn test_watchlists_renamed_value_must_match() {
    let targets = Targets::start().await;
    targets.mount_admin().await;
    mount_lifecycle(&targets.golden, "g", 204).await;

    let server = &targets.candidate;
    let detail = "/api/watchlists/c-wl/";
    mount(server, "POST", "/api/watchlists/", 201, watchlist("c", "wl")).await;
    mount(server, "GET", "/api/watchlists/", 200, json!([watchlist("c", "wl")])).await;
    mount(server, "GET", detail, 200, watchlist("c", "wl")).await;
    mount(server, "PATCH", detail, 200, watchlist("c", "wl")).await;

    let err = run_case("watchlists", &targets.context()).await.unwrap_err();
    assert_eq!(
        format!("{:#}", err),
        "watchlists.patch: value mismatch @ $.name: golden=wl_new candidate=wl"
    );
}
