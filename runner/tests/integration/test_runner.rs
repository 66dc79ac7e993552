//! Runner-level tests over real registered cases against mock targets.

use serde_json::json;
use tokio_util::sync::CancellationToken;

use contract_runner::cases;
use contract_runner::registry::run_cases;

use super::targets::{mount, Targets};

fn progress_labels(out: Vec<u8>) -> Vec<String> {
    String::from_utf8(out)
        .expect("stdout should be UTF-8")
        .lines()
        .map(|line| line.split(" (").next().unwrap_or_default().to_string())
        .collect()
}

/// One failing case is reported and the rest still run.
#[tokio::test]
async fn test_run_reports_failures_and_continues() {
    let targets = Targets::start().await;
    targets.mount_health(false).await;
    mount(
        &targets.golden,
        "GET",
        "/api/sources/",
        200,
        json!([{"name": "eastmoney"}]),
    )
    .await;
    mount(
        &targets.candidate,
        "GET",
        "/api/sources/",
        200,
        json!([{"name": "tiantian"}]),
    )
    .await;

    let registry = cases::registry();
    let requested = vec!["sources".to_string(), "health".to_string(), "auth".to_string()];
    let selected = registry.select(&requested).expect("cases are registered");

    let mut out = Vec::new();
    let report = run_cases(&selected, &targets.context(), &CancellationToken::new(), &mut out)
        .await
        .expect("writing progress should not fail");

    // Registry order, not request order
    assert_eq!(
        progress_labels(out),
        vec!["PASS health", "PASS auth", "FAIL sources"]
    );
    assert!(!report.passed());
    assert!(!report.cancelled);

    let mut err = Vec::new();
    report.write_failures(&mut err).expect("writing failures should not fail");
    assert_eq!(
        String::from_utf8(err).unwrap(),
        "\n[sources] sources lists differ: golden=eastmoney candidate=tiantian\n"
    );
}

#[tokio::test]
async fn test_run_all_passing() {
    let targets = Targets::start().await;
    targets.mount_health(false).await;
    targets
        .mount_both("GET", "/api/sources/", 200, json!([{"name": "eastmoney"}]))
        .await;

    let registry = cases::registry();
    let requested = vec!["health".to_string(), "sources".to_string(), "funds".to_string()];
    let selected = registry.select(&requested).expect("cases are registered");

    let mut out = Vec::new();
    let report = run_cases(&selected, &targets.context(), &CancellationToken::new(), &mut out)
        .await
        .expect("writing progress should not fail");

    assert!(report.passed());
    assert_eq!(
        progress_labels(out),
        vec!["PASS health", "PASS sources", "PASS funds"]
    );
    assert_eq!(report.failures().count(), 0);
}

/// A transport failure against one target fails that case only.
#[tokio::test]
async fn test_unreachable_candidate_fails_each_case() {
    let targets = Targets::start().await;
    targets.mount_health(false).await;
    let ctx = cases::CaseContext::for_targets(
        &targets.golden.uri(),
        "http://127.0.0.1:1",
    )
    .expect("context should build");

    let registry = cases::registry();
    let selected = registry
        .select(&["health".to_string()])
        .expect("case is registered");

    let mut out = Vec::new();
    let report = run_cases(&selected, &ctx, &CancellationToken::new(), &mut out)
        .await
        .expect("writing progress should not fail");

    assert_eq!(progress_labels(out), vec!["FAIL health"]);
    let error = report.results[0].error.clone().unwrap_or_default();
    assert!(
        error.starts_with("health (candidate): GET http://127.0.0.1:1/api/health/ failed"),
        "{}",
        error
    );
}
