//! Tests for `Probe` request shaping and response parsing.

use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use contract::{Probe, ProbeError};

fn probe() -> Probe {
    Probe::new(Some(Duration::from_secs(5)), None).expect("client should build")
}

// ============================================================================
// TEST: GET
// ============================================================================

#[tokio::test]
async fn test_get_json_sets_accept_and_parses_body() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/health/"))
        .and(header("accept", "application/json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "healthy",
            "database": "connected",
            "system_initialized": true
        })))
        .expect(1)
        .mount(&server)
        .await;

    let response = probe()
        .get_json(&format!("{}/api/health/", server.uri()))
        .await
        .expect("health should parse");

    assert_eq!(response.status, 200);
    assert_eq!(response.field("system_initialized"), Some(&json!(true)));
}

/// Status codes are reported, never interpreted.
#[tokio::test]
async fn test_error_status_is_returned_not_raised() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/funds/missing/"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({"detail": "Not found."})))
        .mount(&server)
        .await;

    let response = probe()
        .get_json(&format!("{}/api/funds/missing/", server.uri()))
        .await
        .expect("404 with JSON body is a response");

    assert_eq!(response.status, 404);
    assert_eq!(response.json, json!({"detail": "Not found."}));
}

// ============================================================================
// TEST: BODIES AND AUTH
// ============================================================================

#[tokio::test]
async fn test_post_json_sends_json_body() {
    let server = MockServer::start().await;
    let credentials = json!({"username": "admin", "password": "admin123"});

    Mock::given(method("POST"))
        .and(path("/api/auth/login"))
        .and(header("content-type", "application/json"))
        .and(header("accept", "application/json"))
        .and(body_json(&credentials))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access_token": "a"})))
        .expect(1)
        .mount(&server)
        .await;

    let response = probe()
        .post_json(&format!("{}/api/auth/login", server.uri()), &credentials)
        .await
        .expect("login should parse");

    assert_eq!(response.status, 200);
}

#[tokio::test]
async fn test_bearer_variants_send_authorization() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/auth/me"))
        .and(header("authorization", "Bearer token-123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"username": "admin"})))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("PATCH"))
        .and(path("/api/watchlists/1/"))
        .and(header("authorization", "Bearer token-123"))
        .and(body_json(json!({"name": "renamed"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"name": "renamed"})))
        .expect(1)
        .mount(&server)
        .await;

    let probe = probe();
    let me = probe
        .get_json_bearer(&format!("{}/api/auth/me", server.uri()), "token-123")
        .await
        .unwrap();
    assert_eq!(me.json, json!({"username": "admin"}));

    let patched = probe
        .patch_json_bearer(
            &format!("{}/api/watchlists/1/", server.uri()),
            &json!({"name": "renamed"}),
            "token-123",
        )
        .await
        .unwrap();
    assert_eq!(patched.json, json!({"name": "renamed"}));
}

#[tokio::test]
async fn test_delete_with_empty_body_yields_null() {
    let server = MockServer::start().await;

    Mock::given(method("DELETE"))
        .and(path("/api/watchlists/1/"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let response = probe()
        .delete_json_bearer(&format!("{}/api/watchlists/1/", server.uri()), "t")
        .await
        .expect("204 should be accepted");

    assert_eq!(response.status, 204);
    assert!(response.json.is_null());
}

// ============================================================================
// TEST: FAILURES
// ============================================================================

#[tokio::test]
async fn test_non_json_body_reports_bounded_prefix() {
    let server = MockServer::start().await;
    let html = format!("<html>{}</html>", "x".repeat(1000));

    Mock::given(method("GET"))
        .and(path("/api/health/"))
        .respond_with(ResponseTemplate::new(502).set_body_string(html))
        .mount(&server)
        .await;

    let url = format!("{}/api/health/", server.uri());
    let err = probe().get_json(&url).await.expect_err("HTML is not JSON");

    match &err {
        ProbeError::NonJson { url: u, status, body } => {
            assert_eq!(u, &url);
            assert_eq!(*status, 502);
            assert_eq!(body.chars().count(), 200);
            assert!(body.starts_with("<html>"));
        }
        other => panic!("expected NonJson, got {:?}", other),
    }
    assert!(err.to_string().contains("status=502"));
}

#[tokio::test]
async fn test_empty_get_body_is_not_json() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let err = probe()
        .get_json(&format!("{}/api/health/", server.uri()))
        .await
        .expect_err("empty body is only accepted for DELETE");
    assert!(matches!(err, ProbeError::NonJson { status: 200, .. }));
}

#[tokio::test]
async fn test_timeout_is_a_transport_error() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({}))
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;

    let probe = Probe::new(Some(Duration::from_millis(200)), None).unwrap();
    let err = probe
        .get_json(&format!("{}/api/health/", server.uri()))
        .await
        .expect_err("request should time out");

    assert!(matches!(err, ProbeError::Transport { .. }));
    assert!(err.is_timeout());
}

#[tokio::test]
async fn test_connection_refused_is_a_transport_error() {
    // Bind then drop to get a port with nothing listening
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };

    let err = probe()
        .get_json(&format!("http://127.0.0.1:{}/api/health/", port))
        .await
        .expect_err("nothing is listening");

    assert!(matches!(err, ProbeError::Transport { .. }));
    assert!(err.to_string().starts_with("GET http://127.0.0.1:"));
}
