//! Tests for the `auth` and `users` cases.

use serde_json::json;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use super::targets::{run_case, Targets};

async fn mount_session(server: &MockServer, prefix: &str, user_id: u32) {
    Mock::given(method("POST"))
        .and(path("/api/auth/login"))
        .and(body_json(json!({"username": "admin", "password": "admin123"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": format!("{}-access", prefix),
            "refresh_token": format!("{}-refresh", prefix),
            "user": {"id": user_id, "username": "admin", "role": "admin"}
        })))
        .expect(1)
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path("/api/auth/refresh"))
        .and(body_json(json!({"refresh_token": format!("{}-refresh", prefix)})))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"access_token": format!("{}-access-2", prefix)})),
        )
        .expect(1)
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/auth/me"))
        .and(header("authorization", format!("Bearer {}-access", prefix).as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": user_id,
            "username": "admin",
            "created_at": format!("2026-02-1{}T00:00:00Z", user_id)
        })))
        .expect(1)
        .mount(server)
        .await;
}

// ============================================================================
// TEST: AUTH
// ============================================================================

/// Each target is driven with its own tokens; tokens and ids may differ.
#[tokio::test]
async fn test_auth_uses_per_target_sessions() {
    let targets = Targets::start().await;
    targets.mount_health(true).await;
    mount_session(&targets.golden, "golden", 1).await;
    mount_session(&targets.candidate, "candidate", 2).await;

    let result = run_case("auth", &targets.context()).await;
    assert!(result.is_ok(), "auth should pass: {:?}", result.err());
}

/// Uninitialised systems are skipped before any login.
#[tokio::test]
async fn test_auth_skips_when_not_initialized() {
    let targets = Targets::start().await;
    targets.mount_health(false).await;

    Mock::given(method("POST"))
        .and(path("/api/auth/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(0)
        .mount(&targets.golden)
        .await;

    let result = run_case("auth", &targets.context()).await;
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_auth_login_role_difference_fails() {
    let targets = Targets::start().await;
    targets.mount_health(true).await;

    for (server, role) in [(&targets.golden, "admin"), (&targets.candidate, "user")] {
        Mock::given(method("POST"))
            .and(path("/api/auth/login"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "a",
                "refresh_token": "r",
                "user": {"id": 1, "role": role}
            })))
            .mount(server)
            .await;
    }

    let err = run_case("auth", &targets.context()).await.unwrap_err();
    assert_eq!(
        format!("{:#}", err),
        "auth.login: value mismatch @ $.user.role: golden=admin candidate=user"
    );
}

// ============================================================================
// TEST: USERS
// ============================================================================

/// Closed registration stops the case after a shape comparison.
#[tokio::test]
async fn test_users_closed_registration_compares_shape_only() {
    let targets = Targets::start().await;
    targets.mount_health(true).await;
    targets
        .mount_both(
            "POST",
            "/api/auth/login",
            401,
            json!({"detail": "invalid credentials"}),
        )
        .await;
    targets
        .mount_both(
            "POST",
            "/api/users/register/",
            403,
            json!({"error": "registration closed"}),
        )
        .await;

    let result = run_case("users", &targets.context()).await;
    assert!(result.is_ok(), "users should pass: {:?}", result.err());
}

/// Registration answers 201 once, then 400 for the same username.
async fn mount_registration(server: &MockServer, duplicate_status: u16) {
    Mock::given(method("POST"))
        .and(path("/api/users/register/"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "access_token": "fresh-access",
            "refresh_token": "fresh-refresh",
            "user": {"id": 42, "username": "newuser", "role": "user"}
        })))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/users/register/"))
        .respond_with(
            ResponseTemplate::new(duplicate_status)
                .set_body_json(json!({"username": ["A user with that username already exists."]})),
        )
        .mount(server)
        .await;
}

async fn mount_summary(targets: &Targets) {
    targets.mount_admin().await;
    targets
        .mount_both(
            "GET",
            "/api/users/me/summary/",
            200,
            json!({"account_count": 0, "position_count": 0, "watchlist_count": 0}),
        )
        .await;
}

#[tokio::test]
async fn test_users_register_then_duplicate() {
    let targets = Targets::start().await;
    mount_summary(&targets).await;
    for (server, _) in targets.sides() {
        mount_registration(server, 400).await;
    }

    let result = run_case("users", &targets.context()).await;
    assert!(result.is_ok(), "users should pass: {:?}", result.err());
}

#[tokio::test]
async fn test_users_duplicate_status_mismatch() {
    let targets = Targets::start().await;
    mount_summary(&targets).await;
    mount_registration(&targets.golden, 400).await;
    mount_registration(&targets.candidate, 409).await;

    let err = run_case("users", &targets.context()).await.unwrap_err();
    assert_eq!(
        err.to_string(),
        "users.register(duplicate) status mismatch: golden=400 candidate=409"
    );
}
