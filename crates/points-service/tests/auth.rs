//! LINE Login integration tests against a mocked LINE API.

mod common;

use axum::http::StatusCode;
use common::TestHarness;
use points_store::Store;
use serde_json::json;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn mock_line(user_id: &str, display_name: &str) -> MockServer {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/oauth2/v2.1/token"))
        .and(body_string_contains("code=auth-code"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "line-access-token",
            "token_type": "Bearer",
            "expires_in": 2_592_000
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v2/profile"))
        .and(header("authorization", "Bearer line-access-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "userId": user_id,
            "displayName": display_name,
            "pictureUrl": "https://profile.example/p.png"
        })))
        .mount(&server)
        .await;

    server
}

/// The `name=value` part of a `Set-Cookie` header.
fn cookie_pair(set_cookie: &str) -> String {
    set_cookie.split(';').next().unwrap_or_default().to_string()
}

#[tokio::test]
async fn login_without_line_config_fails() {
    let harness = TestHarness::new();

    let response = harness.server.get("/api/auth/login").await;

    response.assert_status(StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn login_returns_authorize_url() {
    let line = MockServer::start().await;
    let harness = TestHarness::with_line(&line.uri());

    let response = harness
        .server
        .get("/api/auth/login")
        .add_query_param("tracking_id", "ad-1")
        .add_query_param("page", "/mypage")
        .await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    let url = body["auth_url"].as_str().unwrap();
    assert!(url.starts_with(&format!("{}/oauth2/v2.1/authorize?", line.uri())));
    assert!(url.contains("client_id=1234567890"));
    assert!(url.contains("response_type=code"));
    assert!(url.contains("tracking_id%3Dad-1"));
}

#[tokio::test]
async fn callback_registers_user_and_starts_session() {
    let line = mock_line("U-line-1", "Line Taro").await;
    let harness = TestHarness::with_line(&line.uri());

    let response = harness
        .server
        .get("/api/auth/callback")
        .add_query_param("code", "auth-code")
        .add_query_param("state", "tracking_id=ad-9&page=/mypage")
        .await;

    response.assert_status(StatusCode::SEE_OTHER);
    assert_eq!(response.header("location"), "http://frontend.test/mypage");
    let set_cookie = response.header("set-cookie");
    let set_cookie = set_cookie.to_str().unwrap();
    assert!(set_cookie.contains("HttpOnly"));
    let cookie = cookie_pair(set_cookie);

    let account = harness
        .store
        .get_account_by_external_id("U-line-1")
        .await
        .unwrap()
        .expect("account registered");
    assert_eq!(account.nick_name.as_deref(), Some("Line Taro"));
    assert_eq!(account.tracking_id.as_deref(), Some("ad-9"));
    assert!(account.last_login.is_some());

    let status: serde_json::Value = harness
        .server
        .get("/api/auth/check_login")
        .add_header("cookie", cookie.clone())
        .await
        .json();
    assert_eq!(status["logged_in"], true);
    assert_eq!(status["user_profile"]["user_id"], "U-line-1");
    assert_eq!(
        status["user_profile"]["account_id"],
        account.account_id.as_str()
    );

    let balance: serde_json::Value = harness
        .server
        .get(&format!("/api/points/balance/{}", account.account_id))
        .await
        .json();
    assert_eq!(balance["total_balance"], 0);
}

#[tokio::test]
async fn returning_user_keeps_account() {
    let line = mock_line("U-line-2", "Line Jiro").await;
    let harness = TestHarness::with_line(&line.uri());

    for _ in 0..2 {
        harness
            .server
            .get("/api/auth/callback")
            .add_query_param("code", "auth-code")
            .await
            .assert_status(StatusCode::SEE_OTHER);
    }

    let account = harness
        .store
        .get_account_by_external_id("U-line-2")
        .await
        .unwrap()
        .expect("account registered");
    assert_eq!(
        account.picture_url.as_deref(),
        Some("https://profile.example/p.png")
    );

    let response = harness
        .server
        .post("/api/accounts")
        .add_header("x-admin-key", common::ADMIN_KEY)
        .json(&json!({ "external_id": "U-line-2" }))
        .await;
    response.assert_status(StatusCode::CONFLICT);
}

#[tokio::test]
async fn callback_redirects_to_root_for_foreign_page() {
    let line = mock_line("U-line-3", "Line Saburo").await;
    let harness = TestHarness::with_line(&line.uri());

    let response = harness
        .server
        .get("/api/auth/callback")
        .add_query_param("code", "auth-code")
        .add_query_param("state", "page=//evil.example")
        .await;

    response.assert_status(StatusCode::SEE_OTHER);
    assert_eq!(response.header("location"), "http://frontend.test/");
}

#[tokio::test]
async fn callback_without_code_is_rejected() {
    let line = MockServer::start().await;
    let harness = TestHarness::with_line(&line.uri());

    harness
        .server
        .get("/api/auth/callback")
        .await
        .assert_status_bad_request();
}

#[tokio::test]
async fn failed_token_exchange_is_bad_gateway() {
    let line = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth2/v2.1/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "invalid_grant"
        })))
        .mount(&line)
        .await;
    let harness = TestHarness::with_line(&line.uri());

    harness
        .server
        .get("/api/auth/callback")
        .add_query_param("code", "stale-code")
        .await
        .assert_status(StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn check_login_without_session() {
    let harness = TestHarness::new();

    let response = harness.server.get("/api/auth/check_login").await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["logged_in"], false);
    assert!(body.get("user_profile").is_none());
}

#[tokio::test]
async fn logout_ends_session() {
    let harness = TestHarness::new();
    let account_id = harness.create_account("U-logout").await;
    let cookie = harness.login_cookie(&account_id).await;

    let response = harness
        .server
        .post("/api/auth/logout")
        .add_header("cookie", cookie.clone())
        .await;
    response.assert_status_ok();
    let cleared = response.header("set-cookie");
    assert!(cleared.to_str().unwrap().contains("Max-Age=0"));

    let status: serde_json::Value = harness
        .server
        .get("/api/auth/check_login")
        .add_header("cookie", cookie.clone())
        .await
        .json();
    assert_eq!(status["logged_in"], false);

    harness
        .server
        .post("/api/auth/logout")
        .add_header("cookie", cookie)
        .await
        .assert_status_bad_request();
}
