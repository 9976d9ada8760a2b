//! Account integration tests.

mod common;

use axum::http::StatusCode;
use common::{TestHarness, ADMIN_KEY};
use serde_json::json;

#[tokio::test]
async fn create_account_returns_zero_balance() {
    let harness = TestHarness::new();

    let response = harness
        .server
        .post("/api/accounts")
        .add_header("x-admin-key", ADMIN_KEY)
        .json(&json!({ "external_id": "U-new", "tracking_id": "ad-42" }))
        .await;

    response.assert_status(StatusCode::CREATED);
    let body: serde_json::Value = response.json();
    assert_eq!(body["account"]["external_id"], "U-new");
    assert_eq!(body["account"]["tracking_id"], "ad-42");
    assert_eq!(body["account"]["account_id"].as_str().unwrap().len(), 8);
    assert_eq!(body["balance"]["total_balance"], 0);
}

#[tokio::test]
async fn duplicate_external_id_conflicts() {
    let harness = TestHarness::new();
    harness.create_account("U-dup").await;

    let response = harness
        .server
        .post("/api/accounts")
        .add_header("x-admin-key", ADMIN_KEY)
        .json(&json!({ "external_id": "U-dup" }))
        .await;

    response.assert_status(StatusCode::CONFLICT);
    let body: serde_json::Value = response.json();
    assert_eq!(body["error"]["code"], "conflict");
}

#[tokio::test]
async fn create_account_requires_admin_key() {
    let harness = TestHarness::new();

    let response = harness
        .server
        .post("/api/accounts")
        .json(&json!({ "external_id": "U-anon" }))
        .await;

    response.assert_status_unauthorized();
}

#[tokio::test]
async fn me_requires_session() {
    let harness = TestHarness::new();

    harness
        .server
        .get("/api/accounts/me")
        .await
        .assert_status_unauthorized();
    harness
        .server
        .get("/api/accounts/me")
        .add_header("cookie", "session_id=not-a-session")
        .await
        .assert_status_unauthorized();
}

#[tokio::test]
async fn me_returns_own_account() {
    let harness = TestHarness::new();
    let account_id = harness.create_account("U-me").await;
    let cookie = harness.login_cookie(&account_id).await;

    let response = harness
        .server
        .get("/api/accounts/me")
        .add_header("cookie", cookie)
        .await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["account_id"], account_id.as_str());
    assert_eq!(body["nick_name"], "Taro");
}

#[tokio::test]
async fn update_me_changes_profile() {
    let harness = TestHarness::new();
    let account_id = harness.create_account("U-edit").await;
    let cookie = harness.login_cookie(&account_id).await;

    let response = harness
        .server
        .patch("/api/accounts/me")
        .add_header("cookie", cookie.clone())
        .json(&json!({ "nick_name": "Hanako", "prefecture": "Osaka" }))
        .await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["nick_name"], "Hanako");
    assert_eq!(body["prefecture"], "Osaka");

    let public: serde_json::Value = harness
        .server
        .get(&format!("/api/accounts/{account_id}"))
        .await
        .json();
    assert_eq!(public["nick_name"], "Hanako");
    assert!(public.get("external_id").is_none());
    assert!(public.get("email").is_none());
}

#[tokio::test]
async fn update_me_rejects_protected_fields() {
    let harness = TestHarness::new();
    let account_id = harness.create_account("U-tier").await;
    let cookie = harness.login_cookie(&account_id).await;

    let response = harness
        .server
        .patch("/api/accounts/me")
        .add_header("cookie", cookie)
        .json(&json!({ "affiliation_type": 3 }))
        .await;

    response.assert_status_bad_request();
}

#[tokio::test]
async fn bearer_token_is_accepted() {
    let harness = TestHarness::new();
    let account_id = harness.create_account("U-bearer").await;
    let cookie = harness.login_cookie(&account_id).await;
    let token = cookie.trim_start_matches("session_id=");

    let response = harness
        .server
        .get("/api/accounts/me")
        .add_header("authorization", format!("Bearer {token}"))
        .await;

    response.assert_status_ok();
}

#[tokio::test]
async fn public_profile_of_unknown_account_is_not_found() {
    let harness = TestHarness::new();

    harness
        .server
        .get("/api/accounts/ZZZZ9999")
        .await
        .assert_status_not_found();
}
