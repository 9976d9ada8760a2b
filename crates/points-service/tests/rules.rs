//! Rule catalogue integration tests.

mod common;

use axum::http::StatusCode;
use common::{TestHarness, ADMIN_KEY};
use serde_json::json;

#[tokio::test]
async fn create_and_fetch_rule() {
    let harness = TestHarness::new();

    let response = harness
        .server
        .post("/api/rules")
        .add_header("x-admin-key", ADMIN_KEY)
        .json(&json!({
            "name": "signup bonus",
            "description": "First login",
            "point_type": "bonus",
            "service_type": "event",
            "value": { "kind": "absolute", "value": 300 }
        }))
        .await;
    response.assert_status(StatusCode::CREATED);
    let created: serde_json::Value = response.json();
    assert_eq!(created["id"], 1);
    assert_eq!(created["is_addition"], true);
    assert_eq!(created["value"]["kind"], "absolute");

    let fetched: serde_json::Value = harness.server.get("/api/rules/1").await.json();
    assert_eq!(fetched["name"], "signup bonus");
    assert_eq!(fetched["point_type"], "bonus");

    let listed: serde_json::Value = harness.server.get("/api/rules").await.json();
    assert_eq!(listed.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn rule_ids_are_sequential() {
    let harness = TestHarness::new();

    for (expected, raw) in [(1, 0.05), (2, 200.0)] {
        let response = harness
            .server
            .post("/api/rules")
            .add_header("x-admin-key", ADMIN_KEY)
            .json(&json!({
                "name": format!("rule {expected}"),
                "point_type": "regular",
                "service_type": "service",
                "point_value": raw
            }))
            .await;
        response.assert_status(StatusCode::CREATED);
        let rule: serde_json::Value = response.json();
        assert_eq!(rule["id"], expected);
    }
}

#[tokio::test]
async fn rule_without_value_is_rejected() {
    let harness = TestHarness::new();

    let response = harness
        .server
        .post("/api/rules")
        .add_header("x-admin-key", ADMIN_KEY)
        .json(&json!({
            "name": "empty",
            "point_type": "regular",
            "service_type": "service"
        }))
        .await;

    response.assert_status_bad_request();
}

#[tokio::test]
async fn out_of_range_percentage_is_rejected() {
    let harness = TestHarness::new();

    let response = harness
        .server
        .post("/api/rules")
        .add_header("x-admin-key", ADMIN_KEY)
        .json(&json!({
            "name": "too generous",
            "point_type": "regular",
            "service_type": "service",
            "value": { "kind": "percentage", "value": 1.5 }
        }))
        .await;

    response.assert_status_bad_request();
}

#[tokio::test]
async fn creating_rule_requires_admin_key() {
    let harness = TestHarness::new();

    let response = harness
        .server
        .post("/api/rules")
        .json(&json!({
            "name": "sneaky",
            "point_type": "regular",
            "service_type": "service",
            "point_value": 10.0
        }))
        .await;

    response.assert_status_unauthorized();
}

#[tokio::test]
async fn unknown_and_invalid_rule_ids() {
    let harness = TestHarness::new();

    harness
        .server
        .get("/api/rules/7")
        .await
        .assert_status_not_found();
    harness
        .server
        .get("/api/rules/0")
        .await
        .assert_status_bad_request();
}
