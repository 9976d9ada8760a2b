//! Image storage integration tests.

mod common;

use axum_test::multipart::{MultipartForm, Part};
use common::{TestHarness, ADMIN_KEY};

const PNG_BYTES: &[u8] = b"\x89PNG\r\n\x1a\nfake image";

fn png_form(name: &str) -> MultipartForm {
    MultipartForm::new().add_part(
        "file",
        Part::bytes(PNG_BYTES.to_vec())
            .file_name(name)
            .mime_type("image/png"),
    )
}

#[tokio::test]
async fn upload_then_get_list_and_delete() {
    let harness = TestHarness::new();
    let account_id = harness.create_account("U-images").await;

    let response = harness
        .server
        .post(&format!("/img/upload/{account_id}/profile"))
        .multipart(
            png_form("me.png")
                .add_text("sub_directory", "2024")
                .add_text("file_name", "avatar.png"),
        )
        .await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    let path = format!("{account_id}/profile/2024/avatar.png");
    assert_eq!(body["filename"], "avatar.png");
    assert_eq!(body["path"], path.as_str());
    assert_eq!(body["category"], "profile");
    assert_eq!(body["sub_directory"], "2024");

    let image = harness.server.get(&format!("/img/i/{path}")).await;
    image.assert_status_ok();
    assert_eq!(image.header("content-type"), "image/png");
    assert_eq!(image.header("cache-control"), "max-age=3600");
    assert_eq!(image.as_bytes().as_ref(), PNG_BYTES);

    let listed: Vec<String> = harness
        .server
        .get(&format!("/img/list/{account_id}"))
        .await
        .json();
    assert_eq!(listed, vec![path.clone()]);

    harness
        .server
        .delete(&format!("/img/i/{path}"))
        .add_header("x-admin-key", ADMIN_KEY)
        .await
        .assert_status_ok();
    harness
        .server
        .get(&format!("/img/i/{path}"))
        .await
        .assert_status_not_found();
}

#[tokio::test]
async fn upload_without_name_gets_timestamp_name() {
    let harness = TestHarness::new();
    let account_id = harness.create_account("U-stamp").await;

    let response = harness
        .server
        .post(&format!("/img/upload/{account_id}/receipts"))
        .multipart(png_form("scan.PNG"))
        .await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    let filename = body["filename"].as_str().unwrap();
    assert_eq!(filename.len(), "20240101120000.png".len());
    assert!(filename.ends_with(".png"));
    assert!(body["sub_directory"].is_null());
}

#[tokio::test]
async fn non_image_upload_is_rejected() {
    let harness = TestHarness::new();
    let account_id = harness.create_account("U-text").await;

    let form = MultipartForm::new().add_part(
        "file",
        Part::bytes(b"hello".to_vec())
            .file_name("notes.txt")
            .mime_type("text/plain"),
    );
    let response = harness
        .server
        .post(&format!("/img/upload/{account_id}/docs"))
        .multipart(form)
        .await;

    response.assert_status_bad_request();
}

#[tokio::test]
async fn upload_without_file_is_rejected() {
    let harness = TestHarness::new();
    let account_id = harness.create_account("U-nofile").await;

    let response = harness
        .server
        .post(&format!("/img/upload/{account_id}/profile"))
        .multipart(MultipartForm::new().add_text("sub_directory", "x"))
        .await;

    response.assert_status_bad_request();
}

#[tokio::test]
async fn sub_directory_cannot_escape_account() {
    let harness = TestHarness::new();
    let account_id = harness.create_account("U-escape").await;

    let response = harness
        .server
        .post(&format!("/img/upload/{account_id}/profile"))
        .multipart(png_form("me.png").add_text("sub_directory", "../../elsewhere"))
        .await;

    response.assert_status_bad_request();
}

#[tokio::test]
async fn upload_for_unknown_account_is_not_found() {
    let harness = TestHarness::new();

    let response = harness
        .server
        .post("/img/upload/ZZZZ9999/profile")
        .multipart(png_form("me.png"))
        .await;

    response.assert_status_not_found();
}

#[tokio::test]
async fn list_without_uploads_is_not_found() {
    let harness = TestHarness::new();
    let account_id = harness.create_account("U-empty").await;

    harness
        .server
        .get(&format!("/img/list/{account_id}"))
        .await
        .assert_status_not_found();
}

#[tokio::test]
async fn non_image_path_is_rejected() {
    let harness = TestHarness::new();

    harness
        .server
        .get("/img/i/ABCD1234/profile/notes.txt")
        .await
        .assert_status_bad_request();
}

#[tokio::test]
async fn delete_requires_admin_key() {
    let harness = TestHarness::new();

    harness
        .server
        .delete("/img/i/ABCD1234/profile/me.png")
        .await
        .assert_status_unauthorized();
}
