//! Common test utilities for points-service integration tests.

#![allow(dead_code)] // Some utilities are used by different test files

use std::sync::Arc;

use axum::Router;
use axum_test::TestServer;
use chrono::Duration;
use serde_json::json;
use tempfile::TempDir;

use points_core::{AccountId, Session};
use points_service::{create_router, AppState, ServiceConfig};
use points_store::{MemoryStore, Store};

/// Admin key configured for every harness.
pub const ADMIN_KEY: &str = "test-admin-key";

/// Test harness containing everything needed for integration tests.
pub struct TestHarness {
    /// The test server for making HTTP requests.
    pub server: TestServer,
    /// Direct handle on the store, for seeding sessions.
    pub store: Arc<MemoryStore>,
    /// Image storage root (kept alive for test duration).
    pub image_dir: TempDir,
}

impl TestHarness {
    /// Create a new test harness with an empty store and no LINE Login.
    pub fn new() -> Self {
        Self::with_config(|_| {})
    }

    /// Create a harness whose LINE endpoints point at `base_url`.
    pub fn with_line(base_url: &str) -> Self {
        Self::with_config(|config| {
            config.line_channel_id = Some("1234567890".into());
            config.line_channel_secret = Some("channel-secret".into());
            config.line_auth_url = base_url.to_string();
            config.line_api_url = base_url.to_string();
            config.frontend_url = "http://frontend.test".into();
        })
    }

    fn with_config(customize: impl FnOnce(&mut ServiceConfig)) -> Self {
        let image_dir = TempDir::new().expect("Failed to create temp directory");
        let store = Arc::new(MemoryStore::new());

        let mut config = ServiceConfig {
            listen_addr: "127.0.0.1:0".into(),
            admin_api_key: Some(ADMIN_KEY.into()),
            image_storage_root: image_dir.path().to_path_buf(),
            cors_origins: vec!["*".into()],
            max_body_bytes: 1024 * 1024,
            ..ServiceConfig::default()
        };
        customize(&mut config);

        let state = AppState::new(store.clone() as Arc<dyn Store>, config);
        let router: Router = create_router(state);

        let server = TestServer::new(router).expect("Failed to create test server");

        Self {
            server,
            store,
            image_dir,
        }
    }

    /// Register an account through the API and return its id.
    pub async fn create_account(&self, external_id: &str) -> String {
        let response = self
            .server
            .post("/api/accounts")
            .add_header("x-admin-key", ADMIN_KEY)
            .json(&json!({ "external_id": external_id, "nick_name": "Taro" }))
            .await;
        response.assert_status(axum::http::StatusCode::CREATED);
        let body: serde_json::Value = response.json();
        body["account"]["account_id"]
            .as_str()
            .expect("account id in response")
            .to_string()
    }

    /// Store a live session for `account_id` and return its cookie header.
    pub async fn login_cookie(&self, account_id: &str) -> String {
        let account_id: AccountId = account_id.parse().expect("valid account id");
        let session = Session::start(account_id, "U-test", "Taro", Duration::hours(1));
        self.store
            .put_session(&session)
            .await
            .expect("Failed to store session");
        format!("session_id={}", session.id)
    }

    /// Credit regular points as the admin.
    pub async fn add_regular(&self, account_id: &str, points: i64) {
        self.server
            .post("/api/points/add")
            .add_header("x-admin-key", ADMIN_KEY)
            .json(&json!({ "account_id": account_id, "regular_points": points }))
            .await
            .assert_status_ok();
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}
