//! Router configuration.
//!
//! This module sets up the Axum router with all routes and middleware.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::DefaultBodyLimit;
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderName, Method};
use axum::routing::{get, post};
use axum::Router;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::handlers::{accounts, auth, health, images, points, rules};
use crate::state::AppState;

/// Maximum concurrent requests for point and account endpoints.
const API_MAX_CONCURRENT_REQUESTS: usize = 50;

/// Maximum concurrent image requests. Uploads hold large bodies in memory.
const IMAGE_MAX_CONCURRENT_REQUESTS: usize = 16;

/// Create the service router with all routes and middleware.
///
/// # Routes
///
/// ## Public
/// - `GET /health` - Health check
/// - `GET /api/points/balance/:account_id` - Current balance
/// - `GET /api/points/:account_id/transactions` - Transaction history
/// - `GET /api/rules`, `GET /api/rules/:rule_id` - Rule catalogue
/// - `GET /api/accounts/:account_id` - Public profile
///
/// ## Points (admin key)
/// - `POST /api/points/add` - Credit points
/// - `POST /api/points/deduct` - Debit points
/// - `POST /api/points/apply-rule` - Apply a rule
/// - `POST /api/points/transaction` - Record a raw ledger row
/// - `GET /api/points/:account_id/reconcile` - Replay and compare
///
/// ## Accounts
/// - `POST /api/accounts` - Register (admin key)
/// - `GET /api/accounts/me`, `PATCH /api/accounts/me` - Own profile (session)
///
/// ## Auth (LINE Login)
/// - `GET /api/auth/login`, `GET /api/auth/callback`
/// - `GET /api/auth/check_login`, `POST /api/auth/logout`
///
/// ## Images
/// - `POST /img/upload/:account_id/:category` - Multipart upload
/// - `GET /img/i/*path` - Serve a file
/// - `DELETE /img/i/*path` - Delete a file (admin key)
/// - `GET /img/list/:account_id` - List an account's files
pub fn create_router(state: AppState) -> Router {
    let cors_origins = state.config.cors_origins.clone();
    let max_body_bytes = state.config.max_body_bytes;
    let request_timeout_seconds = state.config.request_timeout_seconds;

    let cors = build_cors_layer(&cors_origins);

    let state = Arc::new(state);

    let points_routes = Router::new()
        .route("/balance/:account_id", get(points::get_balance))
        .route("/:account_id/transactions", get(points::list_transactions))
        .route("/:account_id/reconcile", get(points::reconcile_account))
        .route("/transaction", post(points::append_transaction))
        .route("/add", post(points::add_points))
        .route("/deduct", post(points::deduct_points))
        .route("/apply-rule", post(points::apply_rule));

    let rule_routes = Router::new()
        .route("/", get(rules::list_rules).post(rules::create_rule))
        .route("/:rule_id", get(rules::get_rule));

    let account_routes = Router::new()
        .route("/", post(accounts::create_account))
        .route("/me", get(accounts::get_me).patch(accounts::update_me))
        .route("/:account_id", get(accounts::get_account));

    let auth_routes = Router::new()
        .route("/login", get(auth::login))
        .route("/callback", get(auth::callback))
        .route("/check_login", get(auth::check_login))
        .route("/logout", post(auth::logout));

    let api_routes = Router::new()
        .nest("/points", points_routes)
        .nest("/rules", rule_routes)
        .nest("/accounts", account_routes)
        .nest("/auth", auth_routes)
        .layer(ConcurrencyLimitLayer::new(API_MAX_CONCURRENT_REQUESTS));

    let image_routes = Router::new()
        .route("/upload/:account_id/:category", post(images::upload_image))
        .route(
            "/i/*path",
            get(images::get_image).delete(images::delete_image),
        )
        .route("/list/:account_id", get(images::list_images))
        .layer(ConcurrencyLimitLayer::new(IMAGE_MAX_CONCURRENT_REQUESTS));

    Router::new()
        .route("/health", get(health::health))
        .nest("/api", api_routes)
        .nest("/img", image_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(TimeoutLayer::new(Duration::from_secs(
            request_timeout_seconds,
        )))
        .with_state(state)
}

/// Build the CORS layer from configured origins.
///
/// Explicit origins may send the session cookie; a wildcard may not.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|o| o == "*") {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([
                Method::GET,
                Method::POST,
                Method::PATCH,
                Method::DELETE,
                Method::OPTIONS,
            ])
            .allow_headers([
                CONTENT_TYPE,
                AUTHORIZATION,
                HeaderName::from_static("x-admin-key"),
                HeaderName::from_static("x-admin-id"),
            ])
            .allow_credentials(true)
    }
}
