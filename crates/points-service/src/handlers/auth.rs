//! LINE Login handlers.
//!
//! The callback registers first-time users, refreshes returning ones, and
//! starts a stored session that any instance of the service can resolve.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::header::SET_COOKIE;
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Redirect};
use axum::Json;
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};

use points_core::{Account, Session};

use crate::auth::{clear_session_cookie, resolve_session, session_cookie, session_token};
use crate::error::ApiError;
use crate::identity::{LineProfile, LoginState};
use crate::state::AppState;

/// Login query parameters, forwarded through the OAuth `state`.
#[derive(Debug, Deserialize)]
pub struct LoginQuery {
    /// Marketing tracking id.
    pub tracking_id: Option<String>,
    /// Frontend path to return to after login.
    pub page: Option<String>,
}

/// Login response.
#[derive(Debug, Serialize)]
pub struct LoginResponse {
    /// LINE authorize URL to redirect the browser to.
    pub auth_url: String,
}

/// Build the LINE authorize URL.
pub async fn login(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LoginQuery>,
) -> Result<Json<LoginResponse>, ApiError> {
    let line = state.line_client()?;

    let mut login_state = format!("page={}", query.page.as_deref().unwrap_or("/"));
    if let Some(tracking_id) = query.tracking_id.filter(|t| !t.is_empty()) {
        login_state = format!("tracking_id={tracking_id}&{login_state}");
    }

    let auth_url = line.authorize_url(&login_state)?;
    tracing::debug!(auth_url = %auth_url, "Generated login URL");
    Ok(Json(LoginResponse { auth_url }))
}

/// Callback query parameters.
#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    /// Authorization code.
    pub code: Option<String>,
    /// State passed to the authorize endpoint.
    pub state: Option<String>,
}

/// Handle the LINE Login callback.
pub async fn callback(
    State(state): State<Arc<AppState>>,
    Query(query): Query<CallbackQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let code = query
        .code
        .filter(|c| !c.is_empty())
        .ok_or_else(|| ApiError::BadRequest("code not found".into()))?;
    let login_state = LoginState::parse(query.state.as_deref().unwrap_or_default());

    let line = state.line_client()?;
    let token = line.exchange_code(&code).await?;
    let profile = line.fetch_profile(&token.access_token).await?;

    let account = register_or_refresh(&state, &profile, &login_state).await?;
    let display_name = account
        .nick_name
        .clone()
        .unwrap_or_else(|| profile.display_name.clone());

    let now = Utc::now();
    let purged = state.store.purge_expired_sessions(now).await?;
    if purged > 0 {
        tracing::debug!(purged, "Expired sessions removed");
    }

    let session = Session::start(
        account.account_id.clone(),
        &profile.user_id,
        display_name,
        Duration::seconds(state.config.session_ttl_seconds),
    );
    state.store.put_session(&session).await?;

    tracing::info!(
        account_id = %account.account_id,
        page = %login_state.page,
        "User logged in"
    );

    let redirect_to = format!(
        "{}{}",
        state.config.frontend_url.trim_end_matches('/'),
        login_state.page
    );
    let cookie = session_cookie(&session.id, state.config.session_ttl_seconds);
    Ok(([(SET_COOKIE, cookie)], Redirect::to(&redirect_to)))
}

/// Create the account on first login; otherwise record the login.
///
/// Returning users keep the nick name they set on the platform.
async fn register_or_refresh(
    state: &AppState,
    profile: &LineProfile,
    login_state: &LoginState,
) -> Result<Account, ApiError> {
    let now = Utc::now();

    if let Some(mut account) = state
        .store
        .get_account_by_external_id(&profile.user_id)
        .await?
    {
        account.touch_login(now);
        if account.picture_url.is_none() {
            account.picture_url.clone_from(&profile.picture_url);
        }
        state.store.update_account(&account).await?;
        tracing::debug!(account_id = %account.account_id, "Existing user");
        return Ok(account);
    }

    let mut account = Account::new(&profile.user_id, Some(profile.display_name.clone()));
    account.tracking_id.clone_from(&login_state.tracking_id);
    account.picture_url.clone_from(&profile.picture_url);
    account.touch_login(now);
    state.store.create_account(&mut account).await?;

    tracing::info!(
        account_id = %account.account_id,
        tracking_id = ?account.tracking_id,
        "New user registered"
    );
    Ok(account)
}

/// Profile shown to a logged-in browser.
#[derive(Debug, Serialize)]
pub struct SessionProfile {
    /// Account ID.
    pub account_id: String,
    /// LINE user id.
    pub user_id: String,
    /// Display name.
    pub display_name: String,
    /// When the session expires.
    pub expires_at: String,
}

/// Login status response.
#[derive(Debug, Serialize)]
pub struct CheckLoginResponse {
    /// Whether the request carries a live session.
    pub logged_in: bool,
    /// Session profile when logged in.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_profile: Option<SessionProfile>,
}

/// Report whether the caller is logged in.
pub async fn check_login(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<CheckLoginResponse>, ApiError> {
    let session = resolve_session(&headers, &state).await?;
    Ok(Json(CheckLoginResponse {
        logged_in: session.is_some(),
        user_profile: session.map(|s| SessionProfile {
            account_id: s.account_id.to_string(),
            user_id: s.external_id,
            display_name: s.display_name,
            expires_at: s.expires_at.to_rfc3339(),
        }),
    }))
}

/// End the caller's session.
pub async fn logout(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let token = session_token(&headers)
        .ok_or_else(|| ApiError::BadRequest("no active session".into()))?;

    if !state.store.delete_session(&token).await? {
        return Err(ApiError::BadRequest("no active session".into()));
    }

    tracing::info!("User logged out");
    Ok((
        [(SET_COOKIE, clear_session_cookie())],
        Json(serde_json::json!({ "message": "Logged out" })),
    ))
}
