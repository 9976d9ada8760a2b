//! Account management handlers.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use points_core::{Account, ProfileUpdate};

use crate::auth::{AdminAuth, SessionUser};
use crate::error::ApiError;
use crate::handlers::points::{parse_account_id, BalanceResponse};
use crate::state::AppState;

/// Full account response, for the account owner.
#[derive(Debug, Serialize)]
pub struct AccountResponse {
    /// Account ID (invitation id).
    pub account_id: String,
    /// LINE user id.
    pub external_id: String,
    /// Display name.
    pub nick_name: Option<String>,
    /// Home prefecture.
    pub prefecture: Option<String>,
    /// Tracking id captured at first login.
    pub tracking_id: Option<String>,
    /// Contact email.
    pub email: Option<String>,
    /// Contact phone number.
    pub mobile_phone: Option<String>,
    /// Profile picture URL.
    pub picture_url: Option<String>,
    /// Self-declared sex.
    pub sex: Option<String>,
    /// Birth date.
    pub birth: Option<String>,
    /// Account type.
    pub account_type: Option<String>,
    /// Affiliate tier.
    pub affiliation_type: i32,
    /// Last login timestamp.
    pub last_login: Option<String>,
    /// Created timestamp.
    pub created_at: String,
    /// Updated timestamp.
    pub updated_at: String,
}

impl From<&Account> for AccountResponse {
    fn from(account: &Account) -> Self {
        Self {
            account_id: account.account_id.to_string(),
            external_id: account.external_id.clone(),
            nick_name: account.nick_name.clone(),
            prefecture: account.prefecture.clone(),
            tracking_id: account.tracking_id.clone(),
            email: account.email.clone(),
            mobile_phone: account.mobile_phone.clone(),
            picture_url: account.picture_url.clone(),
            sex: account.sex.clone(),
            birth: account.birth.clone(),
            account_type: account.account_type.clone(),
            affiliation_type: account.affiliation_type,
            last_login: account.last_login.map(|t| t.to_rfc3339()),
            created_at: account.created_at.to_rfc3339(),
            updated_at: account.updated_at.to_rfc3339(),
        }
    }
}

/// Public account response, safe to show to other users.
#[derive(Debug, Serialize)]
pub struct PublicAccountResponse {
    /// Account ID.
    pub account_id: String,
    /// Display name.
    pub nick_name: Option<String>,
    /// Home prefecture.
    pub prefecture: Option<String>,
    /// Profile picture URL.
    pub picture_url: Option<String>,
    /// Account type.
    pub account_type: Option<String>,
}

impl From<&Account> for PublicAccountResponse {
    fn from(account: &Account) -> Self {
        Self {
            account_id: account.account_id.to_string(),
            nick_name: account.nick_name.clone(),
            prefecture: account.prefecture.clone(),
            picture_url: account.picture_url.clone(),
            account_type: account.account_type.clone(),
        }
    }
}

/// Create account request.
#[derive(Debug, Deserialize)]
pub struct CreateAccountRequest {
    /// LINE user id.
    pub external_id: String,
    /// Display name.
    pub nick_name: Option<String>,
    /// Tracking id.
    pub tracking_id: Option<String>,
}

/// Create account response.
#[derive(Debug, Serialize)]
pub struct CreateAccountResponse {
    /// The new account.
    pub account: AccountResponse,
    /// Its zero balance.
    pub balance: BalanceResponse,
}

/// Register an account for a LINE user.
pub async fn create_account(
    State(state): State<Arc<AppState>>,
    admin: AdminAuth,
    Json(body): Json<CreateAccountRequest>,
) -> Result<(StatusCode, Json<CreateAccountResponse>), ApiError> {
    if body.external_id.trim().is_empty() {
        return Err(ApiError::BadRequest("external_id must not be empty".into()));
    }

    let mut account = Account::new(body.external_id, body.nick_name);
    account.tracking_id = body.tracking_id;

    let balance = state.store.create_account(&mut account).await?;

    tracing::info!(
        admin_id = %admin.admin_id,
        account_id = %account.account_id,
        "Account created"
    );

    Ok((
        StatusCode::CREATED,
        Json(CreateAccountResponse {
            account: AccountResponse::from(&account),
            balance: BalanceResponse::from(&balance),
        }),
    ))
}

async fn session_account(state: &AppState, user: &SessionUser) -> Result<Account, ApiError> {
    state
        .store
        .get_account(&user.session.account_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Account not found".into()))
}

/// Get the current user's account.
pub async fn get_me(
    State(state): State<Arc<AppState>>,
    user: SessionUser,
) -> Result<Json<AccountResponse>, ApiError> {
    let account = session_account(&state, &user).await?;
    Ok(Json(AccountResponse::from(&account)))
}

/// Update the current user's profile.
///
/// Only the fields of [`ProfileUpdate`] are accepted; any other key is
/// rejected.
pub async fn update_me(
    State(state): State<Arc<AppState>>,
    user: SessionUser,
    Json(body): Json<serde_json::Value>,
) -> Result<Json<AccountResponse>, ApiError> {
    let update: ProfileUpdate =
        serde_json::from_value(body).map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let mut account = session_account(&state, &user).await?;
    account.apply_update(&update)?;
    state.store.update_account(&account).await?;

    tracing::info!(account_id = %account.account_id, "Profile updated");

    Ok(Json(AccountResponse::from(&account)))
}

/// Get another account's public profile.
pub async fn get_account(
    State(state): State<Arc<AppState>>,
    Path(account_id): Path<String>,
) -> Result<Json<PublicAccountResponse>, ApiError> {
    let account_id = parse_account_id(&account_id)?;
    let account = state
        .store
        .get_account(&account_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("account not found: {account_id}")))?;
    Ok(Json(PublicAccountResponse::from(&account)))
}
