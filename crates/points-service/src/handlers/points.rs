//! Point balance, history and mutation handlers.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use points_core::{
    AccountId, Direction, EntryId, LedgerOutcome, PointBalance, PointTransaction, PointType,
    PointsMutation, ReplayedBalance, RuleCategory, RuleId, MAX_TRANSACTION_ID_LEN,
};
use points_store::StoreError;

use crate::auth::AdminAuth;
use crate::error::ApiError;
use crate::state::AppState;

/// Transaction token recorded by `/add` when the caller sends none.
pub const DEFAULT_ADD_TRANSACTION_ID: &str = "txn12345";

/// Transaction token recorded by `/deduct` when the caller sends none.
pub const DEFAULT_DEDUCT_TRANSACTION_ID: &str = "txn12346";

/// Transaction token recorded by `/apply-rule` when the caller sends none.
pub const DEFAULT_RULE_TRANSACTION_ID: &str = "txn12345";

const DEFAULT_PAGE_SIZE: usize = 50;
const MAX_PAGE_SIZE: usize = 100;

pub(crate) fn parse_account_id(raw: &str) -> Result<AccountId, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::BadRequest(format!("invalid account id: {raw}")))
}

async fn require_balance(
    state: &AppState,
    account_id: &AccountId,
) -> Result<PointBalance, ApiError> {
    state
        .store
        .get_balance(account_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("balance not found: {account_id}")))
}

/// Run a mutation, logging storage failures with the attempted change.
async fn apply(state: &AppState, mutation: &PointsMutation) -> Result<LedgerOutcome, ApiError> {
    match state.store.apply_mutation(mutation).await {
        Ok(outcome) => {
            tracing::info!(
                account_id = %mutation.account_id,
                regular_delta = mutation.regular_delta,
                bonus_delta = mutation.bonus_delta,
                direction = ?mutation.direction,
                rule_id = ?mutation.rule_id.map(RuleId::get),
                total_balance = outcome.balance.total_balance,
                "Points updated"
            );
            Ok(outcome)
        }
        Err(err @ (StoreError::Database(_) | StoreError::Serialization(_))) => {
            tracing::error!(
                account_id = %mutation.account_id,
                regular_delta = mutation.regular_delta,
                bonus_delta = mutation.bonus_delta,
                direction = ?mutation.direction,
                error = %err,
                "Point mutation failed in storage"
            );
            Err(err.into())
        }
        Err(err) => {
            tracing::debug!(
                account_id = %mutation.account_id,
                error = %err,
                "Point mutation rejected"
            );
            Err(err.into())
        }
    }
}

// ============================================================================
// Responses
// ============================================================================

/// Balance response.
#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    /// Account ID.
    pub account_id: String,
    /// Regular pool.
    pub regular_balance: i64,
    /// Bonus pool.
    pub bonus_balance: i64,
    /// Sum of both pools.
    pub total_balance: i64,
    /// Last mutation timestamp.
    pub last_updated: String,
}

impl From<&PointBalance> for BalanceResponse {
    fn from(balance: &PointBalance) -> Self {
        Self {
            account_id: balance.account_id.to_string(),
            regular_balance: balance.regular_balance,
            bonus_balance: balance.bonus_balance,
            total_balance: balance.total_balance,
            last_updated: balance.last_updated.to_rfc3339(),
        }
    }
}

/// Transaction response.
#[derive(Debug, Serialize)]
pub struct TransactionResponse {
    /// Entry ID.
    pub id: String,
    /// Signed total change.
    pub point_change: i64,
    /// Signed change of the regular pool.
    pub regular_change: i64,
    /// Signed change of the bonus pool.
    pub bonus_change: i64,
    /// Pool the change is attributed to.
    pub point_type: PointType,
    /// Business category.
    pub rule_category: RuleCategory,
    /// Rule that drove the change.
    pub rule_id: Option<RuleId>,
    /// Caller-supplied audit token.
    pub transaction_id: String,
    /// Total balance after the change.
    pub balance_after: i64,
    /// Timestamp.
    pub created_at: String,
}

impl From<&PointTransaction> for TransactionResponse {
    fn from(tx: &PointTransaction) -> Self {
        Self {
            id: tx.id.to_string(),
            point_change: tx.point_change,
            regular_change: tx.regular_change,
            bonus_change: tx.bonus_change,
            point_type: tx.point_type,
            rule_category: tx.rule_category,
            rule_id: tx.rule_id,
            transaction_id: tx.transaction_id.clone(),
            balance_after: tx.balance_after,
            created_at: tx.created_at.to_rfc3339(),
        }
    }
}

/// Mutation response.
#[derive(Debug, Serialize)]
pub struct PointsResponse {
    /// Balance after the mutation.
    pub balance: BalanceResponse,
    /// The ledger row that was written.
    pub transaction: TransactionResponse,
}

impl From<&LedgerOutcome> for PointsResponse {
    fn from(outcome: &LedgerOutcome) -> Self {
        Self {
            balance: BalanceResponse::from(&outcome.balance),
            transaction: TransactionResponse::from(&outcome.transaction),
        }
    }
}

// ============================================================================
// Queries
// ============================================================================

/// Get the current balance of an account.
pub async fn get_balance(
    State(state): State<Arc<AppState>>,
    Path(account_id): Path<String>,
) -> Result<Json<BalanceResponse>, ApiError> {
    let account_id = parse_account_id(&account_id)?;
    let balance = require_balance(&state, &account_id).await?;
    Ok(Json(BalanceResponse::from(&balance)))
}

/// Transaction list query parameters.
#[derive(Debug, Deserialize)]
pub struct ListTransactionsQuery {
    /// Maximum number of transactions to return (default: 50, max: 100).
    #[serde(default = "default_limit")]
    pub limit: usize,
    /// Offset for pagination (default: 0).
    #[serde(default)]
    pub offset: usize,
}

fn default_limit() -> usize {
    DEFAULT_PAGE_SIZE
}

/// List transactions response.
#[derive(Debug, Serialize)]
pub struct ListTransactionsResponse {
    /// Transactions (newest first).
    pub transactions: Vec<TransactionResponse>,
    /// Whether there are more transactions.
    pub has_more: bool,
}

/// List an account's transaction history, newest first.
pub async fn list_transactions(
    State(state): State<Arc<AppState>>,
    Path(account_id): Path<String>,
    Query(query): Query<ListTransactionsQuery>,
) -> Result<Json<ListTransactionsResponse>, ApiError> {
    let account_id = parse_account_id(&account_id)?;
    require_balance(&state, &account_id).await?;

    // Fetch one more than requested to determine has_more
    let limit = query.limit.clamp(1, MAX_PAGE_SIZE);
    let transactions = state
        .store
        .list_transactions(&account_id, limit + 1, query.offset)
        .await?;

    let has_more = transactions.len() > limit;
    let transactions = transactions
        .iter()
        .take(limit)
        .map(TransactionResponse::from)
        .collect();

    Ok(Json(ListTransactionsResponse {
        transactions,
        has_more,
    }))
}

// ============================================================================
// Mutations
// ============================================================================

/// Direct add/deduct request.
#[derive(Debug, Deserialize)]
pub struct AdjustPointsRequest {
    /// Account to change.
    pub account_id: String,
    /// Regular points to add or take.
    #[serde(default)]
    pub regular_points: i64,
    /// Bonus points to add or take.
    #[serde(default)]
    pub bonus_points: i64,
    /// Audit token; a fixed default is recorded when absent.
    pub transaction_id: Option<String>,
}

impl AdjustPointsRequest {
    fn into_mutation(
        self,
        direction: Direction,
        default_transaction_id: &str,
    ) -> Result<PointsMutation, ApiError> {
        Ok(PointsMutation {
            account_id: parse_account_id(&self.account_id)?,
            regular_delta: self.regular_points,
            bonus_delta: self.bonus_points,
            direction,
            rule_category: RuleCategory::Service,
            transaction_id: self
                .transaction_id
                .unwrap_or_else(|| default_transaction_id.to_string()),
            rule_id: None,
        })
    }
}

/// Add points to an account.
pub async fn add_points(
    State(state): State<Arc<AppState>>,
    admin: AdminAuth,
    Json(body): Json<AdjustPointsRequest>,
) -> Result<Json<PointsResponse>, ApiError> {
    let mutation = body.into_mutation(Direction::Add, DEFAULT_ADD_TRANSACTION_ID)?;
    tracing::debug!(admin_id = %admin.admin_id, account_id = %mutation.account_id, "Adding points");
    let outcome = apply(&state, &mutation).await?;
    Ok(Json(PointsResponse::from(&outcome)))
}

/// Deduct points from an account.
pub async fn deduct_points(
    State(state): State<Arc<AppState>>,
    admin: AdminAuth,
    Json(body): Json<AdjustPointsRequest>,
) -> Result<Json<PointsResponse>, ApiError> {
    let mutation = body.into_mutation(Direction::Subtract, DEFAULT_DEDUCT_TRANSACTION_ID)?;
    tracing::debug!(
        admin_id = %admin.admin_id,
        account_id = %mutation.account_id,
        "Deducting points"
    );
    let outcome = apply(&state, &mutation).await?;
    Ok(Json(PointsResponse::from(&outcome)))
}

/// Rule application request.
#[derive(Debug, Deserialize)]
pub struct ApplyRuleRequest {
    /// Account to change.
    pub account_id: String,
    /// Rule to apply.
    pub rule_id: RuleId,
    /// Base amount for percentage rules.
    pub base_points: Option<i64>,
    /// Audit token; a fixed default is recorded when absent.
    pub transaction_id: Option<String>,
}

/// Apply a rule to an account.
pub async fn apply_rule(
    State(state): State<Arc<AppState>>,
    _admin: AdminAuth,
    Json(body): Json<ApplyRuleRequest>,
) -> Result<Json<PointsResponse>, ApiError> {
    let account_id = parse_account_id(&body.account_id)?;
    let rule = state
        .store
        .get_rule(body.rule_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("rule not found: {}", body.rule_id)))?;

    let transaction_id = body
        .transaction_id
        .unwrap_or_else(|| DEFAULT_RULE_TRANSACTION_ID.to_string());
    let mutation = rule.to_mutation(account_id, transaction_id, body.base_points)?;

    let outcome = apply(&state, &mutation).await?;
    Ok(Json(PointsResponse::from(&outcome)))
}

/// Raw ledger row request.
#[derive(Debug, Deserialize)]
pub struct AppendTransactionRequest {
    /// Account the row belongs to.
    pub account_id: String,
    /// Signed total change.
    pub point_change: i64,
    /// Pool the change is attributed to.
    pub point_type: PointType,
    /// Business category.
    pub rule_category: RuleCategory,
    /// Rule that drove the change.
    pub rule_id: Option<RuleId>,
    /// Audit token.
    pub transaction_id: String,
    /// Total balance after the change, as recorded by the caller.
    pub balance_after: i64,
}

/// Append transaction response.
#[derive(Debug, Serialize)]
pub struct AppendTransactionResponse {
    /// Entry ID of the new row.
    pub id: String,
}

/// Append a raw ledger row without touching the balance.
///
/// The caller is responsible for keeping the log consistent with the balance;
/// `/reconcile` reports any drift.
pub async fn append_transaction(
    State(state): State<Arc<AppState>>,
    admin: AdminAuth,
    Json(body): Json<AppendTransactionRequest>,
) -> Result<Json<AppendTransactionResponse>, ApiError> {
    let account_id = parse_account_id(&body.account_id)?;
    if body.transaction_id.trim().is_empty() {
        return Err(ApiError::BadRequest("transaction_id must not be empty".into()));
    }
    if body.transaction_id.chars().count() > MAX_TRANSACTION_ID_LEN {
        return Err(ApiError::BadRequest(format!(
            "transaction_id exceeds {MAX_TRANSACTION_ID_LEN} characters"
        )));
    }
    if let Some(rule_id) = body.rule_id {
        if state.store.get_rule(rule_id).await?.is_none() {
            return Err(ApiError::NotFound(format!("rule not found: {rule_id}")));
        }
    }

    let (regular_change, bonus_change) = match body.point_type {
        PointType::Regular => (body.point_change, 0),
        PointType::Bonus => (0, body.point_change),
    };
    let transaction = PointTransaction {
        id: EntryId::generate(),
        account_id,
        point_change: body.point_change,
        regular_change,
        bonus_change,
        point_type: body.point_type,
        rule_category: body.rule_category,
        rule_id: body.rule_id,
        transaction_id: body.transaction_id,
        balance_after: body.balance_after,
        created_at: Utc::now(),
    };

    state.store.append_transaction(&transaction).await?;

    tracing::warn!(
        admin_id = %admin.admin_id,
        account_id = %transaction.account_id,
        entry_id = %transaction.id,
        point_change = transaction.point_change,
        "Raw ledger row appended"
    );

    Ok(Json(AppendTransactionResponse {
        id: transaction.id.to_string(),
    }))
}

// ============================================================================
// Reconciliation
// ============================================================================

/// Reconciliation report.
#[derive(Debug, Serialize)]
pub struct ReconcileResponse {
    /// Account ID.
    pub account_id: String,
    /// Whether the log replays to the stored balance.
    pub consistent: bool,
    /// Stored balance.
    pub stored: BalanceResponse,
    /// Pools rebuilt from the log, when the log itself is well-formed.
    pub replayed: Option<ReplayedBalance>,
    /// Why the check failed.
    pub error: Option<String>,
}

/// Replay an account's ledger and compare it with the stored balance.
pub async fn reconcile_account(
    State(state): State<Arc<AppState>>,
    _admin: AdminAuth,
    Path(account_id): Path<String>,
) -> Result<Json<ReconcileResponse>, ApiError> {
    let account_id = parse_account_id(&account_id)?;
    let balance = require_balance(&state, &account_id).await?;
    let log = state.store.all_transactions(&account_id).await?;

    let replayed = points_core::replay(&log).ok();
    let check = points_core::reconcile(&balance, &log);
    if let Err(e) = &check {
        tracing::warn!(account_id = %account_id, error = %e, "Ledger does not reconcile");
    }

    Ok(Json(ReconcileResponse {
        account_id: account_id.to_string(),
        consistent: check.is_ok(),
        stored: BalanceResponse::from(&balance),
        replayed,
        error: check.err().map(|e| e.to_string()),
    }))
}
