//! Point rule handlers.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;

use points_core::{NewRule, PointType, PointValue, Rule, RuleCategory, RuleId};

use crate::auth::AdminAuth;
use crate::error::ApiError;
use crate::state::AppState;

/// List all rules.
pub async fn list_rules(State(state): State<Arc<AppState>>) -> Result<Json<Vec<Rule>>, ApiError> {
    Ok(Json(state.store.list_rules().await?))
}

/// Get a rule by id.
pub async fn get_rule(
    State(state): State<Arc<AppState>>,
    Path(rule_id): Path<i64>,
) -> Result<Json<Rule>, ApiError> {
    let rule_id = RuleId::new(rule_id)
        .map_err(|_| ApiError::BadRequest(format!("invalid rule id: {rule_id}")))?;
    state
        .store
        .get_rule(rule_id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("rule not found: {rule_id}")))
}

/// Create rule request.
///
/// The value is given either as a tagged `value` or as a legacy numeric
/// `point_value` (below 1 is a fraction, otherwise a fixed amount).
#[derive(Debug, Deserialize)]
pub struct CreateRuleRequest {
    /// Display name.
    pub name: String,
    /// Longer description.
    pub description: Option<String>,
    /// Pool the rule credits or debits.
    pub point_type: PointType,
    /// Category recorded on ledger rows.
    pub service_type: RuleCategory,
    /// Tagged value.
    pub value: Option<PointValue>,
    /// Legacy numeric value.
    pub point_value: Option<f64>,
    /// `true` adds points, `false` takes them.
    #[serde(default = "default_is_addition")]
    pub is_addition: bool,
}

const fn default_is_addition() -> bool {
    true
}

impl CreateRuleRequest {
    fn into_new_rule(self) -> Result<NewRule, ApiError> {
        let value = match (self.value, self.point_value) {
            (Some(value), None) => value,
            (None, Some(raw)) => PointValue::from_legacy(raw)?,
            (Some(_), Some(_)) => {
                return Err(ApiError::BadRequest(
                    "send either value or point_value, not both".into(),
                ))
            }
            (None, None) => return Err(ApiError::BadRequest("value is required".into())),
        };

        Ok(NewRule {
            name: self.name,
            description: self.description,
            point_type: self.point_type,
            service_type: self.service_type,
            value,
            is_addition: self.is_addition,
        })
    }
}

/// Create a rule.
pub async fn create_rule(
    State(state): State<Arc<AppState>>,
    admin: AdminAuth,
    Json(body): Json<CreateRuleRequest>,
) -> Result<(StatusCode, Json<Rule>), ApiError> {
    let new_rule = body.into_new_rule()?;
    let rule = state.store.insert_rule(&new_rule).await?;

    tracing::info!(
        admin_id = %admin.admin_id,
        rule_id = %rule.id,
        value = ?rule.value,
        "Rule created"
    );

    Ok((StatusCode::CREATED, Json(rule)))
}
