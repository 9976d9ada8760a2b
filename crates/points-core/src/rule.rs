//! Point rules.
//!
//! A rule is reference data describing how many points to add or take and
//! under which category. Its value is either a fixed amount or a fraction of a
//! caller-supplied base.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{LedgerError, Result};
use crate::ids::{AccountId, RuleId};
use crate::points::{Direction, PointType, PointsMutation, RuleCategory};

/// How a rule's points are computed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum PointValue {
    /// A fraction of the base amount, in `[0.0, 1.0]`.
    Percentage(f64),
    /// A fixed number of points.
    Absolute(i64),
}

impl PointValue {
    /// Interpret a legacy single-number `point_value`.
    ///
    /// Values below 1 are fractions, everything else is a fixed amount, so
    /// exactly `1.0` becomes `Absolute(1)`.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::Validation` for non-finite, negative or
    /// non-integral absolute values.
    pub fn from_legacy(value: f64) -> Result<Self> {
        if !value.is_finite() || value < 0.0 {
            return Err(LedgerError::validation(format!(
                "invalid point value: {value}"
            )));
        }
        if value < 1.0 {
            return Ok(Self::Percentage(value));
        }
        if value.fract() != 0.0 || value > 9.0e15 {
            return Err(LedgerError::validation(format!(
                "absolute point value must be a whole number: {value}"
            )));
        }
        #[allow(clippy::cast_possible_truncation)]
        Ok(Self::Absolute(value as i64))
    }

    /// Check the value's range.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::Validation` if a percentage is outside
    /// `[0.0, 1.0]` or an absolute amount is negative.
    pub fn validate(&self) -> Result<()> {
        match *self {
            Self::Percentage(p) if !p.is_finite() || !(0.0..=1.0).contains(&p) => Err(
                LedgerError::validation(format!("percentage must be within [0, 1]: {p}")),
            ),
            Self::Absolute(n) if n < 0 => Err(LedgerError::validation(format!(
                "absolute point value must be non-negative: {n}"
            ))),
            _ => Ok(()),
        }
    }

    /// Compute the number of points for an optional base amount.
    ///
    /// Percentages truncate toward zero.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::Validation` if a percentage has no base, the base
    /// is negative, or the value is out of range.
    pub fn points_for(&self, base_points: Option<i64>) -> Result<i64> {
        self.validate()?;
        match (*self, base_points) {
            (Self::Absolute(n), _) => Ok(n),
            (Self::Percentage(_), None) => Err(LedgerError::validation(
                "percentage rule requires base_points",
            )),
            (Self::Percentage(_), Some(base)) if base < 0 => Err(LedgerError::validation(
                "base_points must be non-negative",
            )),
            (Self::Percentage(p), Some(base)) => {
                #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
                let points = (base as f64 * p).trunc() as i64;
                Ok(points)
            }
        }
    }
}

/// A point rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    /// Rule ID.
    pub id: RuleId,
    /// Display name.
    pub name: String,
    /// Longer description.
    pub description: Option<String>,
    /// Pool the rule credits or debits.
    pub point_type: PointType,
    /// Category recorded on ledger rows.
    pub service_type: RuleCategory,
    /// Amount or fraction.
    pub value: PointValue,
    /// `true` adds points, `false` takes them.
    pub is_addition: bool,
    /// When the rule was created.
    pub created_at: DateTime<Utc>,
}

impl Rule {
    /// Compute the point amount this rule yields.
    ///
    /// # Errors
    ///
    /// See [`PointValue::points_for`].
    pub fn compute_points(&self, base_points: Option<i64>) -> Result<i64> {
        self.value.points_for(base_points)
    }

    /// Build the mutation that applies this rule to an account.
    ///
    /// # Errors
    ///
    /// See [`PointValue::points_for`].
    pub fn to_mutation(
        &self,
        account_id: AccountId,
        transaction_id: String,
        base_points: Option<i64>,
    ) -> Result<PointsMutation> {
        let points = self.compute_points(base_points)?;
        let (regular_delta, bonus_delta) = match self.point_type {
            PointType::Regular => (points, 0),
            PointType::Bonus => (0, points),
        };

        Ok(PointsMutation {
            account_id,
            regular_delta,
            bonus_delta,
            direction: Direction::from_is_addition(self.is_addition),
            rule_category: self.service_type,
            transaction_id,
            rule_id: Some(self.id),
        })
    }
}

/// Input for creating a rule; the store assigns the id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewRule {
    /// Display name.
    pub name: String,
    /// Longer description.
    #[serde(default)]
    pub description: Option<String>,
    /// Pool the rule credits or debits.
    pub point_type: PointType,
    /// Category recorded on ledger rows.
    pub service_type: RuleCategory,
    /// Amount or fraction.
    pub value: PointValue,
    /// `true` adds points, `false` takes them.
    #[serde(default = "default_is_addition")]
    pub is_addition: bool,
}

const fn default_is_addition() -> bool {
    true
}

impl NewRule {
    /// Check the rule before it is stored.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::Validation` for an empty name or an out-of-range
    /// value.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(LedgerError::validation("rule name must not be empty"));
        }
        self.value.validate()
    }

    /// Attach the store-assigned id.
    #[must_use]
    pub fn into_rule(self, id: RuleId, created_at: DateTime<Utc>) -> Rule {
        Rule {
            id,
            name: self.name,
            description: self.description,
            point_type: self.point_type,
            service_type: self.service_type,
            value: self.value,
            is_addition: self.is_addition,
            created_at,
        }
    }
}
