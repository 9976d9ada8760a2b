//! Point balances, ledger rows and balance mutations.
//!
//! [`PointBalance::apply`] is the single place where a balance changes. It is
//! pure: stores load the current balance under a lock, call `apply`, and then
//! persist both halves of the outcome in one atomic write.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{LedgerError, Result};
use crate::ids::{AccountId, EntryId, RuleId};

/// Maximum length of a caller-supplied transaction token.
pub const MAX_TRANSACTION_ID_LEN: usize = 255;

/// One of the two point pools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PointType {
    /// Regular points.
    Regular,
    /// Bonus points.
    Bonus,
}

impl PointType {
    /// Wire name of the pool.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Regular => "regular",
            Self::Bonus => "bonus",
        }
    }
}

impl fmt::Display for PointType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PointType {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "regular" => Ok(Self::Regular),
            "bonus" => Ok(Self::Bonus),
            other => Err(LedgerError::validation(format!(
                "unknown point type: {other}"
            ))),
        }
    }
}

/// Business category a point change is booked under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleCategory {
    /// Affiliate/referral rewards.
    Affiliation,
    /// Points earned or spent on services.
    Service,
    /// Coupon redemptions.
    Coupon,
    /// Campaign and event grants.
    Event,
}

impl RuleCategory {
    /// Wire name of the category.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Affiliation => "affiliation",
            Self::Service => "service",
            Self::Coupon => "coupon",
            Self::Event => "event",
        }
    }
}

impl fmt::Display for RuleCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RuleCategory {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "affiliation" => Ok(Self::Affiliation),
            "service" => Ok(Self::Service),
            "coupon" => Ok(Self::Coupon),
            "event" => Ok(Self::Event),
            other => Err(LedgerError::validation(format!(
                "unknown rule category: {other}"
            ))),
        }
    }
}

/// Whether a mutation adds to or subtracts from the balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Add the deltas.
    Add,
    /// Subtract the deltas.
    Subtract,
}

impl Direction {
    /// Direction for a rule's `is_addition` flag.
    #[must_use]
    pub const fn from_is_addition(is_addition: bool) -> Self {
        if is_addition {
            Self::Add
        } else {
            Self::Subtract
        }
    }

    /// Apply the direction's sign to a non-negative amount.
    #[must_use]
    pub const fn signed(self, amount: i64) -> i64 {
        match self {
            Self::Add => amount,
            Self::Subtract => -amount,
        }
    }
}

/// Current point balance of an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointBalance {
    /// The account this balance belongs to.
    pub account_id: AccountId,
    /// Regular pool, never negative.
    pub regular_balance: i64,
    /// Bonus pool, never negative.
    pub bonus_balance: i64,
    /// Always `regular_balance + bonus_balance`.
    pub total_balance: i64,
    /// Set on every mutation.
    pub last_updated: DateTime<Utc>,
    /// When the balance row was created.
    pub created_at: DateTime<Utc>,
}

impl PointBalance {
    /// Create a zero balance for a new account.
    #[must_use]
    pub fn new(account_id: AccountId) -> Self {
        let now = Utc::now();
        Self {
            account_id,
            regular_balance: 0,
            bonus_balance: 0,
            total_balance: 0,
            last_updated: now,
            created_at: now,
        }
    }

    /// Sum of both pools, or `None` on overflow.
    #[must_use]
    pub const fn total(&self) -> Option<i64> {
        self.regular_balance.checked_add(self.bonus_balance)
    }

    /// Apply a mutation, producing the new balance and its ledger row.
    ///
    /// Nothing is applied if either pool would go negative.
    ///
    /// # Errors
    ///
    /// - `LedgerError::Validation` if the mutation is malformed, targets a
    ///   different account, or overflows.
    /// - `LedgerError::InsufficientBalance` if a pool would go below zero.
    pub fn apply(
        &self,
        mutation: &PointsMutation,
        now: DateTime<Utc>,
    ) -> Result<(PointBalance, PointTransaction)> {
        mutation.validate()?;
        if mutation.account_id != self.account_id {
            return Err(LedgerError::validation(format!(
                "mutation for {} applied to balance of {}",
                mutation.account_id, self.account_id
            )));
        }

        let regular_change = mutation.direction.signed(mutation.regular_delta);
        let bonus_change = mutation.direction.signed(mutation.bonus_delta);

        let new_regular = checked(self.regular_balance.checked_add(regular_change))?;
        let new_bonus = checked(self.bonus_balance.checked_add(bonus_change))?;

        if new_regular < 0 {
            return Err(LedgerError::InsufficientBalance {
                pool: PointType::Regular,
                balance: self.regular_balance,
                required: mutation.regular_delta,
            });
        }
        if new_bonus < 0 {
            return Err(LedgerError::InsufficientBalance {
                pool: PointType::Bonus,
                balance: self.bonus_balance,
                required: mutation.bonus_delta,
            });
        }

        let new_total = checked(new_regular.checked_add(new_bonus))?;
        let point_change = checked(regular_change.checked_add(bonus_change))?;

        let balance = PointBalance {
            account_id: self.account_id.clone(),
            regular_balance: new_regular,
            bonus_balance: new_bonus,
            total_balance: new_total,
            last_updated: now,
            created_at: self.created_at,
        };

        let transaction = PointTransaction {
            id: EntryId::generate(),
            account_id: self.account_id.clone(),
            point_change,
            regular_change,
            bonus_change,
            point_type: mutation.point_type(),
            rule_category: mutation.rule_category,
            rule_id: mutation.rule_id,
            transaction_id: mutation.transaction_id.clone(),
            balance_after: new_total,
            created_at: now,
        };

        Ok((balance, transaction))
    }
}

fn checked(value: Option<i64>) -> Result<i64> {
    value.ok_or_else(|| LedgerError::validation("point arithmetic overflow"))
}

/// A request to change an account's balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointsMutation {
    /// The account to mutate.
    pub account_id: AccountId,
    /// Non-negative change to the regular pool.
    pub regular_delta: i64,
    /// Non-negative change to the bonus pool.
    pub bonus_delta: i64,
    /// Whether the deltas are added or subtracted.
    pub direction: Direction,
    /// Category recorded on the ledger row.
    pub rule_category: RuleCategory,
    /// Caller-supplied audit token.
    pub transaction_id: String,
    /// Rule that produced this mutation, if any.
    pub rule_id: Option<RuleId>,
}

impl PointsMutation {
    /// Check that the mutation is well-formed.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::Validation` for negative deltas or a missing or
    /// oversized transaction token.
    pub fn validate(&self) -> Result<()> {
        if self.regular_delta < 0 || self.bonus_delta < 0 {
            return Err(LedgerError::validation(
                "point deltas must be non-negative; use the direction to subtract",
            ));
        }
        if self.transaction_id.trim().is_empty() {
            return Err(LedgerError::validation("transaction_id must not be empty"));
        }
        if self.transaction_id.chars().count() > MAX_TRANSACTION_ID_LEN {
            return Err(LedgerError::validation(format!(
                "transaction_id exceeds {MAX_TRANSACTION_ID_LEN} characters"
            )));
        }
        Ok(())
    }

    /// The pool recorded on the ledger row: regular if it moved, else bonus.
    #[must_use]
    pub const fn point_type(&self) -> PointType {
        if self.regular_delta != 0 {
            PointType::Regular
        } else {
            PointType::Bonus
        }
    }
}

/// An immutable ledger row describing one balance mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointTransaction {
    /// Store key (ULID, time-ordered).
    pub id: EntryId,
    /// The account whose balance changed.
    pub account_id: AccountId,
    /// Signed total change (positive = addition, negative = subtraction).
    pub point_change: i64,
    /// Signed change of the regular pool.
    pub regular_change: i64,
    /// Signed change of the bonus pool.
    pub bonus_change: i64,
    /// Pool the change is attributed to.
    pub point_type: PointType,
    /// Business category.
    pub rule_category: RuleCategory,
    /// Rule that drove the change, if any.
    pub rule_id: Option<RuleId>,
    /// Caller-supplied audit token.
    pub transaction_id: String,
    /// Total balance after the change.
    pub balance_after: i64,
    /// When the row was written.
    pub created_at: DateTime<Utc>,
}

/// Result of a successful mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerOutcome {
    /// Balance after the mutation.
    pub balance: PointBalance,
    /// The ledger row that was written.
    pub transaction: PointTransaction,
}
