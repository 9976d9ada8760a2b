//! Replaying the ledger.
//!
//! The transaction log is the audit trail for a balance: folding it from zero
//! must land exactly on the stored balance, and every row's `balance_after`
//! must match the running total at that point.

use serde::Serialize;

use crate::error::{LedgerError, Result};
use crate::points::{PointBalance, PointTransaction};

/// Pools reconstructed from a transaction log.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReplayedBalance {
    /// Regular pool.
    pub regular_balance: i64,
    /// Bonus pool.
    pub bonus_balance: i64,
    /// Number of rows replayed.
    pub entries: usize,
}

impl ReplayedBalance {
    /// Sum of both pools, or `None` on overflow.
    #[must_use]
    pub const fn total(&self) -> Option<i64> {
        self.regular_balance.checked_add(self.bonus_balance)
    }
}

/// Fold a transaction log in `created_at` order, starting from zero.
///
/// Input order does not matter; rows are sorted by `created_at` and then by
/// entry id.
///
/// # Errors
///
/// Returns `LedgerError::Validation` if a row's pool changes do not add up to
/// its `point_change`, or its `balance_after` disagrees with the running total.
pub fn replay<'a, I>(transactions: I) -> Result<ReplayedBalance>
where
    I: IntoIterator<Item = &'a PointTransaction>,
{
    let mut rows: Vec<&PointTransaction> = transactions.into_iter().collect();
    rows.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));

    let mut state = ReplayedBalance::default();
    for tx in rows {
        if tx.regular_change.checked_add(tx.bonus_change) != Some(tx.point_change) {
            return Err(LedgerError::validation(format!(
                "entry {} pool changes do not sum to point_change",
                tx.id
            )));
        }

        state.regular_balance = state
            .regular_balance
            .checked_add(tx.regular_change)
            .ok_or_else(|| LedgerError::validation("point arithmetic overflow"))?;
        state.bonus_balance = state
            .bonus_balance
            .checked_add(tx.bonus_change)
            .ok_or_else(|| LedgerError::validation("point arithmetic overflow"))?;
        state.entries += 1;

        let total = state
            .total()
            .ok_or_else(|| LedgerError::validation("point arithmetic overflow"))?;
        if total != tx.balance_after {
            return Err(LedgerError::validation(format!(
                "entry {} records balance_after={} but running total is {total}",
                tx.id, tx.balance_after
            )));
        }
    }

    Ok(state)
}

/// Check that a stored balance equals the replay of its log.
///
/// # Errors
///
/// Returns `LedgerError::Validation` if the replay fails or the pools differ.
pub fn reconcile<'a, I>(balance: &PointBalance, transactions: I) -> Result<ReplayedBalance>
where
    I: IntoIterator<Item = &'a PointTransaction>,
{
    let replayed = replay(transactions)?;
    if replayed.regular_balance != balance.regular_balance
        || replayed.bonus_balance != balance.bonus_balance
        || balance.total() != Some(balance.total_balance)
    {
        return Err(LedgerError::validation(format!(
            "balance of {} does not match ledger: stored regular={} bonus={} total={}, \
             replayed regular={} bonus={}",
            balance.account_id,
            balance.regular_balance,
            balance.bonus_balance,
            balance.total_balance,
            replayed.regular_balance,
            replayed.bonus_balance
        )));
    }
    Ok(replayed)
}
