//! In-memory storage implementation.
//!
//! All tables sit behind one `RwLock`. A balance mutation holds the write lock
//! for its whole read-compute-write, which serializes mutations exactly like a
//! row lock would (and more coarsely).

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use points_core::{
    Account, AccountId, LedgerOutcome, NewRule, PointBalance, PointTransaction, PointsMutation,
    Rule, RuleId, Session, SessionId,
};

use crate::error::{Result, StoreError};
use crate::{Store, MAX_ACCOUNT_ID_ATTEMPTS};

#[derive(Default)]
struct Tables {
    accounts: HashMap<AccountId, Account>,
    accounts_by_external_id: HashMap<String, AccountId>,
    balances: HashMap<AccountId, PointBalance>,
    transactions: HashMap<AccountId, Vec<PointTransaction>>,
    rules: BTreeMap<RuleId, Rule>,
    last_rule_id: i64,
    sessions: HashMap<SessionId, Session>,
}

/// In-memory storage implementation.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn newest_first(rows: &mut [PointTransaction]) {
    rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
}

#[async_trait]
impl Store for MemoryStore {
    // =========================================================================
    // Account Operations
    // =========================================================================

    async fn create_account(&self, account: &mut Account) -> Result<PointBalance> {
        let mut tables = self.tables.write().await;

        if tables
            .accounts_by_external_id
            .contains_key(&account.external_id)
        {
            return Err(StoreError::AlreadyExists {
                entity: "account",
                id: account.external_id.clone(),
            });
        }

        let mut attempts = 1;
        while tables.accounts.contains_key(&account.account_id) {
            if attempts == MAX_ACCOUNT_ID_ATTEMPTS {
                return Err(StoreError::AlreadyExists {
                    entity: "account",
                    id: account.account_id.to_string(),
                });
            }
            tracing::debug!(account_id = %account.account_id, "Account id taken, regenerating");
            account.account_id = AccountId::generate();
            attempts += 1;
        }

        let balance = PointBalance::new(account.account_id.clone());
        tables
            .accounts_by_external_id
            .insert(account.external_id.clone(), account.account_id.clone());
        tables
            .accounts
            .insert(account.account_id.clone(), account.clone());
        tables
            .balances
            .insert(account.account_id.clone(), balance.clone());

        Ok(balance)
    }

    async fn get_account(&self, account_id: &AccountId) -> Result<Option<Account>> {
        Ok(self.tables.read().await.accounts.get(account_id).cloned())
    }

    async fn get_account_by_external_id(&self, external_id: &str) -> Result<Option<Account>> {
        let tables = self.tables.read().await;
        Ok(tables
            .accounts_by_external_id
            .get(external_id)
            .and_then(|id| tables.accounts.get(id))
            .cloned())
    }

    async fn update_account(&self, account: &Account) -> Result<()> {
        let mut tables = self.tables.write().await;
        let existing = tables
            .accounts
            .get_mut(&account.account_id)
            .ok_or_else(|| StoreError::not_found("account", &account.account_id))?;

        // The external id is the login key and never changes.
        let external_id = existing.external_id.clone();
        *existing = account.clone();
        existing.external_id = external_id;
        Ok(())
    }

    // =========================================================================
    // Ledger Operations
    // =========================================================================

    async fn get_balance(&self, account_id: &AccountId) -> Result<Option<PointBalance>> {
        Ok(self.tables.read().await.balances.get(account_id).cloned())
    }

    async fn apply_mutation(&self, mutation: &PointsMutation) -> Result<LedgerOutcome> {
        let mut tables = self.tables.write().await;

        let current = tables
            .balances
            .get(&mutation.account_id)
            .ok_or_else(|| StoreError::not_found("balance", &mutation.account_id))?;

        let (balance, transaction) = current.apply(mutation, Utc::now())?;

        tables
            .transactions
            .entry(mutation.account_id.clone())
            .or_default()
            .push(transaction.clone());
        tables
            .balances
            .insert(mutation.account_id.clone(), balance.clone());

        Ok(LedgerOutcome {
            balance,
            transaction,
        })
    }

    async fn append_transaction(&self, transaction: &PointTransaction) -> Result<()> {
        let mut tables = self.tables.write().await;
        if !tables.balances.contains_key(&transaction.account_id) {
            return Err(StoreError::not_found("balance", &transaction.account_id));
        }
        if let Some(rule_id) = transaction.rule_id {
            if !tables.rules.contains_key(&rule_id) {
                return Err(StoreError::not_found("rule", rule_id));
            }
        }
        tables
            .transactions
            .entry(transaction.account_id.clone())
            .or_default()
            .push(transaction.clone());
        Ok(())
    }

    async fn list_transactions(
        &self,
        account_id: &AccountId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<PointTransaction>> {
        let tables = self.tables.read().await;
        let mut rows = tables
            .transactions
            .get(account_id)
            .cloned()
            .unwrap_or_default();
        newest_first(&mut rows);
        Ok(rows.into_iter().skip(offset).take(limit).collect())
    }

    async fn all_transactions(&self, account_id: &AccountId) -> Result<Vec<PointTransaction>> {
        let tables = self.tables.read().await;
        let mut rows = tables
            .transactions
            .get(account_id)
            .cloned()
            .unwrap_or_default();
        newest_first(&mut rows);
        rows.reverse();
        Ok(rows)
    }

    // =========================================================================
    // Rule Operations
    // =========================================================================

    async fn insert_rule(&self, rule: &NewRule) -> Result<Rule> {
        rule.validate()?;

        let mut tables = self.tables.write().await;
        tables.last_rule_id += 1;
        let id = RuleId::new(tables.last_rule_id).map_err(points_core::LedgerError::from)?;
        let rule = rule.clone().into_rule(id, Utc::now());
        tables.rules.insert(id, rule.clone());
        Ok(rule)
    }

    async fn get_rule(&self, rule_id: RuleId) -> Result<Option<Rule>> {
        Ok(self.tables.read().await.rules.get(&rule_id).cloned())
    }

    async fn list_rules(&self) -> Result<Vec<Rule>> {
        Ok(self.tables.read().await.rules.values().cloned().collect())
    }

    // =========================================================================
    // Session Operations
    // =========================================================================

    async fn put_session(&self, session: &Session) -> Result<()> {
        self.tables
            .write()
            .await
            .sessions
            .insert(session.id.clone(), session.clone());
        Ok(())
    }

    async fn get_session(&self, id: &SessionId, now: DateTime<Utc>) -> Result<Option<Session>> {
        Ok(self
            .tables
            .read()
            .await
            .sessions
            .get(id)
            .filter(|s| !s.is_expired(now))
            .cloned())
    }

    async fn delete_session(&self, id: &SessionId) -> Result<bool> {
        Ok(self.tables.write().await.sessions.remove(id).is_some())
    }

    async fn purge_expired_sessions(&self, now: DateTime<Utc>) -> Result<u64> {
        let mut tables = self.tables.write().await;
        let before = tables.sessions.len();
        tables.sessions.retain(|_, s| !s.is_expired(now));
        Ok((before - tables.sessions.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Duration;
    use points_core::{Direction, LedgerError, PointType, PointValue, RuleCategory};

    use super::*;

    async fn store_with_account() -> (MemoryStore, AccountId) {
        let store = MemoryStore::new();
        let mut account = Account::new("U-test", Some("Hana".into()));
        store.create_account(&mut account).await.unwrap();
        (store, account.account_id)
    }

    fn mutation(
        account_id: &AccountId,
        regular: i64,
        bonus: i64,
        direction: Direction,
    ) -> PointsMutation {
        PointsMutation {
            account_id: account_id.clone(),
            regular_delta: regular,
            bonus_delta: bonus,
            direction,
            rule_category: RuleCategory::Service,
            transaction_id: "txn12345".into(),
            rule_id: None,
        }
    }

    #[tokio::test]
    async fn create_account_initializes_zero_balance() {
        let (store, account_id) = store_with_account().await;

        let balance = store.get_balance(&account_id).await.unwrap().unwrap();
        assert_eq!(balance.total_balance, 0);

        let by_external = store
            .get_account_by_external_id("U-test")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(by_external.account_id, account_id);
    }

    #[tokio::test]
    async fn duplicate_external_id_is_rejected() {
        let (store, _) = store_with_account().await;
        let mut again = Account::new("U-test", None);
        let result = store.create_account(&mut again).await;
        assert!(matches!(
            result,
            Err(StoreError::AlreadyExists { id, .. }) if id == "U-test"
        ));
    }

    #[tokio::test]
    async fn account_id_collision_draws_a_new_id() {
        let (store, taken) = store_with_account().await;
        let mut other = Account::new("U-other", None);
        other.account_id = taken.clone();

        store.create_account(&mut other).await.unwrap();

        assert_ne!(other.account_id, taken);
        let stored = store.get_account(&other.account_id).await.unwrap().unwrap();
        assert_eq!(stored.external_id, "U-other");
        let original = store.get_account(&taken).await.unwrap().unwrap();
        assert_eq!(original.external_id, "U-test");
    }

    #[tokio::test]
    async fn mutation_writes_balance_and_row() {
        let (store, account_id) = store_with_account().await;

        let outcome = store
            .apply_mutation(&mutation(&account_id, 300, 20, Direction::Add))
            .await
            .unwrap();
        assert_eq!(outcome.balance.total_balance, 320);
        assert_eq!(outcome.transaction.balance_after, 320);

        let rows = store.list_transactions(&account_id, 10, 0).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0], outcome.transaction);
    }

    #[tokio::test]
    async fn rejected_mutation_leaves_no_trace() {
        let (store, account_id) = store_with_account().await;
        store
            .apply_mutation(&mutation(&account_id, 300, 0, Direction::Add))
            .await
            .unwrap();

        let result = store
            .apply_mutation(&mutation(&account_id, 500, 0, Direction::Subtract))
            .await;
        assert!(matches!(
            result,
            Err(StoreError::Ledger(LedgerError::InsufficientBalance {
                pool: PointType::Regular,
                balance: 300,
                required: 500,
            }))
        ));

        let balance = store.get_balance(&account_id).await.unwrap().unwrap();
        assert_eq!(balance.regular_balance, 300);
        assert_eq!(store.all_transactions(&account_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unknown_account_is_not_found() {
        let store = MemoryStore::new();
        let ghost = AccountId::generate();
        let result = store
            .apply_mutation(&mutation(&ghost, 1, 0, Direction::Add))
            .await;
        assert!(matches!(result, Err(StoreError::NotFound { .. })));
    }

    #[tokio::test]
    async fn raw_row_with_unknown_rule_is_rejected() {
        let (store, account_id) = store_with_account().await;
        let (_, mut row) = PointBalance::new(account_id.clone())
            .apply(&mutation(&account_id, 10, 0, Direction::Add), Utc::now())
            .unwrap();
        row.rule_id = Some(RuleId::new(999).unwrap());

        let result = store.append_transaction(&row).await;

        assert!(matches!(
            result,
            Err(StoreError::NotFound { entity: "rule", .. })
        ));
        assert!(store.all_transactions(&account_id).await.unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_subtractions_never_overdraw() {
        let (store, account_id) = store_with_account().await;
        store
            .apply_mutation(&mutation(&account_id, 100, 0, Direction::Add))
            .await
            .unwrap();

        let store = Arc::new(store);
        let handles: Vec<_> = [50, 60]
            .into_iter()
            .map(|amount| {
                let store = Arc::clone(&store);
                let m = mutation(&account_id, amount, 0, Direction::Subtract);
                tokio::spawn(async move { store.apply_mutation(&m).await })
            })
            .collect();

        let mut successes = 0;
        let mut rejections = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => successes += 1,
                Err(StoreError::Ledger(LedgerError::InsufficientBalance { .. })) => {
                    rejections += 1;
                }
                Err(other) => panic!("unexpected error: {other}"),
            }
        }
        assert_eq!((successes, rejections), (1, 1));

        let balance = store.get_balance(&account_id).await.unwrap().unwrap();
        assert!(balance.regular_balance == 50 || balance.regular_balance == 40);
        assert!(balance.regular_balance >= 0);
        let log = store.all_transactions(&account_id).await.unwrap();
        points_core::reconcile(&balance, &log).unwrap();
    }

    #[tokio::test]
    async fn transactions_paginate_newest_first() {
        let (store, account_id) = store_with_account().await;
        for amount in 1..=5 {
            store
                .apply_mutation(&mutation(&account_id, amount, 0, Direction::Add))
                .await
                .unwrap();
        }

        let page1 = store.list_transactions(&account_id, 2, 0).await.unwrap();
        let page2 = store.list_transactions(&account_id, 2, 2).await.unwrap();
        let page3 = store.list_transactions(&account_id, 2, 4).await.unwrap();
        assert_eq!(page1.len(), 2);
        assert_eq!(page3.len(), 1);
        assert!(page1[0].created_at >= page1[1].created_at);
        assert!(page1[1].created_at >= page2[0].created_at);
        assert_eq!(page3[0].point_change, 1);
    }

    #[tokio::test]
    async fn rules_get_sequential_ids() {
        let store = MemoryStore::new();
        let new_rule = NewRule {
            name: "first visit".into(),
            description: None,
            point_type: PointType::Bonus,
            service_type: RuleCategory::Event,
            value: PointValue::Absolute(500),
            is_addition: true,
        };
        let first = store.insert_rule(&new_rule).await.unwrap();
        let second = store.insert_rule(&new_rule).await.unwrap();
        assert_eq!(first.id.get(), 1);
        assert_eq!(second.id.get(), 2);
        assert_eq!(store.get_rule(first.id).await.unwrap().unwrap(), first);
        assert_eq!(store.list_rules().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn invalid_rule_is_rejected() {
        let store = MemoryStore::new();
        let bad = NewRule {
            name: "broken".into(),
            description: None,
            point_type: PointType::Regular,
            service_type: RuleCategory::Service,
            value: PointValue::Percentage(3.0),
            is_addition: true,
        };
        assert!(matches!(
            store.insert_rule(&bad).await,
            Err(StoreError::Ledger(LedgerError::Validation(_)))
        ));
    }

    #[tokio::test]
    async fn expired_sessions_are_invisible_and_purged() {
        let (store, account_id) = store_with_account().await;
        let live = Session::start(account_id.clone(), "U-test", "Hana", Duration::hours(1));
        let mut dead = Session::start(account_id, "U-test", "Hana", Duration::hours(1));
        dead.expires_at = dead.created_at - Duration::seconds(1);

        store.put_session(&live).await.unwrap();
        store.put_session(&dead).await.unwrap();

        let now = Utc::now();
        assert!(store.get_session(&live.id, now).await.unwrap().is_some());
        assert!(store.get_session(&dead.id, now).await.unwrap().is_none());
        assert_eq!(store.purge_expired_sessions(now).await.unwrap(), 1);
        assert!(store.delete_session(&live.id).await.unwrap());
        assert!(!store.delete_session(&live.id).await.unwrap());
    }
}
