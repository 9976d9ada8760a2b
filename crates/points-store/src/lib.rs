//! Storage layer for the points service.
//!
//! This crate provides persistent storage for accounts, point balances, the
//! point ledger, rules and login sessions.
//!
//! # Backends
//!
//! - [`PgStore`]: PostgreSQL via `sqlx`. Balance mutations lock the balance
//!   row (`SELECT ... FOR UPDATE`) and commit the ledger row and the new
//!   balance in one transaction.
//! - [`MemoryStore`]: in-process tables behind a single lock, for tests and
//!   local development.
//!
//! # Example
//!
//! ```no_run
//! use points_store::{PgStore, Store};
//! use points_core::Account;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = PgStore::connect("postgres://localhost/points", 5).await?;
//! store.migrate().await?;
//!
//! let mut account = Account::new("U4af4980629...", Some("Hana".into()));
//! let balance = store.create_account(&mut account).await?;
//! assert_eq!(balance.total_balance, 0);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod memory;
pub mod postgres;
pub mod schema;

pub use error::{Result, StoreError};

/// How many account ids are drawn before registration gives up.
pub const MAX_ACCOUNT_ID_ATTEMPTS: usize = 5;
pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use points_core::{
    Account, AccountId, LedgerOutcome, NewRule, PointBalance, PointTransaction, PointsMutation,
    Rule, RuleId, Session, SessionId,
};

/// The storage trait defining all database operations.
///
/// This trait abstracts the storage layer, allowing for different
/// implementations (PostgreSQL, in-memory for testing).
#[async_trait]
pub trait Store: Send + Sync {
    // =========================================================================
    // Account Operations
    // =========================================================================

    /// Insert a new account together with its zero balance.
    ///
    /// Both rows are written in one transaction. If the account id is already
    /// taken a fresh one is generated and written back into `account`.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::AlreadyExists` if the external id is taken, or if
    /// no free account id was found within [`MAX_ACCOUNT_ID_ATTEMPTS`].
    async fn create_account(&self, account: &mut Account) -> Result<PointBalance>;

    /// Get an account by account id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn get_account(&self, account_id: &AccountId) -> Result<Option<Account>>;

    /// Get an account by identity-provider user id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn get_account_by_external_id(&self, external_id: &str) -> Result<Option<Account>>;

    /// Overwrite an existing account's profile fields.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the account doesn't exist.
    async fn update_account(&self, account: &Account) -> Result<()>;

    // =========================================================================
    // Ledger Operations
    // =========================================================================

    /// Get the current balance of an account.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn get_balance(&self, account_id: &AccountId) -> Result<Option<PointBalance>>;

    /// Apply a mutation: lock the balance, compute the new one, and write the
    /// ledger row and the balance atomically.
    ///
    /// Concurrent mutations of the same account are serialized.
    ///
    /// # Errors
    ///
    /// - `StoreError::NotFound` if the account has no balance.
    /// - `StoreError::Ledger` if the ledger rejects the mutation (nothing is
    ///   written).
    async fn apply_mutation(&self, mutation: &PointsMutation) -> Result<LedgerOutcome>;

    /// Append a raw ledger row without touching the balance.
    ///
    /// The caller is responsible for keeping the log consistent.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the account has no balance.
    async fn append_transaction(&self, transaction: &PointTransaction) -> Result<()>;

    /// List ledger rows for an account, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn list_transactions(
        &self,
        account_id: &AccountId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<PointTransaction>>;

    /// All ledger rows for an account, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn all_transactions(&self, account_id: &AccountId) -> Result<Vec<PointTransaction>>;

    // =========================================================================
    // Rule Operations
    // =========================================================================

    /// Store a new rule and return it with its assigned id.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Ledger` if the rule is invalid.
    async fn insert_rule(&self, rule: &NewRule) -> Result<Rule>;

    /// Get a rule by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails or the stored value
    /// cannot be decoded.
    async fn get_rule(&self, rule_id: RuleId) -> Result<Option<Rule>>;

    /// List all rules ordered by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn list_rules(&self) -> Result<Vec<Rule>>;

    // =========================================================================
    // Session Operations
    // =========================================================================

    /// Insert or replace a session.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn put_session(&self, session: &Session) -> Result<()>;

    /// Get a session that has not expired at `now`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn get_session(&self, id: &SessionId, now: DateTime<Utc>) -> Result<Option<Session>>;

    /// Delete a session. Returns whether it existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn delete_session(&self, id: &SessionId) -> Result<bool>;

    /// Delete every session expired at `now`. Returns how many were removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn purge_expired_sessions(&self, now: DateTime<Utc>) -> Result<u64>;
}
