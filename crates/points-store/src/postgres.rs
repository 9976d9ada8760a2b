//! PostgreSQL storage implementation.
//!
//! Balance mutations run inside a transaction that first locks the balance row
//! with `SELECT ... FOR UPDATE`. Concurrent mutations of one account therefore
//! queue on the row lock, and the ledger row and the new balance commit
//! together or not at all.

use std::fmt::Display;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;

use points_core::{
    Account, AccountId, LedgerOutcome, NewRule, PointBalance, PointTransaction, PointValue,
    PointsMutation, Rule, RuleId, Session, SessionId,
};

use crate::error::{Result, StoreError};
use crate::schema;
use crate::{Store, MAX_ACCOUNT_ID_ATTEMPTS};

const ACCOUNT_COLUMNS: &str = "account_id, external_id, nick_name, prefecture, tracking_id, \
     email, mobile_phone, picture_url, sex, birth, account_type, affiliation_type, \
     last_login, created_at, updated_at";

const BALANCE_COLUMNS: &str =
    "account_id, regular_balance, bonus_balance, total_balance, last_updated, created_at";

const TRANSACTION_COLUMNS: &str = "id, account_id, point_change, regular_change, bonus_change, \
     point_type, rule_category, rule_id, transaction_id, balance_after, created_at";

const RULE_COLUMNS: &str = "id, name, description, point_type, service_type, value_kind, \
     point_value, is_addition, created_at";

/// Primary key constraint of `accounts`; a violation means the generated id
/// collided.
const ACCOUNTS_PKEY: &str = "accounts_pkey";

const TRANSACTIONS_RULE_FKEY: &str = "point_transactions_rule_id_fkey";

const SESSION_COLUMNS: &str = "id, account_id, external_id, display_name, created_at, expires_at";

/// PostgreSQL-backed storage.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Wrap an existing connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect to `database_url` with a pool of at most `max_connections`.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Database` if the connection fails.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    /// Run the embedded schema migrations.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Database` if a migration fails.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Database(format!("migration failed: {e}")))?;
        tracing::info!("database migrations applied");
        Ok(())
    }

    /// Delete every row in every table. Only meant for test databases.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Database` if the statement fails.
    pub async fn truncate_all(&self) -> Result<()> {
        let tables = schema::all_tables().join(", ");
        sqlx::query(&format!("TRUNCATE {tables} RESTART IDENTITY CASCADE"))
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

fn parse_column<T>(row: &PgRow, column: &str) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    let raw: String = row.try_get(column)?;
    raw.trim_end()
        .parse()
        .map_err(|e| StoreError::Serialization(format!("{column}: {e}")))
}

fn usize_to_i64(value: usize) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

fn violated_constraint(err: &sqlx::Error) -> Option<&str> {
    match err {
        sqlx::Error::Database(db) => db.constraint(),
        _ => None,
    }
}

async fn insert_account(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    account: &Account,
) -> std::result::Result<(), sqlx::Error> {
    sqlx::query(&format!(
        "INSERT INTO accounts ({ACCOUNT_COLUMNS}) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)"
    ))
    .bind(account.account_id.as_str())
    .bind(&account.external_id)
    .bind(&account.nick_name)
    .bind(&account.prefecture)
    .bind(&account.tracking_id)
    .bind(&account.email)
    .bind(&account.mobile_phone)
    .bind(&account.picture_url)
    .bind(&account.sex)
    .bind(&account.birth)
    .bind(&account.account_type)
    .bind(account.affiliation_type)
    .bind(account.last_login)
    .bind(account.created_at)
    .bind(account.updated_at)
    .execute(&mut **tx)
    .await
    .map(|_| ())
}

fn account_from_row(row: &PgRow) -> Result<Account> {
    Ok(Account {
        account_id: parse_column(row, "account_id")?,
        external_id: row.try_get("external_id")?,
        nick_name: row.try_get("nick_name")?,
        prefecture: row.try_get("prefecture")?,
        tracking_id: row.try_get("tracking_id")?,
        email: row.try_get("email")?,
        mobile_phone: row.try_get("mobile_phone")?,
        picture_url: row.try_get("picture_url")?,
        sex: row.try_get("sex")?,
        birth: row.try_get("birth")?,
        account_type: row.try_get("account_type")?,
        affiliation_type: row.try_get("affiliation_type")?,
        last_login: row.try_get("last_login")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn balance_from_row(row: &PgRow) -> Result<PointBalance> {
    Ok(PointBalance {
        account_id: parse_column(row, "account_id")?,
        regular_balance: row.try_get("regular_balance")?,
        bonus_balance: row.try_get("bonus_balance")?,
        total_balance: row.try_get("total_balance")?,
        last_updated: row.try_get("last_updated")?,
        created_at: row.try_get("created_at")?,
    })
}

fn transaction_from_row(row: &PgRow) -> Result<PointTransaction> {
    let rule_id = row
        .try_get::<Option<i64>, _>("rule_id")?
        .map(RuleId::new)
        .transpose()
        .map_err(|e| StoreError::Serialization(format!("rule_id: {e}")))?;

    Ok(PointTransaction {
        id: parse_column(row, "id")?,
        account_id: parse_column(row, "account_id")?,
        point_change: row.try_get("point_change")?,
        regular_change: row.try_get("regular_change")?,
        bonus_change: row.try_get("bonus_change")?,
        point_type: parse_column(row, "point_type")?,
        rule_category: parse_column(row, "rule_category")?,
        rule_id,
        transaction_id: row.try_get("transaction_id")?,
        balance_after: row.try_get("balance_after")?,
        created_at: row.try_get("created_at")?,
    })
}

fn rule_from_row(row: &PgRow) -> Result<Rule> {
    let id = RuleId::new(row.try_get("id")?)
        .map_err(|e| StoreError::Serialization(format!("id: {e}")))?;
    let kind: String = row.try_get("value_kind")?;
    let raw: f64 = row.try_get("point_value")?;
    let value = match kind.as_str() {
        "percentage" => PointValue::Percentage(raw),
        "absolute" if raw.fract() == 0.0 => {
            #[allow(clippy::cast_possible_truncation)]
            let amount = raw as i64;
            PointValue::Absolute(amount)
        }
        other => {
            return Err(StoreError::Serialization(format!(
                "rule {id}: cannot decode value_kind={other} point_value={raw}"
            )))
        }
    };

    Ok(Rule {
        id,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        point_type: parse_column(row, "point_type")?,
        service_type: parse_column(row, "service_type")?,
        value,
        is_addition: row.try_get("is_addition")?,
        created_at: row.try_get("created_at")?,
    })
}

fn session_from_row(row: &PgRow) -> Result<Session> {
    Ok(Session {
        id: parse_column(row, "id")?,
        account_id: parse_column(row, "account_id")?,
        external_id: row.try_get("external_id")?,
        display_name: row.try_get("display_name")?,
        created_at: row.try_get("created_at")?,
        expires_at: row.try_get("expires_at")?,
    })
}

/// Split a rule value into its stored kind and number.
fn encode_value(value: PointValue) -> (&'static str, f64) {
    match value {
        PointValue::Percentage(p) => ("percentage", p),
        #[allow(clippy::cast_precision_loss)]
        PointValue::Absolute(n) => ("absolute", n as f64),
    }
}

#[async_trait]
impl Store for PgStore {
    // =========================================================================
    // Account Operations
    // =========================================================================

    async fn create_account(&self, account: &mut Account) -> Result<PointBalance> {
        let mut attempts = 1;
        loop {
            let mut tx = self.pool.begin().await?;
            let inserted = insert_account(&mut tx, account).await;

            match inserted {
                Ok(()) => {}
                Err(e) if violated_constraint(&e) == Some(ACCOUNTS_PKEY) => {
                    if attempts == MAX_ACCOUNT_ID_ATTEMPTS {
                        return Err(StoreError::AlreadyExists {
                            entity: "account",
                            id: account.account_id.to_string(),
                        });
                    }
                    tracing::debug!(
                        account_id = %account.account_id,
                        "Account id taken, regenerating"
                    );
                    account.account_id = AccountId::generate();
                    attempts += 1;
                    continue;
                }
                Err(e) if is_unique_violation(&e) => {
                    return Err(StoreError::AlreadyExists {
                        entity: "account",
                        id: account.external_id.clone(),
                    });
                }
                Err(e) => return Err(e.into()),
            }

            let balance = PointBalance::new(account.account_id.clone());
            sqlx::query(&format!(
                "INSERT INTO point_balances ({BALANCE_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6)"
            ))
            .bind(balance.account_id.as_str())
            .bind(balance.regular_balance)
            .bind(balance.bonus_balance)
            .bind(balance.total_balance)
            .bind(balance.last_updated)
            .bind(balance.created_at)
            .execute(&mut *tx)
            .await?;

            tx.commit().await?;
            return Ok(balance);
        }
    }

    async fn get_account(&self, account_id: &AccountId) -> Result<Option<Account>> {
        let row = sqlx::query(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE account_id = $1"
        ))
        .bind(account_id.as_str())
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(account_from_row).transpose()
    }

    async fn get_account_by_external_id(&self, external_id: &str) -> Result<Option<Account>> {
        let row = sqlx::query(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE external_id = $1"
        ))
        .bind(external_id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(account_from_row).transpose()
    }

    async fn update_account(&self, account: &Account) -> Result<()> {
        let result = sqlx::query(
            "UPDATE accounts SET nick_name = $2, prefecture = $3, tracking_id = $4, email = $5, \
             mobile_phone = $6, picture_url = $7, sex = $8, birth = $9, account_type = $10, \
             affiliation_type = $11, last_login = $12, updated_at = $13 \
             WHERE account_id = $1",
        )
        .bind(account.account_id.as_str())
        .bind(&account.nick_name)
        .bind(&account.prefecture)
        .bind(&account.tracking_id)
        .bind(&account.email)
        .bind(&account.mobile_phone)
        .bind(&account.picture_url)
        .bind(&account.sex)
        .bind(&account.birth)
        .bind(&account.account_type)
        .bind(account.affiliation_type)
        .bind(account.last_login)
        .bind(account.updated_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("account", &account.account_id));
        }
        Ok(())
    }

    // =========================================================================
    // Ledger Operations
    // =========================================================================

    async fn get_balance(&self, account_id: &AccountId) -> Result<Option<PointBalance>> {
        let row = sqlx::query(&format!(
            "SELECT {BALANCE_COLUMNS} FROM point_balances WHERE account_id = $1"
        ))
        .bind(account_id.as_str())
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(balance_from_row).transpose()
    }

    async fn apply_mutation(&self, mutation: &PointsMutation) -> Result<LedgerOutcome> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(&format!(
            "SELECT {BALANCE_COLUMNS} FROM point_balances WHERE account_id = $1 FOR UPDATE"
        ))
        .bind(mutation.account_id.as_str())
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| StoreError::not_found("balance", &mutation.account_id))?;
        let current = balance_from_row(&row)?;

        // Returning early drops `tx`, which rolls back and releases the lock.
        let (balance, transaction) = current.apply(mutation, Utc::now())?;

        sqlx::query(&format!(
            "INSERT INTO point_transactions ({TRANSACTION_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)"
        ))
        .bind(transaction.id.to_string())
        .bind(transaction.account_id.as_str())
        .bind(transaction.point_change)
        .bind(transaction.regular_change)
        .bind(transaction.bonus_change)
        .bind(transaction.point_type.as_str())
        .bind(transaction.rule_category.as_str())
        .bind(transaction.rule_id.map(RuleId::get))
        .bind(&transaction.transaction_id)
        .bind(transaction.balance_after)
        .bind(transaction.created_at)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "UPDATE point_balances \
             SET regular_balance = $2, bonus_balance = $3, total_balance = $4, last_updated = $5 \
             WHERE account_id = $1",
        )
        .bind(balance.account_id.as_str())
        .bind(balance.regular_balance)
        .bind(balance.bonus_balance)
        .bind(balance.total_balance)
        .bind(balance.last_updated)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(LedgerOutcome {
            balance,
            transaction,
        })
    }

    async fn append_transaction(&self, transaction: &PointTransaction) -> Result<()> {
        let result = sqlx::query(&format!(
            "INSERT INTO point_transactions ({TRANSACTION_COLUMNS}) \
             SELECT $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11 \
             WHERE EXISTS (SELECT 1 FROM point_balances WHERE account_id = $2)"
        ))
        .bind(transaction.id.to_string())
        .bind(transaction.account_id.as_str())
        .bind(transaction.point_change)
        .bind(transaction.regular_change)
        .bind(transaction.bonus_change)
        .bind(transaction.point_type.as_str())
        .bind(transaction.rule_category.as_str())
        .bind(transaction.rule_id.map(RuleId::get))
        .bind(&transaction.transaction_id)
        .bind(transaction.balance_after)
        .bind(transaction.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| match transaction.rule_id {
            Some(rule_id) if violated_constraint(&e) == Some(TRANSACTIONS_RULE_FKEY) => {
                StoreError::not_found("rule", rule_id)
            }
            _ => e.into(),
        })?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("balance", &transaction.account_id));
        }
        Ok(())
    }

    async fn list_transactions(
        &self,
        account_id: &AccountId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<PointTransaction>> {
        let rows = sqlx::query(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM point_transactions \
             WHERE account_id = $1 \
             ORDER BY created_at DESC, id DESC \
             LIMIT $2 OFFSET $3"
        ))
        .bind(account_id.as_str())
        .bind(usize_to_i64(limit))
        .bind(usize_to_i64(offset))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(transaction_from_row).collect()
    }

    async fn all_transactions(&self, account_id: &AccountId) -> Result<Vec<PointTransaction>> {
        let rows = sqlx::query(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM point_transactions \
             WHERE account_id = $1 \
             ORDER BY created_at ASC, id ASC"
        ))
        .bind(account_id.as_str())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(transaction_from_row).collect()
    }

    // =========================================================================
    // Rule Operations
    // =========================================================================

    async fn insert_rule(&self, rule: &NewRule) -> Result<Rule> {
        rule.validate()?;
        let (kind, value) = encode_value(rule.value);

        let row = sqlx::query(&format!(
            "INSERT INTO point_rules \
             (name, description, point_type, service_type, value_kind, point_value, \
              is_addition, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             RETURNING {RULE_COLUMNS}"
        ))
        .bind(&rule.name)
        .bind(&rule.description)
        .bind(rule.point_type.as_str())
        .bind(rule.service_type.as_str())
        .bind(kind)
        .bind(value)
        .bind(rule.is_addition)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;
        rule_from_row(&row)
    }

    async fn get_rule(&self, rule_id: RuleId) -> Result<Option<Rule>> {
        let row = sqlx::query(&format!("SELECT {RULE_COLUMNS} FROM point_rules WHERE id = $1"))
            .bind(rule_id.get())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(rule_from_row).transpose()
    }

    async fn list_rules(&self) -> Result<Vec<Rule>> {
        let rows = sqlx::query(&format!("SELECT {RULE_COLUMNS} FROM point_rules ORDER BY id"))
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(rule_from_row).collect()
    }

    // =========================================================================
    // Session Operations
    // =========================================================================

    async fn put_session(&self, session: &Session) -> Result<()> {
        sqlx::query(&format!(
            "INSERT INTO sessions ({SESSION_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6) \
             ON CONFLICT (id) DO UPDATE SET \
             account_id = EXCLUDED.account_id, external_id = EXCLUDED.external_id, \
             display_name = EXCLUDED.display_name, created_at = EXCLUDED.created_at, \
             expires_at = EXCLUDED.expires_at"
        ))
        .bind(session.id.to_string())
        .bind(session.account_id.as_str())
        .bind(&session.external_id)
        .bind(&session.display_name)
        .bind(session.created_at)
        .bind(session.expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_session(&self, id: &SessionId, now: DateTime<Utc>) -> Result<Option<Session>> {
        let row = sqlx::query(&format!(
            "SELECT {SESSION_COLUMNS} FROM sessions WHERE id = $1 AND expires_at > $2"
        ))
        .bind(id.to_string())
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(session_from_row).transpose()
    }

    async fn delete_session(&self, id: &SessionId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM sessions WHERE id = $1")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn purge_expired_sessions(&self, now: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM sessions WHERE expires_at <= $1")
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rule_values_encode_by_kind() {
        assert_eq!(encode_value(PointValue::Percentage(0.1)), ("percentage", 0.1));
        assert_eq!(encode_value(PointValue::Absolute(500)), ("absolute", 500.0));
    }

    #[test]
    fn offsets_saturate() {
        assert_eq!(usize_to_i64(10), 10);
        assert_eq!(usize_to_i64(usize::MAX), i64::MAX);
    }
}
