//! Table names shared by the store backends.

/// Table names in the relational schema.
pub mod table {
    /// Platform accounts, keyed by `account_id`.
    pub const ACCOUNTS: &str = "accounts";

    /// One balance row per account, keyed by `account_id`.
    pub const POINT_BALANCES: &str = "point_balances";

    /// Append-only ledger, keyed by `id` (ULID).
    pub const POINT_TRANSACTIONS: &str = "point_transactions";

    /// Point rules, keyed by `id`.
    pub const POINT_RULES: &str = "point_rules";

    /// Login sessions, keyed by session token.
    pub const SESSIONS: &str = "sessions";
}

/// Returns all table names, in creation order.
#[must_use]
pub fn all_tables() -> Vec<&'static str> {
    vec![
        table::ACCOUNTS,
        table::POINT_BALANCES,
        table::POINT_TRANSACTIONS,
        table::POINT_RULES,
        table::SESSIONS,
    ]
}
