//! Core types and ledger rules for the points service.
//!
//! This crate provides the foundational types used throughout the platform:
//!
//! - **Identifiers**: `AccountId`, `EntryId`, `RuleId`, `SessionId`
//! - **Accounts**: `Account`, `ProfileUpdate`
//! - **Points**: `PointBalance`, `PointTransaction`, `PointsMutation`
//! - **Rules**: `Rule`, `PointValue`
//! - **Sessions**: `Session`
//!
//! # Point pools
//!
//! Every account holds two independent pools, **regular** and **bonus**.
//! Neither pool may go below zero, and the total is always their sum.
//! Balances change only through [`PointBalance::apply`], which yields the new
//! balance together with the audit row describing the change.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod account;
pub mod error;
pub mod ids;
pub mod ledger;
pub mod points;
pub mod rule;
pub mod session;

pub use account::{Account, ProfileUpdate};
pub use error::{LedgerError, Result};
pub use ids::{AccountId, EntryId, IdError, RuleId, SessionId};
pub use ledger::{reconcile, replay, ReplayedBalance};
pub use points::{
    Direction, LedgerOutcome, PointBalance, PointTransaction, PointType, PointsMutation,
    RuleCategory, MAX_TRANSACTION_ID_LEN,
};
pub use rule::{NewRule, PointValue, Rule};
pub use session::Session;
