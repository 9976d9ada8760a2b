//! Login sessions.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{AccountId, SessionId};

/// A login session created after the identity provider confirms a user.
///
/// Sessions are persisted in the store so that any service instance can
/// resolve them, and always carry an expiry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Session token.
    pub id: SessionId,
    /// The logged-in account.
    pub account_id: AccountId,
    /// Identity-provider user id.
    pub external_id: String,
    /// Display name at login time.
    pub display_name: String,
    /// When the session was created.
    pub created_at: DateTime<Utc>,
    /// When the session stops being valid.
    pub expires_at: DateTime<Utc>,
}

impl Session {
    /// Start a session that lasts `ttl` from now.
    #[must_use]
    pub fn start(
        account_id: AccountId,
        external_id: impl Into<String>,
        display_name: impl Into<String>,
        ttl: Duration,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: SessionId::generate(),
            account_id,
            external_id: external_id.into(),
            display_name: display_name.into(),
            created_at: now,
            expires_at: now + ttl,
        }
    }

    /// Whether the session has expired at `now`.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}
