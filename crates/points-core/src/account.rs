//! Account types.
//!
//! An account is a client or cast identity on the platform. It is created on
//! first login through the identity provider and owns exactly one point
//! balance.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{LedgerError, Result};
use crate::AccountId;

/// Maximum length of free-text profile fields.
const MAX_FIELD_LEN: usize = 255;

/// A platform account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Public account id (invitation id).
    pub account_id: AccountId,

    /// Stable user id from the identity provider.
    pub external_id: String,

    /// Display name chosen on the platform.
    pub nick_name: Option<String>,

    /// Home prefecture.
    pub prefecture: Option<String>,

    /// Marketing tracking id captured at first login.
    pub tracking_id: Option<String>,

    /// Contact email.
    pub email: Option<String>,

    /// Contact phone number.
    pub mobile_phone: Option<String>,

    /// Profile picture URL.
    pub picture_url: Option<String>,

    /// Self-declared sex.
    pub sex: Option<String>,

    /// Birth date as entered by the user.
    pub birth: Option<String>,

    /// Account type, e.g. `guest` or `cast`.
    pub account_type: Option<String>,

    /// Affiliate program tier. Managed by the platform, not the user.
    pub affiliation_type: i32,

    /// Last successful login.
    pub last_login: Option<DateTime<Utc>>,

    /// When the account was created.
    pub created_at: DateTime<Utc>,

    /// When the account was last updated.
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// Create a new account for an identity-provider user.
    #[must_use]
    pub fn new(external_id: impl Into<String>, nick_name: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            account_id: AccountId::generate(),
            external_id: external_id.into(),
            nick_name,
            prefecture: None,
            tracking_id: None,
            email: None,
            mobile_phone: None,
            picture_url: None,
            sex: None,
            birth: None,
            account_type: None,
            affiliation_type: 0,
            last_login: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Apply an allow-listed profile update.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::Validation` if the update is malformed; the
    /// account is left untouched in that case.
    pub fn apply_update(&mut self, update: &ProfileUpdate) -> Result<()> {
        update.validate()?;

        let fields = [
            (&mut self.nick_name, &update.nick_name),
            (&mut self.prefecture, &update.prefecture),
            (&mut self.email, &update.email),
            (&mut self.mobile_phone, &update.mobile_phone),
            (&mut self.picture_url, &update.picture_url),
            (&mut self.sex, &update.sex),
            (&mut self.birth, &update.birth),
            (&mut self.account_type, &update.account_type),
        ];
        for (target, value) in fields {
            if let Some(value) = value {
                *target = Some(value.clone());
            }
        }

        self.updated_at = Utc::now();
        Ok(())
    }

    /// Record a login.
    pub fn touch_login(&mut self, at: DateTime<Utc>) {
        self.last_login = Some(at);
        self.updated_at = at;
    }
}

/// The profile fields a user may change.
///
/// Fields left as `None` are not modified. Identifiers, the affiliate tier
/// and timestamps are not part of it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProfileUpdate {
    /// Display name.
    pub nick_name: Option<String>,
    /// Home prefecture.
    pub prefecture: Option<String>,
    /// Contact email.
    pub email: Option<String>,
    /// Contact phone number.
    pub mobile_phone: Option<String>,
    /// Profile picture URL.
    pub picture_url: Option<String>,
    /// Self-declared sex.
    pub sex: Option<String>,
    /// Birth date.
    pub birth: Option<String>,
    /// Account type.
    pub account_type: Option<String>,
}

impl ProfileUpdate {
    /// Check field lengths and the email format.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::Validation` describing the first bad field.
    pub fn validate(&self) -> Result<()> {
        let fields = [
            ("nick_name", &self.nick_name),
            ("prefecture", &self.prefecture),
            ("email", &self.email),
            ("mobile_phone", &self.mobile_phone),
            ("picture_url", &self.picture_url),
            ("sex", &self.sex),
            ("birth", &self.birth),
            ("account_type", &self.account_type),
        ];
        for (name, value) in fields {
            if value.as_ref().is_some_and(|v| v.chars().count() > MAX_FIELD_LEN) {
                return Err(LedgerError::validation(format!(
                    "{name} exceeds {MAX_FIELD_LEN} characters"
                )));
            }
        }

        if let Some(email) = &self.email {
            if !is_plausible_email(email) {
                return Err(LedgerError::validation(format!("invalid email: {email}")));
            }
        }
        Ok(())
    }
}

/// `local@domain.tld` with no whitespace.
fn is_plausible_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !email.chars().any(char::is_whitespace)
        && !domain.contains('@')
        && domain
            .split_once('.')
            .is_some_and(|(host, tld)| !host.is_empty() && !tld.is_empty())
}
