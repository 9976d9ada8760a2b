//! LINE Login API types.

use serde::{Deserialize, Serialize};

/// Token endpoint response.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    /// Access token for the profile API.
    #[serde(default)]
    pub access_token: String,
    /// Token type, normally `Bearer`.
    #[serde(default)]
    pub token_type: Option<String>,
    /// Lifetime of the access token in seconds.
    #[serde(default)]
    pub expires_in: Option<i64>,
    /// Refresh token.
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Granted scopes.
    #[serde(default)]
    pub scope: Option<String>,
    /// OpenID Connect ID token.
    #[serde(default)]
    pub id_token: Option<String>,
}

/// Profile endpoint response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineProfile {
    /// Stable LINE user id.
    #[serde(default)]
    pub user_id: String,
    /// LINE display name.
    #[serde(default)]
    pub display_name: String,
    /// Profile picture URL.
    #[serde(default)]
    pub picture_url: Option<String>,
    /// Status message.
    #[serde(default)]
    pub status_message: Option<String>,
}

/// Values carried through the OAuth `state` parameter.
///
/// The frontend sends `tracking_id=<id>&page=<path>`; unknown keys are
/// ignored and missing ones fall back to defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginState {
    /// Marketing tracking id, if any.
    pub tracking_id: Option<String>,
    /// Frontend path to return to.
    pub page: String,
}

impl LoginState {
    /// Parse a raw `state` value.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let mut state = Self {
            tracking_id: None,
            page: "/".into(),
        };
        for (key, value) in raw.split('&').filter_map(|pair| pair.split_once('=')) {
            match key {
                "tracking_id" if !value.is_empty() => state.tracking_id = Some(value.into()),
                // Only same-site paths, never an absolute URL.
                "page" if value.starts_with('/') && !value.starts_with("//") => {
                    state.page = value.into();
                }
                _ => {}
            }
        }
        state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_with_both_keys() {
        let state = LoginState::parse("tracking_id=abc123&page=/cast/42");
        assert_eq!(state.tracking_id.as_deref(), Some("abc123"));
        assert_eq!(state.page, "/cast/42");
    }

    #[test]
    fn state_defaults() {
        let state = LoginState::parse("12345");
        assert_eq!(state.tracking_id, None);
        assert_eq!(state.page, "/");
    }

    #[test]
    fn state_rejects_offsite_page() {
        assert_eq!(LoginState::parse("page=https://evil.example").page, "/");
        assert_eq!(LoginState::parse("page=//evil.example").page, "/");
    }

    #[test]
    fn profile_uses_camel_case() {
        let profile: LineProfile = serde_json::from_value(serde_json::json!({
            "userId": "U4af4980629",
            "displayName": "Hana",
            "pictureUrl": "https://profile.line-scdn.net/abc"
        }))
        .unwrap();
        assert_eq!(profile.user_id, "U4af4980629");
        assert_eq!(profile.display_name, "Hana");
        assert_eq!(profile.status_message, None);
    }
}
