//! LINE Login API client implementation.

use std::time::Duration;

use reqwest::{Client, Url};

use super::types::{LineProfile, TokenResponse};

/// Error type for LINE Login operations.
#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// LINE returned a non-success status.
    #[error("LINE API error: {status} - {body}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Response body.
        body: String,
    },

    /// A required field was absent from the response.
    #[error("missing field in LINE response: {0}")]
    MissingField(&'static str),

    /// A configured base URL is not a valid URL.
    #[error("invalid URL: {0}")]
    InvalidUrl(String),
}

/// LINE Login API client.
#[derive(Debug, Clone)]
pub struct LineLoginClient {
    client: Client,
    channel_id: String,
    channel_secret: String,
    redirect_uri: String,
    auth_base_url: String,
    api_base_url: String,
}

impl LineLoginClient {
    /// Create a new LINE Login client.
    ///
    /// # Arguments
    ///
    /// * `channel_id` / `channel_secret` - LINE Login channel credentials
    /// * `redirect_uri` - Callback URI registered for the channel
    /// * `auth_base_url` - Authorize host (e.g., `"https://access.line.me"`)
    /// * `api_base_url` - API host (e.g., `"https://api.line.me"`)
    ///
    /// # Errors
    ///
    /// Returns `IdentityError::Http` if the HTTP client cannot be built.
    pub fn new(
        channel_id: impl Into<String>,
        channel_secret: impl Into<String>,
        redirect_uri: impl Into<String>,
        auth_base_url: impl Into<String>,
        api_base_url: impl Into<String>,
    ) -> Result<Self, IdentityError> {
        let client = Client::builder().timeout(Duration::from_secs(10)).build()?;

        Ok(Self {
            client,
            channel_id: channel_id.into(),
            channel_secret: channel_secret.into(),
            redirect_uri: redirect_uri.into(),
            auth_base_url: auth_base_url.into().trim_end_matches('/').to_string(),
            api_base_url: api_base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Build the authorize URL the user is sent to.
    ///
    /// # Errors
    ///
    /// Returns `IdentityError::InvalidUrl` if the configured authorize host is
    /// malformed.
    pub fn authorize_url(&self, state: &str) -> Result<String, IdentityError> {
        let url = Url::parse_with_params(
            &format!("{}/oauth2/v2.1/authorize", self.auth_base_url),
            [
                ("response_type", "code"),
                ("client_id", self.channel_id.as_str()),
                ("redirect_uri", self.redirect_uri.as_str()),
                ("state", state),
                ("scope", "profile openid"),
            ],
        )
        .map_err(|e| IdentityError::InvalidUrl(e.to_string()))?;
        Ok(url.into())
    }

    /// Exchange an authorization code for an access token.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails, LINE rejects the code, or the
    /// response has no access token.
    pub async fn exchange_code(&self, code: &str) -> Result<TokenResponse, IdentityError> {
        let url = format!("{}/oauth2/v2.1/token", self.api_base_url);

        let response = self
            .client
            .post(&url)
            .form(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", self.redirect_uri.as_str()),
                ("client_id", self.channel_id.as_str()),
                ("client_secret", self.channel_secret.as_str()),
            ])
            .send()
            .await?;

        let token: TokenResponse = Self::handle_response(response).await?;
        if token.access_token.is_empty() {
            return Err(IdentityError::MissingField("access_token"));
        }
        Ok(token)
    }

    /// Fetch the profile of the user owning `access_token`.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the profile lacks a user id
    /// or display name.
    pub async fn fetch_profile(&self, access_token: &str) -> Result<LineProfile, IdentityError> {
        let url = format!("{}/v2/profile", self.api_base_url);

        let response = self
            .client
            .get(&url)
            .bearer_auth(access_token)
            .send()
            .await?;

        let profile: LineProfile = Self::handle_response(response).await?;
        if profile.user_id.is_empty() {
            return Err(IdentityError::MissingField("userId"));
        }
        if profile.display_name.is_empty() {
            return Err(IdentityError::MissingField("displayName"));
        }
        Ok(profile)
    }

    /// Handle API response and convert errors.
    async fn handle_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, IdentityError> {
        let status = response.status();

        if status.is_success() {
            return Ok(response.json().await?);
        }

        let body = response.text().await.unwrap_or_default();
        Err(IdentityError::Api {
            status: status.as_u16(),
            body,
        })
    }
}
