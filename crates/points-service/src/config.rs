//! Service configuration.

use std::path::PathBuf;

/// Default LINE authorize endpoint host.
pub const DEFAULT_LINE_AUTH_URL: &str = "https://access.line.me";

/// Default LINE API host (token exchange and profile).
pub const DEFAULT_LINE_API_URL: &str = "https://api.line.me";

/// Service configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Address to listen on (default: "0.0.0.0:8080").
    pub listen_addr: String,

    /// PostgreSQL connection string. Without it the service runs on the
    /// in-memory store.
    pub database_url: Option<String>,

    /// Maximum pooled database connections (default: 10).
    pub database_max_connections: u32,

    /// Key expected in the `X-Admin-Key` header for privileged endpoints.
    pub admin_api_key: Option<String>,

    /// Directory holding per-account image folders (default: "storage/users").
    pub image_storage_root: PathBuf,

    /// LINE Login channel id.
    pub line_channel_id: Option<String>,

    /// LINE Login channel secret.
    pub line_channel_secret: Option<String>,

    /// Redirect URI registered for the LINE Login channel.
    pub line_redirect_uri: String,

    /// Base URL of the LINE authorize endpoint.
    pub line_auth_url: String,

    /// Base URL of the LINE API.
    pub line_api_url: String,

    /// Frontend URL for post-login redirects.
    pub frontend_url: String,

    /// Session lifetime in seconds (default: 86400).
    pub session_ttl_seconds: i64,

    /// CORS allowed origins.
    pub cors_origins: Vec<String>,

    /// Maximum request body size in bytes.
    pub max_body_bytes: usize,

    /// Request timeout in seconds.
    pub request_timeout_seconds: u64,
}

impl ServiceConfig {
    /// Load configuration from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            listen_addr: std::env::var("LISTEN_ADDR").unwrap_or(defaults.listen_addr),
            database_url: non_empty_var("DATABASE_URL"),
            database_max_connections: parsed_var("DATABASE_MAX_CONNECTIONS")
                .unwrap_or(defaults.database_max_connections),
            admin_api_key: non_empty_var("ADMIN_API_KEY"),
            image_storage_root: std::env::var("IMAGE_STORAGE_ROOT")
                .map_or(defaults.image_storage_root, PathBuf::from),
            line_channel_id: non_empty_var("LINE_LOGIN_CHANNEL_ID"),
            line_channel_secret: non_empty_var("LINE_LOGIN_CHANNEL_SECRET"),
            line_redirect_uri: std::env::var("LINE_REDIRECT_URI")
                .unwrap_or(defaults.line_redirect_uri),
            line_auth_url: std::env::var("LINE_AUTH_URL").unwrap_or(defaults.line_auth_url),
            line_api_url: std::env::var("LINE_API_URL").unwrap_or(defaults.line_api_url),
            frontend_url: std::env::var("FRONTEND_URL").unwrap_or(defaults.frontend_url),
            session_ttl_seconds: parsed_var("SESSION_TTL_SECONDS")
                .unwrap_or(defaults.session_ttl_seconds),
            cors_origins: std::env::var("CORS_ORIGINS")
                .map(|s| parse_origins(&s))
                .unwrap_or(defaults.cors_origins),
            max_body_bytes: parsed_var("MAX_BODY_BYTES").unwrap_or(defaults.max_body_bytes),
            request_timeout_seconds: parsed_var("REQUEST_TIMEOUT_SECONDS")
                .unwrap_or(defaults.request_timeout_seconds),
        }
    }

    /// Whether LINE Login credentials are present.
    #[must_use]
    pub fn has_line_login(&self) -> bool {
        self.line_channel_id.is_some() && self.line_channel_secret.is_some()
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parsed_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|s| s.trim().parse().ok())
}

fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".into(),
            database_url: None,
            database_max_connections: 10,
            admin_api_key: None,
            image_storage_root: PathBuf::from("storage/users"),
            line_channel_id: None,
            line_channel_secret: None,
            line_redirect_uri: "http://localhost:8080/api/auth/callback".into(),
            line_auth_url: DEFAULT_LINE_AUTH_URL.into(),
            line_api_url: DEFAULT_LINE_API_URL.into(),
            frontend_url: "http://localhost:3000".into(),
            session_ttl_seconds: 86_400,
            cors_origins: vec!["*".into()],
            max_body_bytes: 10 * 1024 * 1024,
            request_timeout_seconds: 30,
        }
    }
}
