//! Application state.

use std::sync::Arc;

use points_store::Store;

use crate::config::ServiceConfig;
use crate::identity::LineLoginClient;
use crate::images::ImageStorage;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// The storage backend.
    pub store: Arc<dyn Store>,

    /// Service configuration.
    pub config: ServiceConfig,

    /// Image file storage.
    pub images: ImageStorage,

    /// LINE Login client (optional).
    pub line: Option<Arc<LineLoginClient>>,
}

impl AppState {
    /// Create a new application state.
    #[must_use]
    pub fn new(store: Arc<dyn Store>, config: ServiceConfig) -> Self {
        let images = ImageStorage::new(config.image_storage_root.clone());

        let line = config
            .line_channel_id
            .as_ref()
            .zip(config.line_channel_secret.as_ref())
            .and_then(|(channel_id, secret)| {
                match LineLoginClient::new(
                    channel_id,
                    secret,
                    &config.line_redirect_uri,
                    &config.line_auth_url,
                    &config.line_api_url,
                ) {
                    Ok(client) => {
                        tracing::info!(channel_id = %channel_id, "LINE Login enabled");
                        Some(Arc::new(client))
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Failed to create LINE Login client");
                        None
                    }
                }
            });

        if line.is_none() {
            tracing::warn!("LINE Login not configured - /api/auth endpoints will fail");
        }

        if config.admin_api_key.is_none() {
            tracing::warn!("ADMIN_API_KEY not set - admin endpoints will reject every request");
        }

        Self {
            store,
            config,
            images,
            line,
        }
    }

    /// The LINE Login client, or an error if it is not configured.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::ExternalService` when LINE Login is not configured.
    pub fn line_client(&self) -> Result<&LineLoginClient, crate::ApiError> {
        self.line
            .as_deref()
            .ok_or_else(|| crate::ApiError::ExternalService("LINE Login is not configured".into()))
    }
}
