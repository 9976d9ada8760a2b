//! Points Service - HTTP API for the points ledger
//!
//! This is the main entry point for the points service.

use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use points_service::{create_router, AppState, ServiceConfig};
use points_store::{MemoryStore, PgStore, Store};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,points=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Points Service");

    let config = ServiceConfig::from_env();

    tracing::info!(
        listen_addr = %config.listen_addr,
        database_configured = %config.database_url.is_some(),
        line_configured = %config.has_line_login(),
        image_root = %config.image_storage_root.display(),
        "Service configuration loaded"
    );

    let store: Arc<dyn Store> = match config.database_url.as_deref() {
        Some(url) => {
            tracing::info!(
                max_connections = config.database_max_connections,
                "Connecting to PostgreSQL"
            );
            let store = PgStore::connect(url, config.database_max_connections).await?;
            store.migrate().await?;
            tracing::info!("Database migrations applied");
            Arc::new(store)
        }
        None => {
            tracing::warn!("DATABASE_URL not set - using in-memory store, data will not persist");
            Arc::new(MemoryStore::new())
        }
    };

    let state = AppState::new(store, config.clone());

    let app = create_router(state);
    tracing::info!("Router configured with all API endpoints");

    tracing::info!(listen_addr = %config.listen_addr, "Starting HTTP server");
    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
