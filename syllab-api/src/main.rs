//! SYLLAB API server entry point
//!
//! Bootstraps configuration, connects the PostgreSQL store, ensures the
//! schema, and starts the Axum HTTP server.

use std::sync::Arc;

use syllab_api::{create_api_router, unconfigured_generators, ApiConfig, ApiError, ApiResult, AppState};
use syllab_core::EngineConfig;
use syllab_store::{BuildStore, PgConfig, PgStore};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ApiResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let pg_config = PgConfig::from_env();
    let store = PgStore::from_config(&pg_config)
        .map_err(|e| ApiError::internal_error(format!("Failed to create store: {}", e)))?;
    store
        .ensure_schema()
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to ensure schema: {}", e)))?;
    let store: Arc<dyn BuildStore> = Arc::new(store);

    let engine_config = EngineConfig::from_env();
    let api_config = ApiConfig::from_env();
    let addr = api_config.bind_addr();

    let state = AppState::new(store, unconfigured_generators(), engine_config, api_config);
    let app = create_api_router(state);

    tracing::info!(%addr, "Starting SYLLAB API server");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to bind {}: {}", addr, e)))?;

    let server = axum::serve(listener, app);
    tokio::select! {
        result = server => {
            result.map_err(|e| ApiError::internal_error(format!("Server error: {}", e)))?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
        }
    }

    Ok(())
}
