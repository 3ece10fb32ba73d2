use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;

use uigisc_api_rust::app::{app, AppState, StoreBackend};
use uigisc_api_rust::config::AppConfig;
use uigisc_api_rust::resources::ResourceRegistry;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present so cargo run picks up DATABASE_URL, JWT_SECRET, etc.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug")))
        .init();

    let config = AppConfig::from_env();
    config.validate().context("invalid configuration")?;
    info!("Starting UIGISC API in {:?} mode", config.environment);

    let registry = ResourceRegistry::load(&config.resources_file)
        .with_context(|| format!("loading resources from {}", config.resources_file.display()))?;

    let backend = StoreBackend::connect(&config).await?;
    info!("Document store: {}", backend.shared().backend());

    let port = config.api.port;
    let state = AppState::new(config, registry, backend.shared())?;

    let bind_addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", bind_addr))?;

    info!("UIGISC API listening on http://{}", bind_addr);

    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    backend.close().await;
    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received, draining connections");
}
