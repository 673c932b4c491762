use anyhow::Result;
use std::sync::Arc;

use data_cleanser::{config, logging, routes, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    logging::init_logging()?;

    // Load configuration
    let config = config::Config::from_env()?;
    std::fs::create_dir_all(&config.upload_dir)?;
    let addr = config.bind_addr;
    tracing::info!(upload_dir = %config.upload_dir.display(), chunk_size = config.chunk_size, "Configuration loaded");

    // Build our application state
    let state = Arc::new(AppState::new(config));

    let app = routes::router(state);

    // Run it
    tracing::info!("listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
