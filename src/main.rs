use anyhow::Context;
use docling_service::{api, config, converter, logging, processing, staging};
use std::net::Ipv4Addr;
use std::sync::Arc;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    logging::init_tracing();
    let config = config::init_config().context("Failed to load config from environment")?;

    if let Some(dir) = &config.staging_dir {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create staging directory {}", dir.display()))?;
    }

    let handle = converter::init_converter(config).await;
    let service = processing::ProcessingService::new(
        handle,
        staging::StagingArea::new(config.staging_dir.clone()),
    );
    let app = api::create_router(Arc::new(service), config.max_upload_bytes);

    let listener = TcpListener::bind((Ipv4Addr::UNSPECIFIED, config.server_port))
        .await
        .with_context(|| format!("Failed to bind port {}", config.server_port))?;
    tracing::info!("Listening on http://0.0.0.0:{}", config.server_port);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %err, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
