use std::sync::Arc;

use recipe_merge::{api, config::Config, jobs::JobStore, pipeline::RecipeMerger, AppState};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env()?;

    info!("Starting recipe merge service");
    info!("Search endpoint: {}", config.search.base_url);
    info!("Oracle model: {} at {}", config.oracle.model, config.oracle.base_url);
    info!(
        "Job deadline: {}s, fetch rate: {}/s per site",
        config.merge.job_deadline.as_secs(),
        config.fetch.requests_per_second
    );

    let merger = Arc::new(RecipeMerger::from_config(&config)?);
    let jobs = JobStore::new();
    let state = Arc::new(AppState::new(merger, jobs.clone()));
    let app = api::router(state, config.allowed_origin.as_deref())?;

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!("Recipe merge service listening on http://{}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    jobs.shutdown();
    info!("Shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
}
