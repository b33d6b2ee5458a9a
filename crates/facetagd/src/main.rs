use anyhow::Result;
use facetagd::{api, AppState, Config};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env();
    tracing::info!(
        model = %config.model_path.display(),
        reference_db = %config.reference_db.display(),
        known_names = config.known_names.len(),
        "facetagd starting"
    );

    let addr = config.listen_addr();
    let state = Arc::new(AppState::new(config));

    // Load models up front; a failure here is retried by the first request.
    let models = Arc::clone(state.models());
    match tokio::task::spawn_blocking(move || models.ensure_ready().map(|r| r.strategy())).await? {
        Ok(strategy) => tracing::info!(%strategy, "models initialized"),
        Err(e) => tracing::warn!(error = %e, "model initialization failed; will retry on first request"),
    }

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "facetagd ready");

    axum::serve(listener, api::router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("facetagd shutting down");
        })
        .await?;

    Ok(())
}
