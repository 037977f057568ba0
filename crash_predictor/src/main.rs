use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use crash_predictor::{
    config::AppConfig,
    server::{self, AppState},
    session::Session,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cfg = AppConfig::from_env()?;
    let session = Session::from_config(&cfg)?;

    // Warmup so a broken artifact fails before we accept traffic
    let y = session.warmup().context("warmup prediction failed")?;
    tracing::info!("warmup forward ok ({:.3})", y);

    let state = AppState {
        session: Arc::new(session),
        log_predictions: cfg.log_predictions,
    };
    let app = server::router(state);

    tracing::info!("listening on {}", cfg.addr);
    let listener = tokio::net::TcpListener::bind(cfg.addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
