// Main entry point - Dependency injection and server setup
use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use tower_http::{compression::CompressionLayer, trace::TraceLayer};
use tracing_subscriber::EnvFilter;

use solar_dashboard::domain::calendar::SystemClock;
use solar_dashboard::infrastructure::config::load_dashboard_config;
use solar_dashboard::infrastructure::http_source::HttpDashboardSource;
use solar_dashboard::presentation::{AppState, router};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = load_dashboard_config()?;
    let settings = config.panel_settings()?;

    // Infrastructure
    let source = Arc::new(HttpDashboardSource::new(
        &config.backend.base_url,
        config.backend.auth_token.clone(),
        config.backend.timeout(),
    )?);

    let state = Arc::new(AppState {
        source,
        settings: Arc::new(settings),
        clock: Arc::new(SystemClock),
    });

    let app = router(state)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = config
        .server
        .listen
        .parse()
        .with_context(|| format!("Invalid server.listen address {}", config.server.listen))?;
    tracing::info!("Starting solar-dashboard service on {}", addr);

    axum::serve(tokio::net::TcpListener::bind(addr).await?, app).await?;

    Ok(())
}
