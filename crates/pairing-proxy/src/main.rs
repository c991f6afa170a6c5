//! Pairing Proxy - Entry point.

use anyhow::Context;
use link_client::BridgeClient;
use pairing_proxy::{
    api::{create_router, AppState, RateLimitState},
    auth::AuthStore,
    config::Config,
    upload::HttpUploader,
    Coordinator, CoordinatorSettings, CredentialExporter, ExportSettings,
};
use retry_cache::RetryCache;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = Config::load().context("Failed to load configuration")?;

    init_logging(&config.log.level);

    info!("Starting Pairing Proxy");

    // Lives for the whole process; never cleared by hand
    let retry_cache = RetryCache::new(config.session.retry_ttl);

    let bridge = BridgeClient::new(&config.link.bridge_url, config.link.poll_interval)
        .context("Failed to create bridge client")?;

    if bridge.health_check().await {
        info!("Protocol bridge healthy at {}", config.link.bridge_url);
    } else {
        warn!(
            "Protocol bridge not reachable at {} - will retry on requests",
            config.link.bridge_url
        );
    }

    let uploader = HttpUploader::new(&config.upload.endpoint, config.upload.token.clone())
        .context("Failed to create upload client")?;

    let exporter = CredentialExporter::new(Arc::new(uploader), ExportSettings::from_config(&config));

    let coordinator = Coordinator::new(
        Arc::new(bridge.clone()),
        AuthStore::new(&config.session.dir),
        exporter,
        retry_cache,
        CoordinatorSettings::from_config(&config),
    );

    let state = AppState::new(coordinator).with_bridge(bridge);
    let rate_limit = RateLimitState::new(config.rate_limit.per_minute);
    let app = create_router(state, rate_limit, Some(config.server.static_dir.clone()));

    let addr = SocketAddr::new(
        config
            .server
            .listen_addr
            .parse()
            .unwrap_or([0, 0, 0, 0].into()),
        config.server.port,
    );

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    info!("Running on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            info!("Shutdown signal received");
        })
        .await
        .context("Server error")?;

    info!("Shutting down...");
    Ok(())
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
