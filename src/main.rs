use std::sync::Arc;

use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use newsdesk::config::Config;
use newsdesk::routes::{self, AppState};
use newsdesk::upstream::UpstreamClient;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "newsdesk=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config_path =
        std::env::var("NEWSDESK_CONFIG").unwrap_or_else(|_| "newsdesk.toml".to_string());
    let config = Config::load(&config_path)?;
    let api_key = Config::api_key()?;
    info!("Loaded configuration from {}", config_path);

    let upstream = UpstreamClient::new(&config.upstream, api_key)?;
    let state = Arc::new(AppState::new(upstream, config.cache.policy()));

    let app = routes::app(state, &config.static_dir, &config.allowed_origins);

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    info!("Server running at http://{}", config.listen_addr);

    axum::serve(listener, app).await?;

    Ok(())
}
