use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

use cinesync_relay::app;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cinesync_relay=info,tower_http=debug".into()),
        )
        .init();

    // load config: explicit path via CINESYNC_CONFIG > ./cinesync.toml > defaults
    let config_path = std::env::var("CINESYNC_CONFIG").ok();
    let config = cinesync_core::config::RealtimeConfig::load(config_path.as_deref())
        .unwrap_or_else(|e| {
            tracing::warn!("Config load failed ({}), using defaults", e);
            cinesync_core::config::RealtimeConfig::default()
        });

    let bind = config.relay.bind.clone();
    let port = config.relay.port;

    let state = Arc::new(app::AppState::new(config));
    let router = app::build_router(state);

    let addr: SocketAddr = format!("{}:{}", bind, port).parse()?;
    info!("CineSync relay listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;

    Ok(())
}
