use axum::{
    http::{header, HeaderValue, Method},
    routing::{get, post},
    Router,
};
use cinesync_core::config::RealtimeConfig;
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::CorsLayer;

use crate::ws::broadcast::PeerRegistry;

/// Central shared state — passed as Arc<AppState> to all Axum handlers.
pub struct AppState {
    pub config: RealtimeConfig,
    pub peers: PeerRegistry,
    started_at: Instant,
}

impl AppState {
    pub fn new(config: RealtimeConfig) -> Self {
        Self {
            config,
            peers: PeerRegistry::new(),
            started_at: Instant::now(),
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}

/// Assemble the full Axum router.
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = cors_layer(&state.config);

    Router::new()
        .route("/realtime/ws", get(crate::ws::connection::ws_handler))
        .route("/realtime/stats", get(crate::http::realtime::stats_handler))
        .route(
            "/realtime/health",
            get(crate::http::realtime::health_handler),
        )
        .route(
            "/realtime/simulate-rating",
            post(crate::http::realtime::simulate_rating_handler),
        )
        .with_state(state)
        .layer(cors)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

/// Static allow-list from config. Origins that fail to parse are skipped.
fn cors_layer(config: &RealtimeConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .relay
        .allowed_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE])
}
