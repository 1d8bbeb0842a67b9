//! Out-of-band HTTP surface — GET /realtime/stats, /realtime/health and
//! POST /realtime/simulate-rating.
//!
//! The simulate endpoint injects an event from outside the socket protocol
//! (server-initiated broadcasts, test drivers). Unlike the socket path there
//! is no sender to exclude, so the injected event reaches the full active set.

use axum::{extract::State, http::StatusCode, Json};
use cinesync_core::types::{ChangeAction, RatingChangeEvent, RealtimeEvent};
use cinesync_protocol::{WireFrame, SOURCE_SERVER};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;

use crate::app::AppState;

/// GET /realtime/stats — active connection count and process uptime.
/// Purely observational; used by external health-check callers.
pub async fn stats_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "activeConnections": state.peers.len(),
        "uptimeSeconds": state.uptime_seconds(),
    }))
}

/// GET /realtime/health — liveness probe.
pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "message": "relay alive",
        "version": env!("CARGO_PKG_VERSION"),
        "activeConnections": state.peers.len(),
    }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulateRatingRequest {
    pub entity_id: Option<String>,
    pub value: Option<f64>,
    pub action: Option<ChangeAction>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulateRatingResponse {
    pub success: bool,
    pub active_connections: usize,
}

#[derive(Serialize)]
pub struct SimulateRatingError {
    pub error: String,
}

/// POST /realtime/simulate-rating — inject a rating change and broadcast it
/// to all connected peers. Returns 400 when `entityId` or `value` is missing.
pub async fn simulate_rating_handler(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SimulateRatingRequest>,
) -> Result<Json<SimulateRatingResponse>, (StatusCode, Json<SimulateRatingError>)> {
    let entity_id = match body.entity_id {
        Some(id) if !id.is_empty() => id,
        _ => return Err(bad_request("entityId is required")),
    };
    let Some(value) = body.value else {
        return Err(bad_request("value is required"));
    };

    let event = RatingChangeEvent::new(
        entity_id.clone(),
        value,
        body.action.unwrap_or(ChangeAction::Update),
    )
    .with_actor("server");

    let payload = WireFrame::from(RealtimeEvent::Rating(event))
        .with_source(SOURCE_SERVER)
        .to_json();
    let delivered = state.peers.broadcast_all(&payload);
    info!(entity_id, delivered, "injected rating broadcast");

    Ok(Json(SimulateRatingResponse {
        success: true,
        active_connections: state.peers.len(),
    }))
}

fn bad_request(message: &str) -> (StatusCode, Json<SimulateRatingError>) {
    (
        StatusCode::BAD_REQUEST,
        Json(SimulateRatingError {
            error: message.to_string(),
        }),
    )
}
