use axum::{
    extract::{ws::Message, ws::WebSocket, State, WebSocketUpgrade},
    response::IntoResponse,
};
use cinesync_core::config::MAX_PAYLOAD_BYTES;
use cinesync_protocol::{WireFrame, SOURCE_NETWORK};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::app::AppState;

/// Axum handler — upgrades HTTP to WebSocket at GET /realtime/ws.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| run_connection(socket, state))
}

/// Per-connection event loop — lives for the entire WS session.
///
/// Drains two sources: inbound frames from the socket and broadcast payloads
/// queued by other connections. Joining and leaving are silent; peers only
/// ever learn of each other through broadcast events.
async fn run_connection(socket: WebSocket, state: Arc<AppState>) {
    let conn_id = uuid::Uuid::new_v4().to_string();
    let mut queue = state.peers.register(&conn_id);
    info!(conn_id = %conn_id, peers = state.peers.len(), "new relay connection");

    let (mut tx, mut rx) = socket.split();

    loop {
        tokio::select! {
            msg = rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if text.len() > MAX_PAYLOAD_BYTES {
                            warn!(conn_id, size = text.len(), "payload too large, dropping");
                            continue;
                        }
                        handle_frame(&conn_id, text.as_str(), &state);
                    }
                    Some(Ok(Message::Ping(data))) => {
                        let _ = tx.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    _ => {}
                }
            }

            payload = queue.recv() => {
                match payload {
                    Some(payload) => {
                        if tx.send(Message::Text(payload.into())).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
        }
    }

    state.peers.remove(&conn_id);
    info!(conn_id, peers = state.peers.len(), "relay connection closed");
}

/// Validate one inbound frame and rebroadcast it to every other peer.
///
/// Malformed or empty-id frames are dropped silently — this is a best-effort
/// fire-and-forget channel, not a command protocol, so the sender gets no
/// error back.
fn handle_frame(conn_id: &str, text: &str, state: &Arc<AppState>) {
    let Some(frame) = WireFrame::parse(text) else {
        debug!(conn_id, "malformed frame dropped");
        return;
    };

    if !frame.is_valid() {
        warn!(conn_id, "frame without entity id dropped");
        return;
    }

    let entity_id = frame.entity_id().to_string();
    let payload = frame.with_source(SOURCE_NETWORK).to_json();
    let delivered = state.peers.broadcast_except(Some(conn_id), &payload);
    debug!(conn_id, entity_id, delivered, "frame rebroadcast");
}
