// End-to-end relay scenarios over real TCP: one peer emits, the others
// receive, the sender never hears its own event back.

use cinesync_core::config::RealtimeConfig;
use cinesync_relay::app::{build_router, AppState};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio_tungstenite::tungstenite::Message;

type WsClient = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

async fn spawn_relay() -> String {
    let state = Arc::new(AppState::new(RealtimeConfig::default()));
    let router = build_router(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("127.0.0.1:{}", addr.port())
}

async fn connect(addr: &str) -> WsClient {
    let (ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/realtime/ws"))
        .await
        .expect("ws connect failed");
    ws
}

/// Poll /realtime/stats until the registry has settled at `expected` peers.
async fn wait_for_peers(addr: &str, expected: u64) {
    let client = reqwest::Client::new();
    for _ in 0..100 {
        let stats: serde_json::Value = client
            .get(format!("http://{addr}/realtime/stats"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        if stats["activeConnections"] == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("active connection count never reached {expected}");
}

async fn recv_json(ws: &mut WsClient) -> serde_json::Value {
    let msg = tokio::time::timeout(Duration::from_secs(2), ws.next())
        .await
        .expect("no frame within 2s")
        .expect("stream ended")
        .expect("ws error");
    match msg {
        Message::Text(text) => serde_json::from_str(text.as_str()).unwrap(),
        other => panic!("expected text frame, got {other:?}"),
    }
}

async fn assert_silent(ws: &mut WsClient) {
    let result = tokio::time::timeout(Duration::from_millis(300), ws.next()).await;
    assert!(result.is_err(), "peer unexpectedly received {result:?}");
}

fn rating_json(entity_id: &str, value: f64, action: &str) -> String {
    serde_json::json!({
        "type": "rating-updated",
        "entityId": entity_id,
        "value": value,
        "action": action,
        "actorId": "u-test",
        "occurredAt": 1_700_000_000_000_i64,
    })
    .to_string()
}

#[tokio::test]
async fn broadcast_reaches_all_peers_except_sender() {
    let addr = spawn_relay().await;
    let mut x = connect(&addr).await;
    let mut y = connect(&addr).await;
    let mut z = connect(&addr).await;
    wait_for_peers(&addr, 3).await;

    x.send(Message::Text(rating_json("m1", 4.0, "create").into()))
        .await
        .unwrap();

    for peer in [&mut y, &mut z] {
        let frame = recv_json(peer).await;
        assert_eq!(frame["type"], "rating-updated");
        assert_eq!(frame["entityId"], "m1");
        assert_eq!(frame["value"], 4.0);
        assert_eq!(frame["source"], "network");
    }
    assert_silent(&mut x).await;
}

#[tokio::test]
async fn malformed_frames_are_dropped_without_side_effects() {
    let addr = spawn_relay().await;
    let mut x = connect(&addr).await;
    let mut y = connect(&addr).await;
    wait_for_peers(&addr, 2).await;

    // empty entity id, then outright garbage
    x.send(Message::Text(rating_json("", 4.0, "update").into()))
        .await
        .unwrap();
    x.send(Message::Text("{not json".to_string().into()))
        .await
        .unwrap();

    assert_silent(&mut y).await;
    // both connections survive the bad frames
    wait_for_peers(&addr, 2).await;
}

#[tokio::test]
async fn simulate_rating_reaches_every_peer() {
    let addr = spawn_relay().await;
    // neither client ever emits anything themselves
    let mut a = connect(&addr).await;
    let mut b = connect(&addr).await;
    wait_for_peers(&addr, 2).await;

    let response = reqwest::Client::new()
        .post(format!("http://{addr}/realtime/simulate-rating"))
        .json(&serde_json::json!({"entityId": "m2", "value": 5.0, "action": "update"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["success"], true);
    assert_eq!(body["activeConnections"], 2);

    for peer in [&mut a, &mut b] {
        let frame = recv_json(peer).await;
        assert_eq!(frame["entityId"], "m2");
        assert_eq!(frame["value"], 5.0);
        assert_eq!(frame["action"], "update");
        assert_eq!(frame["source"], "server");
    }
}

#[tokio::test]
async fn simulate_rating_without_value_is_rejected() {
    let addr = spawn_relay().await;
    let mut a = connect(&addr).await;
    wait_for_peers(&addr, 1).await;

    let response = reqwest::Client::new()
        .post(format!("http://{addr}/realtime/simulate-rating"))
        .json(&serde_json::json!({"entityId": "m2"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);

    assert_silent(&mut a).await;
}

#[tokio::test]
async fn stats_and_health_report_active_connections() {
    let addr = spawn_relay().await;
    let _a = connect(&addr).await;
    wait_for_peers(&addr, 1).await;

    let client = reqwest::Client::new();
    let stats: serde_json::Value = client
        .get(format!("http://{addr}/realtime/stats"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(stats["activeConnections"], 1);
    assert!(stats["uptimeSeconds"].is_u64());

    let health: serde_json::Value = client
        .get(format!("http://{addr}/realtime/health"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["activeConnections"], 1);
    assert!(health["message"].is_string());
}

#[tokio::test]
async fn disconnected_peer_leaves_the_active_set() {
    let addr = spawn_relay().await;
    let x = connect(&addr).await;
    let mut y = connect(&addr).await;
    wait_for_peers(&addr, 2).await;

    drop(x);
    wait_for_peers(&addr, 1).await;

    // remaining peer still gets injected broadcasts
    reqwest::Client::new()
        .post(format!("http://{addr}/realtime/simulate-rating"))
        .json(&serde_json::json!({"entityId": "m3", "value": 1.0}))
        .send()
        .await
        .unwrap();
    let frame = recv_json(&mut y).await;
    assert_eq!(frame["entityId"], "m3");
}
