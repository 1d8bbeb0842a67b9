//! Client-side connection manager — owns the single logical connection to the
//! relay and recovers from transport failures with bounded exponential
//! backoff. Failures are never surfaced as errors to collaborators, only as
//! observable state.

use cinesync_core::config::ReconnectConfig;
use cinesync_core::types::{ConnectionPhase, ConnectionState, DeliveryChannel, RealtimeEvent};
use cinesync_core::RealtimeError;
use cinesync_protocol::WireFrame;
use futures_util::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use crate::dispatch::EventDispatcher;

/// Outbound events buffered while the socket task drains them.
const OUTBOUND_QUEUE: usize = 64;

type WsStream = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

/// At most one active relay connection per process.
///
/// Constructed by the application's composition root and handed to whoever
/// needs to emit — exactly-one-per-process comes from ownership, not from a
/// hidden global.
pub struct ConnectionManager {
    inner: Arc<ConnInner>,
}

struct ConnInner {
    url: String,
    config: ReconnectConfig,
    dispatcher: EventDispatcher,
    state_tx: watch::Sender<ConnectionState>,
    /// Present only while a session is live; `emit` goes through here.
    outbound: Mutex<Option<mpsc::Sender<String>>>,
    reconnect_tx: mpsc::Sender<()>,
    reconnect_rx: Mutex<Option<mpsc::Receiver<()>>>,
    running: AtomicBool,
}

impl ConnInner {
    fn set_state(&self, phase: ConnectionPhase, attempt_count: u32) {
        let max_attempts = self.config.max_attempts;
        self.state_tx.send_replace(ConnectionState {
            phase,
            attempt_count: attempt_count.min(max_attempts),
            max_attempts,
        });
    }

    fn clear_outbound(&self) {
        *self.outbound.lock().unwrap() = None;
    }
}

impl ConnectionManager {
    /// `url` is the relay's WebSocket endpoint, e.g.
    /// `ws://127.0.0.1:3001/realtime/ws`.
    pub fn new(url: impl Into<String>, config: ReconnectConfig, dispatcher: EventDispatcher) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::new(config.max_attempts));
        let (reconnect_tx, reconnect_rx) = mpsc::channel(1);
        Self {
            inner: Arc::new(ConnInner {
                url: url.into(),
                config,
                dispatcher,
                state_tx,
                outbound: Mutex::new(None),
                reconnect_tx,
                reconnect_rx: Mutex::new(Some(reconnect_rx)),
                running: AtomicBool::new(false),
            }),
        }
    }

    /// Start the connection lifecycle. Idempotent — a second call while the
    /// background task is alive does nothing.
    pub fn connect(&self) {
        if self.inner.running.swap(true, Ordering::SeqCst) {
            debug!("connection manager already running");
            return;
        }
        let Some(reconnect_rx) = self.inner.reconnect_rx.lock().unwrap().take() else {
            return;
        };
        let inner = Arc::clone(&self.inner);
        tokio::spawn(run(inner, reconnect_rx));
    }

    /// Send one event to the relay.
    ///
    /// When not connected this is a logged no-op — the channel offers no
    /// durability, so nothing is queued for later.
    pub fn emit(&self, event: RealtimeEvent) {
        let guard = self.inner.outbound.lock().unwrap();
        match guard.as_ref() {
            Some(tx) => {
                let payload = WireFrame::from(event).to_json();
                if let Err(e) = tx.try_send(payload) {
                    warn!(error = %e, "emit failed, event dropped");
                }
            }
            None => {
                debug!("emit while not connected — event dropped, not queued");
            }
        }
    }

    /// Explicit retry after the manager pinned itself at `failed`.
    /// Resets the attempt counter and starts a fresh connect cycle.
    pub fn reconnect(&self) {
        if !self.inner.running.load(Ordering::SeqCst) {
            self.connect();
            return;
        }
        // only honored while pinned at failed — requests sent in any other
        // phase would otherwise linger and trigger a surprise retry later
        if !self.has_failed() {
            debug!("reconnect ignored — connection not in failed state");
            return;
        }
        if self.inner.reconnect_tx.try_send(()).is_err() {
            debug!("reconnect already requested");
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.inner.state_tx.borrow()
    }

    /// Watch channel for collaborators that want transition notifications.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state_tx.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    pub fn is_reconnecting(&self) -> bool {
        self.state().is_reconnecting()
    }

    pub fn has_failed(&self) -> bool {
        self.state().has_failed()
    }
}

/// Backoff delay served before retry attempt `attempt` (1-indexed):
/// `min(base * 2^attempt, cap)`.
fn backoff_delay(attempt: u32, config: &ReconnectConfig) -> Duration {
    let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
    let ms = config
        .base_delay_ms
        .saturating_mul(factor)
        .min(config.cap_delay_ms);
    Duration::from_millis(ms)
}

/// Connection lifecycle loop.
///
/// The inner loop walks the state machine: connecting → connected →
/// reconnecting on any failure, pinning at failed once the attempt budget is
/// spent. The outer loop parks in failed until an explicit reconnect request
/// arrives, then starts over with a zeroed counter.
async fn run(inner: Arc<ConnInner>, mut reconnect_rx: mpsc::Receiver<()>) {
    loop {
        let mut attempts: u32 = 0;
        loop {
            inner.set_state(ConnectionPhase::Connecting, attempts);
            match try_connect(&inner).await {
                Ok(socket) => {
                    attempts = 0;
                    inner.set_state(ConnectionPhase::Connected, 0);
                    info!(url = %inner.url, "connected to relay");

                    drive_session(&inner, socket).await;
                    inner.clear_outbound();
                    debug!("relay transport closed");

                    inner.set_state(ConnectionPhase::Reconnecting, attempts);
                    tokio::time::sleep(backoff_delay(1, &inner.config)).await;
                }
                Err(e) => {
                    attempts += 1;
                    debug!(attempt = attempts, error = %e, "connect attempt failed");
                    if attempts >= inner.config.max_attempts {
                        inner.set_state(ConnectionPhase::Failed, attempts);
                        warn!(
                            attempts,
                            "reconnect attempts exhausted — explicit reconnect required"
                        );
                        break;
                    }
                    inner.set_state(ConnectionPhase::Reconnecting, attempts);
                    tokio::time::sleep(backoff_delay(attempts, &inner.config)).await;
                }
            }
        }

        // pinned at failed: only an explicit reconnect request moves us on
        if reconnect_rx.recv().await.is_none() {
            return;
        }
        info!("manual reconnect requested");
    }
}

/// One connect attempt, bounded by the configured timeout.
async fn try_connect(inner: &Arc<ConnInner>) -> Result<WsStream, RealtimeError> {
    let timeout = Duration::from_millis(inner.config.connect_timeout_ms);
    match tokio::time::timeout(timeout, tokio_tungstenite::connect_async(inner.url.as_str())).await
    {
        Ok(Ok((socket, _response))) => Ok(socket),
        Ok(Err(e)) => Err(RealtimeError::Transport(e.to_string())),
        Err(_) => Err(RealtimeError::ConnectTimeout {
            ms: inner.config.connect_timeout_ms,
        }),
    }
}

/// Pump one live session: inbound frames go to the dispatcher tagged
/// `network`, queued emits go out. Returns when the transport closes.
async fn drive_session(inner: &Arc<ConnInner>, socket: WsStream) {
    let (mut tx, mut rx) = socket.split();
    let (out_tx, mut out_rx) = mpsc::channel::<String>(OUTBOUND_QUEUE);
    *inner.outbound.lock().unwrap() = Some(out_tx);

    loop {
        tokio::select! {
            msg = rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        match WireFrame::parse(text.as_str()) {
                            Some(frame) if frame.is_valid() => {
                                inner.dispatcher.inbound(
                                    frame.into_event(),
                                    DeliveryChannel::Network,
                                );
                            }
                            _ => debug!("malformed relay frame dropped"),
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        let _ = tx.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    _ => {}
                }
            }

            payload = out_rx.recv() => {
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
}
