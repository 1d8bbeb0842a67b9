//! Local fan-out bridge — carries events to other same-machine execution
//! contexts that do not share the relay connection.
//!
//! Two transports sit behind one seam: the primary shared broadcast hub, and
//! a storage-backed fallback for runtimes where the hub primitive is not
//! available. Both preserve the rule that a publisher never observes its own
//! publication — that is what prevents immediate self-echo.

use async_trait::async_trait;
use cinesync_core::config::{BRIDGE_CHANNEL_NAME, BRIDGE_HISTORY_LIMIT};
use cinesync_core::types::{DeliveryChannel, RealtimeEvent};
use cinesync_core::RealtimeError;
use cinesync_protocol::{WireFrame, SOURCE_SAME_ORIGIN};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use crate::dispatch::EventDispatcher;

const HUB_CAPACITY: usize = 256;

/// Identifies one execution context on the shared transport, so the
/// transport can withhold a publisher's own messages from it.
pub type ContextId = uuid::Uuid;

/// Seam between the bridge and whichever local transport is available.
#[async_trait]
pub trait BridgeTransport: Send + Sync {
    /// Stable lowercase identifier for logs (e.g. `"broadcast"`, `"storage"`).
    fn name(&self) -> &str;

    /// Deliver `payload` to every subscribed context except `publisher`.
    async fn publish(&self, publisher: ContextId, payload: String) -> Result<(), RealtimeError>;

    /// Register `subscriber` and return the stream of payloads published by
    /// *other* contexts.
    fn subscribe(&self, subscriber: ContextId) -> mpsc::UnboundedReceiver<String>;
}

/// Primary transport: a named shared broadcast channel, no server round-trip.
///
/// One hub instance is shared by every context on the machine (in tests,
/// every simulated context in the process).
pub struct BroadcastHub {
    name: String,
    tx: broadcast::Sender<(ContextId, String)>,
}

impl BroadcastHub {
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        let (tx, _) = broadcast::channel(HUB_CAPACITY);
        Arc::new(Self {
            name: name.into(),
            tx,
        })
    }

    /// Hub on the well-known process-wide channel name.
    pub fn with_default_name() -> Arc<Self> {
        Self::new(BRIDGE_CHANNEL_NAME)
    }

    pub fn channel_name(&self) -> &str {
        &self.name
    }
}

#[async_trait]
impl BridgeTransport for BroadcastHub {
    fn name(&self) -> &str {
        "broadcast"
    }

    async fn publish(&self, publisher: ContextId, payload: String) -> Result<(), RealtimeError> {
        // no other subscribed context is not an error for a best-effort channel
        let _ = self.tx.send((publisher, payload));
        Ok(())
    }

    fn subscribe(&self, subscriber: ContextId) -> mpsc::UnboundedReceiver<String> {
        let mut hub_rx = self.tx.subscribe();
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            loop {
                match hub_rx.recv().await {
                    Ok((origin, _)) if origin == subscriber => {
                        // own publication — never echoed back
                    }
                    Ok((_, payload)) => {
                        if tx.send(payload).is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "bridge subscriber lagged, events lost");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        rx
    }
}

struct StoreRecord {
    #[allow(dead_code)]
    key: String,
    payload: String,
}

struct StoreInner {
    records: VecDeque<StoreRecord>,
    watchers: Vec<(ContextId, mpsc::UnboundedSender<String>)>,
}

/// Fallback transport: a shared key-value store driven by change
/// notifications.
///
/// Publishing writes a uniquely-keyed record and notifies every *other*
/// watcher — the writer does not see its own write as a notification. The
/// record buffer is pruned oldest-first at `history_limit` so a context that
/// never reads cannot grow it without bound.
pub struct SharedStore {
    history_limit: usize,
    inner: Mutex<StoreInner>,
}

impl SharedStore {
    pub fn new(history_limit: usize) -> Arc<Self> {
        Arc::new(Self {
            history_limit,
            inner: Mutex::new(StoreInner {
                records: VecDeque::new(),
                watchers: Vec::new(),
            }),
        })
    }

    pub fn with_default_limit() -> Arc<Self> {
        Self::new(BRIDGE_HISTORY_LIMIT)
    }

    /// Number of buffered historical records (bounded by the prune policy).
    pub fn buffered_len(&self) -> usize {
        self.inner.lock().unwrap().records.len()
    }
}

#[async_trait]
impl BridgeTransport for SharedStore {
    fn name(&self) -> &str {
        "storage"
    }

    async fn publish(&self, publisher: ContextId, payload: String) -> Result<(), RealtimeError> {
        let mut inner = self.inner.lock().unwrap();

        inner.records.push_back(StoreRecord {
            key: uuid::Uuid::new_v4().to_string(),
            payload: payload.clone(),
        });
        while inner.records.len() > self.history_limit {
            inner.records.pop_front();
        }

        // notify other contexts; drop watchers whose context is gone
        inner
            .watchers
            .retain(|(id, tx)| *id == publisher || tx.send(payload.clone()).is_ok());
        Ok(())
    }

    fn subscribe(&self, subscriber: ContextId) -> mpsc::UnboundedReceiver<String> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.lock().unwrap().watchers.push((subscriber, tx));
        rx
    }
}

/// One context's handle on the local fan-out channel.
///
/// Owned by the composition root next to the [`ConnectionManager`]; exactly
/// one per process, enforced by ownership rather than a global.
///
/// [`ConnectionManager`]: crate::conn::ConnectionManager
pub struct LocalBridge {
    context_id: ContextId,
    transport: Arc<dyn BridgeTransport>,
    dispatcher: EventDispatcher,
    initialized: AtomicBool,
}

impl LocalBridge {
    pub fn new(transport: Arc<dyn BridgeTransport>, dispatcher: EventDispatcher) -> Self {
        Self {
            context_id: uuid::Uuid::new_v4(),
            transport,
            dispatcher,
            initialized: AtomicBool::new(false),
        }
    }

    /// Establish the inbound subscription. Idempotent — returns `false`
    /// without side effects when already initialized, so calling twice never
    /// creates a duplicate subscription.
    pub fn init(&self) -> bool {
        if self.initialized.swap(true, Ordering::SeqCst) {
            debug!("local bridge already initialized");
            return false;
        }

        let mut rx = self.transport.subscribe(self.context_id);
        let dispatcher = self.dispatcher.clone();
        info!(transport = self.transport.name(), "local bridge subscribed");
        tokio::spawn(async move {
            while let Some(payload) = rx.recv().await {
                match WireFrame::parse(&payload) {
                    Some(frame) if frame.is_valid() => {
                        dispatcher.inbound(frame.into_event(), DeliveryChannel::SameOrigin);
                    }
                    _ => debug!("malformed bridge payload dropped"),
                }
            }
        });
        true
    }

    /// Serialize and send one event to every other context.
    pub async fn publish(&self, event: RealtimeEvent) -> Result<(), RealtimeError> {
        let payload = WireFrame::from(event)
            .with_source(SOURCE_SAME_ORIGIN)
            .to_json();
        self.transport.publish(self.context_id, payload).await
    }
}
