use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::warn;

/// Outbound payloads buffered per peer before its socket task drains them.
const PEER_QUEUE_CAPACITY: usize = 64;

/// The relay's only shared mutable resource: the set of active connections.
///
/// Each peer is addressed by a transport-level id so a broadcast can exclude
/// the sender. Payloads are handed to the peer's own socket task through a
/// bounded queue; a full queue counts as a failed write for that peer.
pub struct PeerRegistry {
    peers: DashMap<String, mpsc::Sender<String>>,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self {
            peers: DashMap::new(),
        }
    }

    /// Register a new connection. Silent join — no peer is notified.
    /// Returns the queue the connection's socket task must drain.
    pub fn register(&self, conn_id: &str) -> mpsc::Receiver<String> {
        let (tx, rx) = mpsc::channel(PEER_QUEUE_CAPACITY);
        self.peers.insert(conn_id.to_string(), tx);
        rx
    }

    /// Drop a connection from the active set. No notification to peers.
    pub fn remove(&self, conn_id: &str) {
        self.peers.remove(conn_id);
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// Queue `payload` for every active peer except `exclude`.
    ///
    /// Per-peer failures (peer mid-disconnect, queue full) are logged and
    /// skipped so the remaining peers still get the event. The failing peer
    /// is not removed here — its own close event handles that.
    ///
    /// Returns the number of peers the payload was queued for.
    pub fn broadcast_except(&self, exclude: Option<&str>, payload: &str) -> usize {
        let mut delivered = 0;
        for entry in self.peers.iter() {
            if Some(entry.key().as_str()) == exclude {
                continue;
            }
            match entry.value().try_send(payload.to_string()) {
                Ok(()) => delivered += 1,
                Err(e) => {
                    warn!(peer = %entry.key(), error = %e, "broadcast write failed, skipping peer");
                }
            }
        }
        delivered
    }

    /// Queue `payload` for the full active set (out-of-band injection path).
    pub fn broadcast_all(&self, payload: &str) -> usize {
        self.broadcast_except(None, payload)
    }
}

impl Default for PeerRegistry {
    fn default() -> Self {
        Self::new()
    }
}
