//! Single convergence point for inbound events.
//!
//! Events may arrive over the relay socket, the same-machine bridge, or an
//! in-process injection. This module stamps their provenance, suppresses
//! near-simultaneous duplicates, and re-emits one uniform event stream that
//! collaborators subscribe to by entity id — they never learn which channel
//! delivered an update.

use cinesync_core::config::COALESCE_WINDOW_MS;
use cinesync_core::types::{DeliveryChannel, RealtimeEvent};
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tracing::{debug, trace};

/// An inbound event after provenance stamping and dedup.
#[derive(Debug, Clone)]
pub struct NormalizedEvent {
    pub event: RealtimeEvent,
    pub channel: DeliveryChannel,
}

type Callback = Arc<dyn Fn(&NormalizedEvent) + Send + Sync>;

/// Per-entity dedup window.
///
/// While a guard is live, an arrival with the same dedup key as the last
/// emission is dropped; an arrival with a different key is held (latest wins)
/// and re-emitted once when the window closes.
struct Guard {
    /// Invalidates the timer task if the guard it armed is gone.
    epoch: u64,
    emitted_key: String,
    pending: Option<NormalizedEvent>,
}

struct Inner {
    window: Duration,
    next_id: AtomicU64,
    subscribers: DashMap<String, Vec<(u64, Callback)>>,
    guards: Mutex<HashMap<String, Guard>>,
}

impl Inner {
    fn emit(&self, entity_id: &str, normalized: &NormalizedEvent) {
        // clone out of the map so a callback can subscribe/unsubscribe freely
        let callbacks: Vec<Callback> = match self.subscribers.get(entity_id) {
            Some(slots) => slots.iter().map(|(_, cb)| Arc::clone(cb)).collect(),
            None => return,
        };
        trace!(entity_id, listeners = callbacks.len(), "dispatching event");
        for callback in callbacks {
            callback(normalized);
        }
    }
}

/// Deduplicating publish/subscribe registry keyed by entity id.
///
/// Cheap to clone — all clones share one registry and one guard table, which
/// is what keeps the at-most-once contract across delivery channels.
#[derive(Clone)]
pub struct EventDispatcher {
    inner: Arc<Inner>,
}

impl EventDispatcher {
    pub fn new(coalesce_window_ms: u64) -> Self {
        Self {
            inner: Arc::new(Inner {
                window: Duration::from_millis(coalesce_window_ms),
                next_id: AtomicU64::new(0),
                subscribers: DashMap::new(),
                guards: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Register interest in one entity id. The callback fires exactly once
    /// per deduplicated inbound event matching that id. Dropping the returned
    /// [`Subscription`] unregisters the callback.
    pub fn subscribe(
        &self,
        entity_id: impl Into<String>,
        callback: impl Fn(&NormalizedEvent) + Send + Sync + 'static,
    ) -> Subscription {
        let entity_id = entity_id.into();
        let slot = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner
            .subscribers
            .entry(entity_id.clone())
            .or_default()
            .push((slot, Arc::new(callback)));
        Subscription {
            inner: Arc::downgrade(&self.inner),
            entity_id,
            slot,
        }
    }

    /// Feed one inbound event from a delivery channel.
    ///
    /// Events without an entity id are dropped here as well — the dispatcher
    /// is the last line of defense against malformed input from any channel.
    pub fn inbound(&self, event: RealtimeEvent, channel: DeliveryChannel) {
        if event.entity_id().is_empty() {
            debug!(?channel, "event without entity id dropped");
            return;
        }

        let entity_id = event.entity_id().to_string();
        let key = event.dedup_key();
        let normalized = NormalizedEvent { event, channel };

        let mut guards = self.inner.guards.lock().unwrap();
        match guards.get_mut(&entity_id) {
            None => {
                let epoch = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
                guards.insert(
                    entity_id.clone(),
                    Guard {
                        epoch,
                        emitted_key: key,
                        pending: None,
                    },
                );
                drop(guards);
                self.inner.emit(&entity_id, &normalized);
                self.arm_timer(entity_id, epoch);
            }
            Some(guard) => {
                if guard.emitted_key == key {
                    trace!(entity_id, ?channel, "duplicate delivery suppressed");
                    return;
                }
                // different change inside the window: coalesce, latest wins
                guard.pending = Some(normalized);
            }
        }
    }

    /// Inject an event from in-process test/manual code paths.
    pub fn inject(&self, event: RealtimeEvent) {
        self.inbound(event, DeliveryChannel::InternalTest);
    }

    /// Close the guard for `entity_id` once the window elapses, re-emitting a
    /// coalesced pending event if one accumulated. A re-emission opens a
    /// fresh window keyed to the pending event so its own cross-channel
    /// duplicate is suppressed too.
    fn arm_timer(&self, entity_id: String, epoch: u64) {
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            tokio::time::sleep(inner.window).await;

            let pending = {
                let mut guards = inner.guards.lock().unwrap();
                match guards.get(&entity_id) {
                    Some(guard) if guard.epoch == epoch => {
                        guards.remove(&entity_id).and_then(|g| g.pending)
                    }
                    // guard no longer ours — a newer timer owns it
                    _ => None,
                }
            };

            if let Some(normalized) = pending {
                let dispatcher = EventDispatcher { inner };
                let key = normalized.event.dedup_key();
                let next_epoch = dispatcher.inner.next_id.fetch_add(1, Ordering::Relaxed);
                dispatcher.inner.guards.lock().unwrap().insert(
                    entity_id.clone(),
                    Guard {
                        epoch: next_epoch,
                        emitted_key: key,
                        pending: None,
                    },
                );
                dispatcher.inner.emit(&entity_id, &normalized);
                dispatcher.arm_timer(entity_id, next_epoch);
            }
        });
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new(COALESCE_WINDOW_MS)
    }
}

/// Disposer handle returned by [`EventDispatcher::subscribe`].
///
/// Dropping it removes the callback, so a collaborator that goes away cannot
/// leak listeners across component lifecycles.
pub struct Subscription {
    inner: Weak<Inner>,
    entity_id: String,
    slot: u64,
}

impl Subscription {
    /// Explicit teardown for call sites that prefer a named operation.
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(inner) = self.inner.upgrade() {
            if let Some(mut slots) = inner.subscribers.get_mut(&self.entity_id) {
                slots.retain(|(slot, _)| *slot != self.slot);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cinesync_core::types::{ChangeAction, RatingChangeEvent};
    use std::sync::mpsc;

    fn rating(entity: &str, actor: &str, occurred_at: i64, value: f64) -> RealtimeEvent {
        let mut event = RatingChangeEvent::new(entity, value, ChangeAction::Update);
        event.actor_id = actor.to_string();
        event.occurred_at = occurred_at;
        RealtimeEvent::Rating(event)
    }

    fn collector(
        dispatcher: &EventDispatcher,
        entity: &str,
    ) -> (mpsc::Receiver<NormalizedEvent>, Subscription) {
        let (tx, rx) = mpsc::channel();
        let sub = dispatcher.subscribe(entity, move |ev| {
            let _ = tx.send(ev.clone());
        });
        (rx, sub)
    }

    #[tokio::test(start_paused = true)]
    async fn duplicate_across_channels_dispatches_once() {
        let dispatcher = EventDispatcher::new(300);
        let (rx, _sub) = collector(&dispatcher, "m1");

        dispatcher.inbound(rating("m1", "u1", 1000, 4.0), DeliveryChannel::Network);
        dispatcher.inbound(rating("m1", "u1", 1000, 4.0), DeliveryChannel::SameOrigin);

        tokio::time::sleep(Duration::from_millis(400)).await;

        let first = rx.try_recv().unwrap();
        assert_eq!(first.channel, DeliveryChannel::Network);
        assert!(rx.try_recv().is_err(), "duplicate was dispatched");
    }

    #[tokio::test(start_paused = true)]
    async fn different_change_in_window_is_coalesced_latest_wins() {
        let dispatcher = EventDispatcher::new(300);
        let (rx, _sub) = collector(&dispatcher, "m1");

        dispatcher.inbound(rating("m1", "u1", 1000, 3.0), DeliveryChannel::Network);
        dispatcher.inbound(rating("m1", "u1", 1100, 4.0), DeliveryChannel::Network);
        dispatcher.inbound(rating("m1", "u1", 1200, 5.0), DeliveryChannel::Network);

        // only the first emission before the window closes
        assert_eq!(rx.try_recv().unwrap().event.dedup_key(), "m1:u1:1000");
        assert!(rx.try_recv().is_err());

        tokio::time::sleep(Duration::from_millis(400)).await;

        // window closed: one re-emission carrying the latest payload
        let coalesced = rx.try_recv().unwrap();
        assert_eq!(coalesced.event.dedup_key(), "m1:u1:1200");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn reemission_guards_against_its_own_duplicate() {
        let dispatcher = EventDispatcher::new(300);
        let (rx, _sub) = collector(&dispatcher, "m1");

        dispatcher.inbound(rating("m1", "u1", 1000, 3.0), DeliveryChannel::Network);
        dispatcher.inbound(rating("m1", "u1", 1100, 4.0), DeliveryChannel::Network);
        tokio::time::sleep(Duration::from_millis(350)).await;

        // the cross-channel copy of the coalesced event arrives late
        dispatcher.inbound(rating("m1", "u1", 1100, 4.0), DeliveryChannel::SameOrigin);
        tokio::time::sleep(Duration::from_millis(400)).await;

        assert_eq!(rx.try_recv().unwrap().event.dedup_key(), "m1:u1:1000");
        assert_eq!(rx.try_recv().unwrap().event.dedup_key(), "m1:u1:1100");
        assert!(rx.try_recv().is_err(), "late duplicate was dispatched");
    }

    #[tokio::test(start_paused = true)]
    async fn subscribers_only_hear_their_entity() {
        let dispatcher = EventDispatcher::new(300);
        let (rx_m1, _sub1) = collector(&dispatcher, "m1");
        let (rx_m2, _sub2) = collector(&dispatcher, "m2");

        dispatcher.inject(rating("m1", "u1", 1000, 4.0));
        tokio::time::sleep(Duration::from_millis(400)).await;

        assert_eq!(rx_m1.try_recv().unwrap().channel, DeliveryChannel::InternalTest);
        assert!(rx_m2.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_subscription_unregisters_callback() {
        let dispatcher = EventDispatcher::new(300);
        let (rx, sub) = collector(&dispatcher, "m1");

        dispatcher.inject(rating("m1", "u1", 1000, 4.0));
        assert!(rx.try_recv().is_ok());

        drop(sub);
        tokio::time::sleep(Duration::from_millis(400)).await;
        dispatcher.inject(rating("m1", "u1", 2000, 5.0));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn empty_entity_id_never_dispatches() {
        let dispatcher = EventDispatcher::new(300);
        let (rx, _sub) = collector(&dispatcher, "");

        dispatcher.inject(rating("", "u1", 1000, 4.0));
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn separate_entities_do_not_share_guards() {
        let dispatcher = EventDispatcher::new(300);
        let (rx_m1, _s1) = collector(&dispatcher, "m1");
        let (rx_m2, _s2) = collector(&dispatcher, "m2");

        dispatcher.inject(rating("m1", "u1", 1000, 4.0));
        dispatcher.inject(rating("m2", "u1", 1000, 2.0));

        assert!(rx_m1.try_recv().is_ok());
        assert!(rx_m2.try_recv().is_ok());
    }
}
