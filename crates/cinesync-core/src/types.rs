use serde::{Deserialize, Serialize};
use std::fmt;

/// Marker used when a producer does not identify itself.
pub const ANONYMOUS_ACTOR: &str = "anonymous";

/// What a rating change means for the consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeAction {
    /// A rating that did not exist before.
    Create,

    /// An existing rating with a new value.
    Update,

    /// A rating was removed.
    Delete,
}

impl fmt::Display for ChangeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeAction::Create => write!(f, "create"),
            ChangeAction::Update => write!(f, "update"),
            ChangeAction::Delete => write!(f, "delete"),
        }
    }
}

/// Which channel delivered an event to this process.
///
/// Stamped by the dispatcher on re-emission — producers never set this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeliveryChannel {
    /// Received over the relay's WebSocket connection.
    Network,

    /// Received from another same-machine context via the local bridge.
    SameOrigin,

    /// Injected in-process (tests, manual triggers).
    InternalTest,
}

/// A single rating change, the unit of propagation.
///
/// The relay treats every field as opaque; `occurred_at` is a producer-side
/// wall-clock hint used for dedup only, never trusted for authority.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RatingChangeEvent {
    /// Identifier of the rated item.
    pub entity_id: String,

    /// New rating magnitude. Domain-defined range, opaque here.
    pub value: f64,

    pub action: ChangeAction,

    /// Identifier of the agent that produced the change.
    #[serde(default = "anonymous_actor")]
    pub actor_id: String,

    /// Producer-side timestamp in wall-clock milliseconds.
    #[serde(default = "now_millis")]
    pub occurred_at: i64,
}

impl RatingChangeEvent {
    pub fn new(entity_id: impl Into<String>, value: f64, action: ChangeAction) -> Self {
        Self {
            entity_id: entity_id.into(),
            value,
            action,
            actor_id: ANONYMOUS_ACTOR.to_string(),
            occurred_at: now_millis(),
        }
    }

    pub fn with_actor(mut self, actor_id: impl Into<String>) -> Self {
        self.actor_id = actor_id.into();
        self
    }
}

/// Recomputed aggregate statistics for an entity.
///
/// Never derived by the relay — carried verbatim through the same channels
/// and subject to the same dedup/dispatch rules as rating changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsChangeEvent {
    pub entity_id: String,
    pub average_value: f64,
    pub sample_count: u64,
}

/// Either kind of propagated event.
#[derive(Debug, Clone, PartialEq)]
pub enum RealtimeEvent {
    Rating(RatingChangeEvent),
    Stats(StatsChangeEvent),
}

impl RealtimeEvent {
    pub fn entity_id(&self) -> &str {
        match self {
            RealtimeEvent::Rating(e) => &e.entity_id,
            RealtimeEvent::Stats(e) => &e.entity_id,
        }
    }

    /// Key identifying one logical occurrence of this event.
    ///
    /// Two arrivals with the same key are the same change delivered over
    /// different channels and must be dispatched at most once.
    pub fn dedup_key(&self) -> String {
        match self {
            RealtimeEvent::Rating(e) => {
                format!("{}:{}:{}", e.entity_id, e.actor_id, e.occurred_at)
            }
            RealtimeEvent::Stats(e) => {
                format!(
                    "{}:stats:{}:{}",
                    e.entity_id,
                    e.average_value.to_bits(),
                    e.sample_count
                )
            }
        }
    }
}

impl From<RatingChangeEvent> for RealtimeEvent {
    fn from(e: RatingChangeEvent) -> Self {
        RealtimeEvent::Rating(e)
    }
}

impl From<StatsChangeEvent> for RealtimeEvent {
    fn from(e: StatsChangeEvent) -> Self {
        RealtimeEvent::Stats(e)
    }
}

/// Lifecycle phase of the client's relay connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionPhase {
    /// No connection and none requested.
    Disconnected,

    /// A connect attempt is in flight.
    Connecting,

    /// Transport is open and events flow.
    Connected,

    /// Waiting out a backoff delay before the next attempt.
    Reconnecting,

    /// Gave up after `max_attempts` — pinned until an explicit reconnect.
    Failed,
}

/// Observable connection state, one instance per client process.
///
/// Transitions are driven solely by the `ConnectionManager`; collaborators
/// only ever read this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionState {
    pub phase: ConnectionPhase,
    pub attempt_count: u32,
    pub max_attempts: u32,
}

impl ConnectionState {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            phase: ConnectionPhase::Disconnected,
            attempt_count: 0,
            max_attempts,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.phase == ConnectionPhase::Connected
    }

    pub fn is_reconnecting(&self) -> bool {
        self.phase == ConnectionPhase::Reconnecting
    }

    pub fn has_failed(&self) -> bool {
        self.phase == ConnectionPhase::Failed
    }
}

fn anonymous_actor() -> String {
    ANONYMOUS_ACTOR.to_string()
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
