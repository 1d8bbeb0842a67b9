use cinesync_core::types::{RatingChangeEvent, RealtimeEvent, StatsChangeEvent};
use serde::{Deserialize, Serialize};

/// `source` value on frames relayed from another client's socket.
pub const SOURCE_NETWORK: &str = "network";
/// `source` value on frames injected through the out-of-band HTTP path.
pub const SOURCE_SERVER: &str = "server";
/// `source` value on frames carried over the same-machine bridge.
pub const SOURCE_SAME_ORIGIN: &str = "same-origin";

/// One message on the wire, discriminated by `type`.
///
/// Client → Server:
/// `{ "type": "rating-updated", "entityId": "m1", "value": 4, "action": "create",
///    "actorId": "u1", "occurredAt": 1700000000000 }`
///
/// Server → Client carries the same shape plus a `source` annotation added by
/// whichever hop relayed it; clients never set `source` themselves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WireFrame {
    #[serde(rename = "rating-updated")]
    RatingUpdated {
        #[serde(flatten)]
        event: RatingChangeEvent,
        #[serde(skip_serializing_if = "Option::is_none")]
        source: Option<String>,
    },

    #[serde(rename = "rating-stats-updated")]
    StatsUpdated {
        #[serde(flatten)]
        event: StatsChangeEvent,
        #[serde(skip_serializing_if = "Option::is_none")]
        source: Option<String>,
    },
}

impl WireFrame {
    /// Parse an inbound text frame. Returns `None` for anything malformed —
    /// this is a best-effort channel, bad frames are dropped, not answered.
    pub fn parse(text: &str) -> Option<Self> {
        serde_json::from_str(text).ok()
    }

    /// A frame is propagated only when its entity id is non-empty.
    pub fn is_valid(&self) -> bool {
        !self.entity_id().is_empty()
    }

    pub fn entity_id(&self) -> &str {
        match self {
            WireFrame::RatingUpdated { event, .. } => &event.entity_id,
            WireFrame::StatsUpdated { event, .. } => &event.entity_id,
        }
    }

    /// Stamp the transport origin before rebroadcasting.
    pub fn with_source(mut self, origin: &str) -> Self {
        match &mut self {
            WireFrame::RatingUpdated { source, .. } | WireFrame::StatsUpdated { source, .. } => {
                *source = Some(origin.to_string());
            }
        }
        self
    }

    pub fn source(&self) -> Option<&str> {
        match self {
            WireFrame::RatingUpdated { source, .. } | WireFrame::StatsUpdated { source, .. } => {
                source.as_deref()
            }
        }
    }

    pub fn into_event(self) -> RealtimeEvent {
        match self {
            WireFrame::RatingUpdated { event, .. } => RealtimeEvent::Rating(event),
            WireFrame::StatsUpdated { event, .. } => RealtimeEvent::Stats(event),
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

impl From<RealtimeEvent> for WireFrame {
    fn from(event: RealtimeEvent) -> Self {
        match event {
            RealtimeEvent::Rating(event) => WireFrame::RatingUpdated {
                event,
                source: None,
            },
            RealtimeEvent::Stats(event) => WireFrame::StatsUpdated {
                event,
                source: None,
            },
        }
    }
}
