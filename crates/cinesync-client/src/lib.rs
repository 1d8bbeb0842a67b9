pub mod bridge;
pub mod conn;
pub mod dispatch;

pub use bridge::{BridgeTransport, BroadcastHub, LocalBridge, SharedStore};
pub use conn::ConnectionManager;
pub use dispatch::{EventDispatcher, NormalizedEvent, Subscription};
