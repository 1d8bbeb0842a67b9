pub mod config;
pub mod error;
pub mod types;

pub use config::RealtimeConfig;
pub use error::{RealtimeError, Result};
pub use types::{
    ChangeAction, ConnectionPhase, ConnectionState, DeliveryChannel, RatingChangeEvent,
    RealtimeEvent, StatsChangeEvent,
};
