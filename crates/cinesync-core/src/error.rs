use thiserror::Error;

#[derive(Debug, Error)]
pub enum RealtimeError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Invalid event: {reason}")]
    InvalidEvent { reason: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Payload too large: {size} bytes (max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    #[error("Connect timeout after {ms}ms")]
    ConnectTimeout { ms: u64 },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl RealtimeError {
    /// Short error code string for structured logs and HTTP error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            RealtimeError::Config(_) => "CONFIG_ERROR",
            RealtimeError::Transport(_) => "TRANSPORT_ERROR",
            RealtimeError::Protocol(_) => "PROTOCOL_ERROR",
            RealtimeError::InvalidEvent { .. } => "INVALID_EVENT",
            RealtimeError::Serialization(_) => "SERIALIZATION_ERROR",
            RealtimeError::Io(_) => "IO_ERROR",
            RealtimeError::PayloadTooLarge { .. } => "PAYLOAD_TOO_LARGE",
            RealtimeError::ConnectTimeout { .. } => "CONNECT_TIMEOUT",
            RealtimeError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, RealtimeError>;
