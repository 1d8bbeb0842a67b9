use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

// Compiled-in defaults — overridable via cinesync.toml or CINESYNC_* env vars.
pub const DEFAULT_PORT: u16 = 3001;
pub const DEFAULT_BIND: &str = "127.0.0.1";
pub const MAX_PAYLOAD_BYTES: usize = 64 * 1024; // 64 KB hard cap per frame
pub const BASE_DELAY_MS: u64 = 1_000; // first reconnect delay doubles from here
pub const CAP_DELAY_MS: u64 = 30_000; // backoff ceiling
pub const MAX_ATTEMPTS: u32 = 5;
pub const CONNECT_TIMEOUT_MS: u64 = 20_000; // a connect attempt counts as failed after this
pub const COALESCE_WINDOW_MS: u64 = 300; // dedup guard lifetime per entity
pub const BRIDGE_HISTORY_LIMIT: usize = 50; // fallback store keeps this many records
pub const BRIDGE_CHANNEL_NAME: &str = "cinesync-rating-sync";

/// Top-level config (cinesync.toml + CINESYNC_* env overrides).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RealtimeConfig {
    #[serde(default)]
    pub relay: RelayConfig,
    #[serde(default)]
    pub reconnect: ReconnectConfig,
    #[serde(default)]
    pub bridge: BridgeConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Static allow-list applied to the HTTP/WS surface. Empty means
    /// same-host tooling only (no cross-origin callers).
    #[serde(default)]
    pub allowed_origins: Vec<String>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            bind: DEFAULT_BIND.to_string(),
            allowed_origins: Vec::new(),
        }
    }
}

/// Reconnection schedule for the client connection manager.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconnectConfig {
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_cap_delay_ms")]
    pub cap_delay_ms: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: BASE_DELAY_MS,
            cap_delay_ms: CAP_DELAY_MS,
            max_attempts: MAX_ATTEMPTS,
            connect_timeout_ms: CONNECT_TIMEOUT_MS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    #[serde(default = "default_channel_name")]
    pub channel_name: String,
    /// Fallback store keeps at most this many unread records (oldest dropped).
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            channel_name: BRIDGE_CHANNEL_NAME.to_string(),
            history_limit: BRIDGE_HISTORY_LIMIT,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Length of the per-entity dedup/coalescing window.
    #[serde(default = "default_coalesce_window_ms")]
    pub coalesce_window_ms: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            coalesce_window_ms: COALESCE_WINDOW_MS,
        }
    }
}

fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}
fn default_base_delay_ms() -> u64 {
    BASE_DELAY_MS
}
fn default_cap_delay_ms() -> u64 {
    CAP_DELAY_MS
}
fn default_max_attempts() -> u32 {
    MAX_ATTEMPTS
}
fn default_connect_timeout_ms() -> u64 {
    CONNECT_TIMEOUT_MS
}
fn default_coalesce_window_ms() -> u64 {
    COALESCE_WINDOW_MS
}
fn default_history_limit() -> usize {
    BRIDGE_HISTORY_LIMIT
}
fn default_channel_name() -> String {
    BRIDGE_CHANNEL_NAME.to_string()
}

impl RealtimeConfig {
    /// Load config from a TOML file with CINESYNC_* env var overrides.
    ///
    /// Checks in order:
    ///   1. Explicit path argument
    ///   2. ./cinesync.toml
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path.unwrap_or("cinesync.toml");

        let config: RealtimeConfig = Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("CINESYNC_").split("_"))
            .extract()
            .map_err(|e| crate::error::RealtimeError::Config(e.to_string()))?;

        Ok(config)
    }
}
