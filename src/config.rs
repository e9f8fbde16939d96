//! Configuration and tuning constants for the sync layer.

use std::time::Duration;

/// Messages fetched per page when the caller does not say otherwise.
pub const DEFAULT_PAGE_SIZE: u32 = 50;
/// Hard cap applied to caller-supplied page sizes.
pub const MAX_PAGE_SIZE: u32 = 200;

/// Window in which repeated reload triggers collapse into one load.
pub const RELOAD_DEBOUNCE_MS: u64 = 1_000;

/// Capacity of the live-event broadcast channel.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// WebSocket reconnect backoff: initial delay, cap, and how many consecutive
/// failed connection attempts are tolerated before the socket gives up.
pub const WS_INITIAL_BACKOFF_SECS: u64 = 2;
pub const WS_MAX_BACKOFF_SECS: u64 = 60;
pub const WS_MAX_CONNECT_ATTEMPTS: u32 = 10;

pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 15;

/// Endpoint configuration for the chat backend.
///
/// Values come from the environment (`VELVET_API_URL`, `VELVET_WS_URL`,
/// `VELVET_HTTP_TIMEOUT_SECS`) with sensible defaults for local development.
/// When no WebSocket URL is configured it is derived from the API URL.
#[derive(Debug, Clone)]
pub struct Config {
    pub api_url: String,
    pub ws_url: Option<String>,
    /// Deadline applied to every HTTP request, so a hung backend cannot pin
    /// a loading flag forever.
    pub http_timeout: Duration,
}

impl Config {
    pub fn new(api_url: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into(),
            ws_url: None,
            http_timeout: Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
        }
    }

    pub fn from_env() -> Self {
        let api_url = std::env::var("VELVET_API_URL")
            .unwrap_or_else(|_| "http://127.0.0.1:4000/api".to_string());

        let ws_url = std::env::var("VELVET_WS_URL").ok();

        let http_timeout = std::env::var("VELVET_HTTP_TIMEOUT_SECS")
            .ok()
            .and_then(|raw| raw.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS));

        Self {
            api_url,
            ws_url,
            http_timeout,
        }
    }

    /// The WebSocket endpoint: configured explicitly, or derived from the
    /// API URL.
    pub fn websocket_url(&self) -> String {
        self.ws_url
            .clone()
            .unwrap_or_else(|| crate::transport::http_to_ws_url(&self.api_url))
    }
}
