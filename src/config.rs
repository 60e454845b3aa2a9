//! Client configuration
//!
//! One config struct constructed at startup and passed into each component.
//! No ambient lookup; every constant the protocol depends on lives here.

use std::time::Duration;

/// Configuration shared by the identity, channel, and cache components.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL for REST endpoints (identity exchange, resource fetches).
    pub api_url: String,
    /// WebSocket endpoint for the real-time channel.
    pub channel_url: String,
    /// Timeout for individual REST requests. No retry is baked in at this
    /// layer; retries are the caller's choice.
    pub request_timeout: Duration,
    /// Hard budget for the channel auth handshake.
    pub handshake_timeout: Duration,
    /// Base delay for reconnect backoff; doubles after every failed attempt.
    pub reconnect_base_delay: Duration,
    /// Upper bound on the random extension added to each backoff delay.
    /// Zero disables jitter.
    pub reconnect_jitter: Duration,
    /// Consecutive reconnect failures before terminal give-up.
    pub max_reconnect_attempts: u32,
    /// Requested page size for resource fetches.
    pub page_size: usize,
    /// Sessions older than this are refreshed before the channel connects.
    pub session_max_age: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.pavilion.cricket".to_string(),
            channel_url: "wss://rt.pavilion.cricket/channel".to_string(),
            request_timeout: Duration::from_secs(30),
            handshake_timeout: Duration::from_secs(10),
            reconnect_base_delay: Duration::from_millis(1000),
            reconnect_jitter: Duration::from_millis(250),
            max_reconnect_attempts: 5,
            page_size: 20,
            session_max_age: Duration::from_secs(45 * 60),
        }
    }
}
