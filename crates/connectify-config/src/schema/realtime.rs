use serde::{Deserialize, Serialize};

/// Connection settings for the real-time socket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RealtimeConfig {
    /// Socket endpoint, without the `/websocket` suffix.
    pub endpoint: String,
    /// Heartbeat interval in seconds (valid range: 5-300).
    pub heartbeat_interval: u32,
    /// Base reconnect delay in seconds.
    pub reconnect_delay: u32,
    /// Reconnect delay cap in seconds.
    pub max_reconnect_delay: u32,
    /// Seconds to wait for a channel join reply.
    pub join_timeout: u32,
    /// Seconds to wait for a push reply.
    pub push_timeout: u32,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            endpoint: "ws://localhost:4000/socket".into(),
            heartbeat_interval: 30,
            reconnect_delay: 1,
            max_reconnect_delay: 30,
            join_timeout: 10,
            push_timeout: 10,
        }
    }
}
