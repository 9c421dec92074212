//! Configuration, protocol types, and event/command enums for the realtime client.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use crate::error::PresenceError;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Configuration for connecting to a Phoenix socket.
#[derive(Clone)]
pub struct RealtimeConfig {
    /// Socket endpoint without the `/websocket` suffix,
    /// e.g. `wss://connectify.example/socket`.
    pub endpoint: String,
    /// Bearer token sent as the `token` connect param.
    pub token: Option<String>,
    /// Heartbeat interval in seconds.
    pub heartbeat_interval_secs: u64,
    /// Reconnect base delay in seconds.
    pub reconnect_delay_secs: u64,
    /// Maximum reconnect delay in seconds.
    pub max_reconnect_delay_secs: u64,
    /// How long to wait for a `phx_join` reply.
    pub join_timeout_secs: u64,
    /// How long to wait for a push reply.
    pub push_timeout_secs: u64,
}

impl std::fmt::Debug for RealtimeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealtimeConfig")
            .field("endpoint", &self.endpoint)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("heartbeat_interval_secs", &self.heartbeat_interval_secs)
            .field("reconnect_delay_secs", &self.reconnect_delay_secs)
            .field("max_reconnect_delay_secs", &self.max_reconnect_delay_secs)
            .field("join_timeout_secs", &self.join_timeout_secs)
            .field("push_timeout_secs", &self.push_timeout_secs)
            .finish()
    }
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self::from(&connectify_config::RealtimeConfig::default())
    }
}

impl From<&connectify_config::RealtimeConfig> for RealtimeConfig {
    fn from(config: &connectify_config::RealtimeConfig) -> Self {
        Self {
            endpoint: config.endpoint.clone(),
            token: None,
            heartbeat_interval_secs: u64::from(config.heartbeat_interval),
            reconnect_delay_secs: u64::from(config.reconnect_delay),
            max_reconnect_delay_secs: u64::from(config.max_reconnect_delay),
            join_timeout_secs: u64::from(config.join_timeout),
            push_timeout_secs: u64::from(config.push_timeout),
        }
    }
}

impl RealtimeConfig {
    /// Build the WebSocket URL: `http(s)` maps to `ws(s)`, `/websocket` is
    /// appended and the token and protocol version go in the query string.
    pub(crate) fn ws_url(&self) -> String {
        let endpoint = self.endpoint.trim_end_matches('/');
        let endpoint = if let Some(rest) = endpoint.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = endpoint.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            endpoint.to_string()
        };

        let mut url = format!("{endpoint}/websocket?");
        if let Some(token) = &self.token {
            url.push_str("token=");
            url.push_str(&urlencoding::encode(token));
            url.push('&');
        }
        url.push_str("vsn=1.0.0");
        url
    }

    pub(crate) fn join_timeout(&self) -> Duration {
        Duration::from_secs(self.join_timeout_secs)
    }

    pub(crate) fn push_timeout(&self) -> Duration {
        Duration::from_secs(self.push_timeout_secs)
    }
}

// ---------------------------------------------------------------------------
// Phoenix Protocol Types
// ---------------------------------------------------------------------------

/// Reserved Phoenix event names.
pub(crate) mod phx {
    pub const JOIN: &str = "phx_join";
    pub const LEAVE: &str = "phx_leave";
    pub const REPLY: &str = "phx_reply";
    pub const ERROR: &str = "phx_error";
    pub const CLOSE: &str = "phx_close";
    pub const HEARTBEAT: &str = "heartbeat";
    pub const HEARTBEAT_TOPIC: &str = "phoenix";
    pub const PRESENCE_STATE: &str = "presence_state";
    pub const PRESENCE_DIFF: &str = "presence_diff";
}

/// A Phoenix protocol message envelope (v1 JSON format).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhoenixMessage {
    pub topic: String,
    pub event: String,
    pub payload: serde_json::Value,
    #[serde(rename = "ref", default)]
    pub msg_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub join_ref: Option<String>,
}

impl PhoenixMessage {
    pub fn new(topic: &str, event: &str, payload: serde_json::Value, msg_ref: String) -> Self {
        Self {
            topic: topic.to_string(),
            event: event.to_string(),
            payload,
            msg_ref: Some(msg_ref),
            join_ref: None,
        }
    }
}

/// A `phx_reply` payload: `{"status": "ok"|"error", "response": {...}}`.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub status: String,
    pub response: serde_json::Value,
}

impl Reply {
    pub(crate) fn from_payload(payload: &serde_json::Value) -> Self {
        Self {
            status: payload
                .get("status")
                .and_then(|s| s.as_str())
                .unwrap_or("error")
                .to_string(),
            response: payload
                .get("response")
                .cloned()
                .unwrap_or(serde_json::Value::Null),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == "ok"
    }

    /// `response.reason` if the server gave one, else the status.
    pub fn reason(&self) -> String {
        self.response
            .get("reason")
            .and_then(|r| r.as_str())
            .unwrap_or(&self.status)
            .to_string()
    }
}

// ---------------------------------------------------------------------------
// Events & Commands
// ---------------------------------------------------------------------------

/// Events emitted by the realtime client.
#[derive(Debug, Clone)]
pub enum RealtimeEvent {
    /// WebSocket connection established.
    Connected,
    /// WebSocket connection lost.
    Disconnected,
    /// Successfully (re)joined a channel.
    ChannelJoined { topic: String },
    /// Channel closed or errored.
    ChannelError { topic: String, message: String },
    /// Any other event received on a joined channel.
    Message {
        topic: String,
        event: String,
        payload: serde_json::Value,
    },
    /// Full presence state after applying a `presence_state` or
    /// `presence_diff`.
    PresenceSync {
        topic: String,
        state: HashMap<String, Vec<serde_json::Value>>,
    },
    /// Error.
    Error(String),
}

/// Where the connection task delivers a reply (or the reason there is none).
pub(crate) type ReplySender = oneshot::Sender<Result<Reply, PresenceError>>;

/// Commands sent to the connection task from the client handle.
#[derive(Debug)]
pub(crate) enum RealtimeCommand {
    Join {
        topic: String,
        payload: serde_json::Value,
        reply: ReplySender,
    },
    Leave {
        topic: String,
    },
    Push {
        msg: PhoenixMessage,
        reply: ReplySender,
    },
    Disconnect,
}
