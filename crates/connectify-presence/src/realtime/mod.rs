//! Thin Phoenix Channels v1 client.
//!
//! A generic WebSocket client for a Phoenix socket built on
//! `tokio-tungstenite`. Handles heartbeats, channel join/leave with reply
//! tracking, pushes, presence state merging, and auto-reconnect with
//! backoff and rejoin.

mod client;
mod connection;
mod handler;
mod presence_sync;
mod types;

pub use client::RealtimeClient;
pub use presence_sync::PresenceMap;
pub use types::{PhoenixMessage, RealtimeConfig, RealtimeEvent, Reply};
