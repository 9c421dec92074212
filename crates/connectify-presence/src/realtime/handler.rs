//! Incoming Phoenix message handler and presence parsing.

use std::collections::HashMap;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::connection::{ConnectionState, Pending};
use super::types::{phx, PhoenixMessage, RealtimeEvent, Reply};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Parse a Phoenix presence map into `HashMap<key, Vec<meta>>`.
///
/// Phoenix sends presence as `{ "key": { "metas": [{ ... }] } }`.
pub(crate) fn parse_presence_map(
    value: &serde_json::Value,
) -> HashMap<String, Vec<serde_json::Value>> {
    let mut result = HashMap::new();
    if let Some(obj) = value.as_object() {
        for (key, val) in obj {
            if let Some(metas) = val.get("metas").and_then(|m| m.as_array()) {
                result.insert(key.clone(), metas.clone());
            }
        }
    }
    result
}

// ---------------------------------------------------------------------------
// Message Handler
// ---------------------------------------------------------------------------

/// Handle a single incoming Phoenix message.
pub(crate) async fn handle_phoenix_message(
    msg: PhoenixMessage,
    state: &mut ConnectionState,
    event_tx: &mpsc::Sender<RealtimeEvent>,
) {
    if msg.event == phx::REPLY {
        handle_reply(msg, state, event_tx).await;
        return;
    }

    let topic = msg.topic.as_str();
    let Some(channel) = state.channels.get_mut(topic) else {
        debug!(topic = %topic, event = %msg.event, "Message for unknown channel");
        return;
    };
    // Messages addressed to an earlier join of this topic are stale.
    if let (Some(msg_join), Some(current)) = (&msg.join_ref, &channel.join_ref) {
        if msg_join != current {
            debug!(topic = %topic, event = %msg.event, "Dropping stale channel message");
            return;
        }
    }

    match msg.event.as_str() {
        phx::ERROR => {
            channel.joined = false;
            let delay = channel.schedule_rejoin(Instant::now());
            warn!(topic = %topic, retry_in = ?delay, "Channel error, rejoining");
            let _ = event_tx
                .send(RealtimeEvent::ChannelError {
                    topic: topic.to_string(),
                    message: "Channel error".to_string(),
                })
                .await;
        }
        phx::CLOSE => {
            info!(topic = %topic, "Channel closed");
            state.channels.remove(topic);
            let _ = event_tx
                .send(RealtimeEvent::ChannelError {
                    topic: topic.to_string(),
                    message: "Channel closed".to_string(),
                })
                .await;
        }
        phx::PRESENCE_STATE => {
            let presence = parse_presence_map(&msg.payload);
            debug!(topic = %topic, users = presence.len(), "Presence state received");
            let merged = channel.presence.apply_state(presence).clone();
            let _ = event_tx
                .send(RealtimeEvent::PresenceSync {
                    topic: topic.to_string(),
                    state: merged,
                })
                .await;
        }
        phx::PRESENCE_DIFF => {
            let joins = msg
                .payload
                .get("joins")
                .map(parse_presence_map)
                .unwrap_or_default();
            let leaves = msg
                .payload
                .get("leaves")
                .map(parse_presence_map)
                .unwrap_or_default();
            debug!(
                topic = %topic,
                joins = joins.len(),
                leaves = leaves.len(),
                "Presence diff received"
            );
            if let Some(merged) = channel.presence.apply_diff(joins, leaves) {
                let merged = merged.clone();
                let _ = event_tx
                    .send(RealtimeEvent::PresenceSync {
                        topic: topic.to_string(),
                        state: merged,
                    })
                    .await;
            }
        }
        _ => {
            debug!(topic = %topic, event = %msg.event, "Channel message");
            let _ = event_tx
                .send(RealtimeEvent::Message {
                    topic: topic.to_string(),
                    event: msg.event.clone(),
                    payload: msg.payload.clone(),
                })
                .await;
        }
    }
}

async fn handle_reply(
    msg: PhoenixMessage,
    state: &mut ConnectionState,
    event_tx: &mpsc::Sender<RealtimeEvent>,
) {
    let Some(msg_ref) = msg.msg_ref.as_deref() else {
        return;
    };
    if state.heartbeat_ref.as_deref() == Some(msg_ref) {
        state.heartbeat_ref = None;
        return;
    }
    let Some(pending) = state.pending.remove(msg_ref) else {
        debug!(topic = %msg.topic, msg_ref = %msg_ref, "Reply for unknown ref");
        return;
    };

    let reply = Reply::from_payload(&msg.payload);
    match pending {
        Pending::Push(tx) => {
            let _ = tx.send(Ok(reply));
        }
        Pending::Leave { .. } => debug!(topic = %msg.topic, "Channel left"),
        Pending::Join { topic } => handle_join_reply(topic, reply, state, event_tx).await,
    }
}

async fn handle_join_reply(
    topic: String,
    reply: Reply,
    state: &mut ConnectionState,
    event_tx: &mpsc::Sender<RealtimeEvent>,
) {
    let Some(channel) = state.channels.get_mut(&topic) else {
        return;
    };

    if reply.is_ok() {
        debug!(topic = %topic, "Channel reply: ok");
        channel.on_joined();
        if let Some(tx) = channel.join_reply.take() {
            let _ = tx.send(Ok(reply));
        }
        let _ = event_tx.send(RealtimeEvent::ChannelJoined { topic }).await;
        return;
    }

    let message = reply.reason();
    warn!(topic = %topic, status = %reply.status, reason = %message, "Channel join rejected");
    match channel.join_reply.take() {
        Some(tx) => {
            let _ = tx.send(Ok(reply));
            state.channels.remove(&topic);
        }
        // A rejoin after the channel was established keeps retrying.
        None => {
            channel.schedule_rejoin(Instant::now());
        }
    }
    let _ = event_tx
        .send(RealtimeEvent::ChannelError { topic, message })
        .await;
}
