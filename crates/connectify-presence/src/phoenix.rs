//! [`PresenceTransport`] over a Phoenix socket.
//!
//! Every join opens its own socket authenticated with the session token, so
//! leaving a channel also closes the connection that carried it.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use connectify_common::new_id;

use crate::error::PresenceError;
use crate::realtime::{RealtimeClient, RealtimeConfig, RealtimeEvent};
use crate::snapshot::PresenceSnapshot;
use crate::transport::{ChannelHandle, JoinedChannel, PresenceTransport};

struct Joined {
    client: Arc<RealtimeClient>,
    forwarder: JoinHandle<()>,
}

/// Phoenix Channels implementation of [`PresenceTransport`].
pub struct PhoenixTransport {
    config: RealtimeConfig,
    joined: Mutex<HashMap<String, Joined>>,
}

impl PhoenixTransport {
    /// `config.token` is ignored; each join supplies its own.
    pub fn new(config: RealtimeConfig) -> Self {
        Self {
            config,
            joined: Mutex::new(HashMap::new()),
        }
    }

    async fn client(&self, channel: &ChannelHandle) -> Option<Arc<RealtimeClient>> {
        self.joined
            .lock()
            .await
            .get(&channel.id)
            .map(|j| Arc::clone(&j.client))
    }
}

impl From<&connectify_config::RealtimeConfig> for PhoenixTransport {
    fn from(config: &connectify_config::RealtimeConfig) -> Self {
        Self::new(RealtimeConfig::from(config))
    }
}

#[async_trait]
impl PresenceTransport for PhoenixTransport {
    async fn join(&self, topic: &str, token: &str) -> Result<JoinedChannel, PresenceError> {
        let config = RealtimeConfig {
            token: Some(token.to_string()),
            ..self.config.clone()
        };
        let (client, events) = RealtimeClient::connect(config);

        if let Err(e) = client.join_channel(topic, serde_json::json!({})).await {
            client.disconnect().await;
            return Err(e);
        }

        let (sync_tx, syncs) = mpsc::channel(32);
        let forwarder = tokio::spawn(forward_presence(events, topic.to_string(), sync_tx));

        let handle = ChannelHandle {
            id: new_id(),
            topic: topic.to_string(),
        };
        info!(topic = %topic, channel_id = %handle.id, "Phoenix channel joined");

        self.joined.lock().await.insert(
            handle.id.clone(),
            Joined {
                client: Arc::new(client),
                forwarder,
            },
        );

        Ok(JoinedChannel { handle, syncs })
    }

    async fn push(
        &self,
        channel: &ChannelHandle,
        event: &str,
        payload: serde_json::Value,
    ) -> Result<(), PresenceError> {
        let client = self
            .client(channel)
            .await
            .ok_or_else(|| PresenceError::NotJoined(channel.topic.clone()))?;
        client.push(&channel.topic, event, payload).await.map(|_| ())
    }

    async fn leave(&self, channel: &ChannelHandle) {
        let Some(joined) = self.joined.lock().await.remove(&channel.id) else {
            return;
        };
        joined.client.leave_channel(&channel.topic).await;
        joined.client.disconnect().await;
        joined.forwarder.abort();
        info!(topic = %channel.topic, channel_id = %channel.id, "Phoenix channel left");
    }
}

/// Turn the realtime event stream for one topic into presence snapshots.
async fn forward_presence(
    mut events: mpsc::Receiver<RealtimeEvent>,
    topic: String,
    sync_tx: mpsc::Sender<PresenceSnapshot>,
) {
    while let Some(event) = events.recv().await {
        match event {
            RealtimeEvent::PresenceSync { topic: t, state } if t == topic => {
                if sync_tx.send(PresenceSnapshot::from_raw(&state)).await.is_err() {
                    break;
                }
            }
            RealtimeEvent::Connected => debug!(topic = %topic, "Presence socket connected"),
            RealtimeEvent::Disconnected => {
                warn!(topic = %topic, "Presence socket disconnected, will reconnect")
            }
            RealtimeEvent::ChannelJoined { topic: t } => debug!(topic = %t, "Channel (re)joined"),
            RealtimeEvent::ChannelError { topic: t, message } => {
                warn!(topic = %t, message = %message, "Presence channel error")
            }
            RealtimeEvent::Error(message) => warn!(message = %message, "Presence socket error"),
            RealtimeEvent::Message { event, .. } => {
                debug!(topic = %topic, event = %event, "Ignoring channel message")
            }
            RealtimeEvent::PresenceSync { .. } => {}
        }
    }
    debug!(topic = %topic, "Presence forwarder stopped");
}
