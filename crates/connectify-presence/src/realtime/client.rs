//! Public handle for interacting with the Phoenix socket connection.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::error::PresenceError;

use super::connection::{connection_loop, next_ref};
use super::types::{PhoenixMessage, RealtimeCommand, RealtimeConfig, RealtimeEvent, Reply};

/// How long `disconnect` waits for the connection task to say goodbye.
const DISCONNECT_GRACE: Duration = Duration::from_secs(2);

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Handle for interacting with the Phoenix socket connection.
///
/// Commands go to a background connection task; `join_channel` and `push`
/// wait for the server's reply, bounded by the configured timeouts.
pub struct RealtimeClient {
    command_tx: mpsc::Sender<RealtimeCommand>,
    connected: Arc<RwLock<bool>>,
    config: RealtimeConfig,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl RealtimeClient {
    /// Create a new client and start the background connection.
    /// Returns `(client, event_receiver)`.
    pub fn connect(config: RealtimeConfig) -> (Self, mpsc::Receiver<RealtimeEvent>) {
        let (event_tx, event_rx) = mpsc::channel(256);
        let (command_tx, command_rx) = mpsc::channel(64);
        let connected = Arc::new(RwLock::new(false));

        let task = tokio::spawn(connection_loop(
            config.clone(),
            Arc::clone(&connected),
            event_tx,
            command_rx,
        ));

        let client = Self {
            command_tx,
            connected,
            config,
            task: Mutex::new(Some(task)),
        };

        (client, event_rx)
    }

    /// Join a channel and wait for the server to accept it.
    pub async fn join_channel(
        &self,
        topic: &str,
        payload: serde_json::Value,
    ) -> Result<Reply, PresenceError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.command_tx
            .send(RealtimeCommand::Join {
                topic: topic.to_string(),
                payload,
                reply: reply_tx,
            })
            .await
            .map_err(|_| PresenceError::Disconnected)?;

        match tokio::time::timeout(self.config.join_timeout(), reply_rx).await {
            Err(_elapsed) => {
                self.leave_channel(topic).await;
                Err(PresenceError::JoinTimeout {
                    topic: topic.to_string(),
                })
            }
            Ok(Err(_)) => Err(PresenceError::Disconnected),
            Ok(Ok(Err(e))) => Err(e),
            Ok(Ok(Ok(reply))) if reply.is_ok() => Ok(reply),
            Ok(Ok(Ok(reply))) => Err(PresenceError::JoinRejected {
                topic: topic.to_string(),
                reason: reply.reason(),
            }),
        }
    }

    /// Leave a channel. It will not be rejoined on reconnect.
    pub async fn leave_channel(&self, topic: &str) {
        let _ = self
            .command_tx
            .send(RealtimeCommand::Leave {
                topic: topic.to_string(),
            })
            .await;
    }

    /// Push an event on a joined channel and wait for the reply.
    pub async fn push(
        &self,
        topic: &str,
        event: &str,
        payload: serde_json::Value,
    ) -> Result<Reply, PresenceError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let msg = PhoenixMessage::new(topic, event, payload, next_ref());
        self.command_tx
            .send(RealtimeCommand::Push {
                msg,
                reply: reply_tx,
            })
            .await
            .map_err(|_| PresenceError::Disconnected)?;

        match tokio::time::timeout(self.config.push_timeout(), reply_rx).await {
            Err(_elapsed) => Err(PresenceError::PushTimeout {
                event: event.to_string(),
            }),
            Ok(Err(_)) => Err(PresenceError::Disconnected),
            Ok(Ok(Err(e))) => Err(e),
            Ok(Ok(Ok(reply))) if reply.is_ok() => Ok(reply),
            Ok(Ok(Ok(reply))) => Err(PresenceError::PushRejected {
                event: event.to_string(),
                reason: reply.reason(),
            }),
        }
    }

    /// Check if connected.
    pub async fn is_connected(&self) -> bool {
        *self.connected.read().await
    }

    /// Leave every channel, close the socket and stop the connection task.
    pub async fn disconnect(&self) {
        let _ = self.command_tx.send(RealtimeCommand::Disconnect).await;
        let Some(mut task) = self.task.lock().await.take() else {
            return;
        };
        if tokio::time::timeout(DISCONNECT_GRACE, &mut task)
            .await
            .is_err()
        {
            debug!("Connection task did not stop in time, aborting");
            task.abort();
        }
    }
}

impl Drop for RealtimeClient {
    fn drop(&mut self) {
        if let Some(task) = self.task.get_mut().take() {
            task.abort();
        }
    }
}
