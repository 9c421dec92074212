//! Background WebSocket connection loop with auto-reconnect.
//!
//! One task owns the socket, the joined-channel table and the pending reply
//! table. Commands from the client handle are served both while connected
//! and while waiting to reconnect.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{Sink, SinkExt, StreamExt};
use tokio::sync::{mpsc, RwLock};
use tokio::time::{interval_at, sleep_until, Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::{Error as WsError, Message as WsMessage};
use tracing::{debug, error, info, warn};

use crate::error::PresenceError;

use super::handler::handle_phoenix_message;
use super::presence_sync::PresenceSync;
use super::types::{phx, PhoenixMessage, RealtimeCommand, RealtimeConfig, RealtimeEvent, ReplySender};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// Delays between channel rejoin attempts after `phx_error`; the last one repeats.
const REJOIN_STEPS_SECS: [u64; 4] = [1, 2, 5, 10];

// ---------------------------------------------------------------------------
// Ref Counter
// ---------------------------------------------------------------------------

/// Monotonically increasing ref counter for Phoenix messages.
static REF_COUNTER: AtomicU64 = AtomicU64::new(1);

pub(crate) fn next_ref() -> String {
    REF_COUNTER.fetch_add(1, Ordering::Relaxed).to_string()
}

// ---------------------------------------------------------------------------
// Connection State
// ---------------------------------------------------------------------------

/// What a pending ref is waiting for.
pub(crate) enum Pending {
    Join { topic: String },
    Push(ReplySender),
    /// Sent at this instant; dropped if the reply has not come by the next
    /// heartbeat after that.
    Leave { sent: Instant },
}

/// A channel that should be joined, and rejoined after every reconnect.
pub(crate) struct ChannelState {
    pub(crate) payload: serde_json::Value,
    /// Ref of the most recent `phx_join` sent on the current socket.
    pub(crate) join_ref: Option<String>,
    pub(crate) joined: bool,
    /// Caller waiting on the first join reply.
    pub(crate) join_reply: Option<ReplySender>,
    pub(crate) presence: PresenceSync,
    /// When to resend `phx_join` after the server errored the channel.
    pub(crate) rejoin_at: Option<Instant>,
    rejoin_attempts: usize,
}

impl ChannelState {
    pub(crate) fn new(payload: serde_json::Value, join_reply: ReplySender) -> Self {
        Self {
            payload,
            join_ref: None,
            joined: false,
            join_reply: Some(join_reply),
            presence: PresenceSync::default(),
            rejoin_at: None,
            rejoin_attempts: 0,
        }
    }

    /// Arm the next rejoin attempt and return its delay.
    pub(crate) fn schedule_rejoin(&mut self, now: Instant) -> Duration {
        let step = self.rejoin_attempts.min(REJOIN_STEPS_SECS.len() - 1);
        let delay = Duration::from_secs(REJOIN_STEPS_SECS[step]);
        self.rejoin_attempts += 1;
        self.rejoin_at = Some(now + delay);
        delay
    }

    pub(crate) fn on_joined(&mut self) {
        self.joined = true;
        self.rejoin_at = None;
        self.rejoin_attempts = 0;
    }
}

#[derive(Default)]
pub(crate) struct ConnectionState {
    pub(crate) channels: HashMap<String, ChannelState>,
    pub(crate) pending: HashMap<String, Pending>,
    pub(crate) heartbeat_ref: Option<String>,
}

impl ConnectionState {
    /// Serve a command while no socket is open.
    fn handle_offline(&mut self, cmd: RealtimeCommand) {
        match cmd {
            RealtimeCommand::Join {
                topic,
                payload,
                reply,
            } => {
                self.channels.insert(topic, ChannelState::new(payload, reply));
            }
            RealtimeCommand::Leave { topic } => {
                self.channels.remove(&topic);
            }
            RealtimeCommand::Push { reply, .. } => {
                let _ = reply.send(Err(PresenceError::Disconnected));
            }
            RealtimeCommand::Disconnect => {}
        }
    }

    /// Socket lost: fail in-flight pushes and mark every channel for rejoin.
    fn on_disconnect(&mut self) {
        for (_, pending) in self.pending.drain() {
            if let Pending::Push(reply) = pending {
                let _ = reply.send(Err(PresenceError::Disconnected));
            }
        }
        for channel in self.channels.values_mut() {
            channel.joined = false;
            channel.join_ref = None;
            channel.rejoin_at = None;
        }
        self.heartbeat_ref = None;
    }

    /// Client gone: fail everything still waiting.
    fn on_shutdown(&mut self) {
        self.on_disconnect();
        for (_, mut channel) in self.channels.drain() {
            if let Some(reply) = channel.join_reply.take() {
                let _ = reply.send(Err(PresenceError::Disconnected));
            }
        }
    }

    /// Drop reply slots whose caller already gave up, and leaves the
    /// server never answered within `grace`.
    fn prune_pending(&mut self, now: Instant, grace: Duration) {
        self.pending.retain(|_, pending| match pending {
            Pending::Push(reply) => !reply.is_closed(),
            Pending::Leave { sent } => now.saturating_duration_since(*sent) < grace,
            Pending::Join { .. } => true,
        });
    }

    /// Earliest armed channel rejoin.
    fn next_rejoin(&self) -> Option<Instant> {
        self.channels.values().filter_map(|c| c.rejoin_at).min()
    }

    /// Topics whose rejoin is due at `now`.
    fn due_rejoins(&self, now: Instant) -> Vec<String> {
        self.channels
            .iter()
            .filter(|(_, c)| c.rejoin_at.is_some_and(|at| at <= now))
            .map(|(topic, _)| topic.clone())
            .collect()
    }
}

enum Exit {
    Reconnect,
    Shutdown,
}

// ---------------------------------------------------------------------------
// Connection Loop
// ---------------------------------------------------------------------------

/// Background task managing the WebSocket connection with auto-reconnect.
pub(crate) async fn connection_loop(
    config: RealtimeConfig,
    connected: Arc<RwLock<bool>>,
    event_tx: mpsc::Sender<RealtimeEvent>,
    mut command_rx: mpsc::Receiver<RealtimeCommand>,
) {
    let mut state = ConnectionState::default();
    let mut reconnect_delay = config.reconnect_delay_secs;

    loop {
        let url = config.ws_url();
        info!(url = %url.split('?').next().unwrap_or(""), "Connecting to Phoenix socket");

        let connect = tokio::time::timeout(CONNECT_TIMEOUT, tokio_tungstenite::connect_async(url));
        tokio::pin!(connect);

        let result = loop {
            tokio::select! {
                result = &mut connect => break Some(result),
                cmd = command_rx.recv() => match cmd {
                    None | Some(RealtimeCommand::Disconnect) => break None,
                    Some(cmd) => state.handle_offline(cmd),
                },
            }
        };
        let Some(result) = result else {
            state.on_shutdown();
            return;
        };

        match result {
            Ok(Ok((ws_stream, _))) => {
                reconnect_delay = config.reconnect_delay_secs;
                *connected.write().await = true;
                let _ = event_tx.send(RealtimeEvent::Connected).await;

                let exit = run_socket(ws_stream, &config, &mut state, &event_tx, &mut command_rx).await;

                *connected.write().await = false;
                state.on_disconnect();
                let _ = event_tx.send(RealtimeEvent::Disconnected).await;

                if let Exit::Shutdown = exit {
                    state.on_shutdown();
                    return;
                }
            }
            Ok(Err(e)) => {
                error!(error = %e, "Failed to connect to Phoenix socket");
                let _ = event_tx
                    .send(RealtimeEvent::Error(format!("Connection failed: {e}")))
                    .await;
            }
            Err(_elapsed) => {
                error!("WebSocket connection timed out after 15s");
                let _ = event_tx
                    .send(RealtimeEvent::Error(
                        "Connection timed out after 15s".to_string(),
                    ))
                    .await;
            }
        }

        // Exponential backoff reconnect.
        info!(
            delay = reconnect_delay,
            "Reconnecting in {} seconds", reconnect_delay
        );
        let backoff = tokio::time::sleep(Duration::from_secs(reconnect_delay));
        tokio::pin!(backoff);
        loop {
            tokio::select! {
                _ = &mut backoff => break,
                cmd = command_rx.recv() => match cmd {
                    None | Some(RealtimeCommand::Disconnect) => {
                        state.on_shutdown();
                        return;
                    }
                    Some(cmd) => state.handle_offline(cmd),
                },
            }
        }
        reconnect_delay = (reconnect_delay * 2).min(config.max_reconnect_delay_secs);
    }
}

/// Drive one open socket until it drops or the client disconnects.
async fn run_socket<S>(
    ws_stream: S,
    config: &RealtimeConfig,
    state: &mut ConnectionState,
    event_tx: &mpsc::Sender<RealtimeEvent>,
    command_rx: &mut mpsc::Receiver<RealtimeCommand>,
) -> Exit
where
    S: futures_util::Stream<Item = Result<WsMessage, WsError>>
        + Sink<WsMessage, Error = WsError>
        + Unpin,
{
    let (mut ws_write, mut ws_read) = ws_stream.split();

    // Rejoin previously-joined channels.
    let topics: Vec<String> = state.channels.keys().cloned().collect();
    for topic in topics {
        if let Err(e) = send_join(&mut ws_write, state, &topic).await {
            warn!(error = %e, topic = %topic, "Failed to send join");
            return Exit::Reconnect;
        }
    }

    let period = Duration::from_secs(config.heartbeat_interval_secs.max(1));
    let mut heartbeat = interval_at(Instant::now() + period, period);
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        let rejoin = state.next_rejoin();

        tokio::select! {
            frame = ws_read.next() => match frame {
                Some(Ok(WsMessage::Text(text))) => {
                    match serde_json::from_str::<PhoenixMessage>(&text) {
                        Ok(msg) => handle_phoenix_message(msg, state, event_tx).await,
                        Err(_) => debug!(text = %text, "Unrecognized message from Phoenix socket"),
                    }
                }
                Some(Ok(WsMessage::Close(_))) => {
                    info!("Phoenix socket closed connection");
                    return Exit::Reconnect;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!(error = %e, "WebSocket error");
                    return Exit::Reconnect;
                }
                None => {
                    info!("WebSocket stream ended");
                    return Exit::Reconnect;
                }
            },

            cmd = command_rx.recv() => match cmd {
                None | Some(RealtimeCommand::Disconnect) => {
                    close_socket(&mut ws_write, state).await;
                    return Exit::Shutdown;
                }
                Some(cmd) => {
                    if let Err(e) = handle_command(cmd, &mut ws_write, state).await {
                        warn!(error = %e, "WebSocket write failed");
                        return Exit::Reconnect;
                    }
                }
            },

            _ = heartbeat.tick() => {
                if state.heartbeat_ref.is_some() {
                    warn!("Heartbeat reply not received, reconnecting");
                    return Exit::Reconnect;
                }
                let msg_ref = next_ref();
                let msg = PhoenixMessage::new(
                    phx::HEARTBEAT_TOPIC,
                    phx::HEARTBEAT,
                    serde_json::json!({}),
                    msg_ref.clone(),
                );
                if let Err(e) = send_message(&mut ws_write, &msg).await {
                    warn!(error = %e, "Heartbeat send failed");
                    return Exit::Reconnect;
                }
                state.heartbeat_ref = Some(msg_ref);
                state.prune_pending(Instant::now(), period);
            },

            _ = sleep_until(rejoin.unwrap_or_else(Instant::now)), if rejoin.is_some() => {
                for topic in state.due_rejoins(Instant::now()) {
                    info!(topic = %topic, "Rejoining errored channel");
                    if let Err(e) = send_join(&mut ws_write, state, &topic).await {
                        warn!(error = %e, topic = %topic, "Failed to send rejoin");
                        return Exit::Reconnect;
                    }
                }
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

async fn handle_command<S>(
    cmd: RealtimeCommand,
    ws_write: &mut S,
    state: &mut ConnectionState,
) -> Result<(), WsError>
where
    S: Sink<WsMessage, Error = WsError> + Unpin,
{
    match cmd {
        RealtimeCommand::Join {
            topic,
            payload,
            reply,
        } => {
            state
                .channels
                .insert(topic.clone(), ChannelState::new(payload, reply));
            send_join(ws_write, state, &topic).await
        }
        RealtimeCommand::Leave { topic } => {
            let Some(channel) = state.channels.remove(&topic) else {
                return Ok(());
            };
            let Some(join_ref) = channel.join_ref else {
                return Ok(());
            };
            let msg_ref = next_ref();
            let mut msg =
                PhoenixMessage::new(&topic, phx::LEAVE, serde_json::json!({}), msg_ref.clone());
            msg.join_ref = Some(join_ref);
            state.pending.insert(
                msg_ref,
                Pending::Leave {
                    sent: Instant::now(),
                },
            );
            send_message(ws_write, &msg).await
        }
        RealtimeCommand::Push { mut msg, reply } => {
            let join_ref = match state.channels.get(&msg.topic) {
                Some(channel) if channel.joined => channel.join_ref.clone(),
                _ => {
                    let _ = reply.send(Err(PresenceError::NotJoined(msg.topic)));
                    return Ok(());
                }
            };
            msg.join_ref = join_ref;
            if let Some(msg_ref) = msg.msg_ref.clone() {
                state.pending.insert(msg_ref, Pending::Push(reply));
            }
            send_message(ws_write, &msg).await
        }
        RealtimeCommand::Disconnect => Ok(()),
    }
}

/// Send (or resend) `phx_join` for `topic` with a fresh ref.
async fn send_join<S>(
    ws_write: &mut S,
    state: &mut ConnectionState,
    topic: &str,
) -> Result<(), WsError>
where
    S: Sink<WsMessage, Error = WsError> + Unpin,
{
    let Some(channel) = state.channels.get_mut(topic) else {
        return Ok(());
    };
    let msg_ref = next_ref();
    channel.join_ref = Some(msg_ref.clone());
    channel.joined = false;
    channel.rejoin_at = None;
    channel.presence.reset();

    let mut msg = PhoenixMessage::new(topic, phx::JOIN, channel.payload.clone(), msg_ref.clone());
    msg.join_ref = Some(msg_ref.clone());
    state.pending.insert(
        msg_ref,
        Pending::Join {
            topic: topic.to_string(),
        },
    );
    debug!(topic = %topic, "Joining channel");
    send_message(ws_write, &msg).await
}

/// Leave every joined channel, then close the socket.
async fn close_socket<S>(ws_write: &mut S, state: &mut ConnectionState)
where
    S: Sink<WsMessage, Error = WsError> + Unpin,
{
    for (topic, channel) in &state.channels {
        let Some(join_ref) = &channel.join_ref else {
            continue;
        };
        let mut msg = PhoenixMessage::new(topic, phx::LEAVE, serde_json::json!({}), next_ref());
        msg.join_ref = Some(join_ref.clone());
        if send_message(ws_write, &msg).await.is_err() {
            return;
        }
    }
    let _ = ws_write.send(WsMessage::Close(None)).await;
}

async fn send_message<S>(ws_write: &mut S, msg: &PhoenixMessage) -> Result<(), WsError>
where
    S: Sink<WsMessage, Error = WsError> + Unpin,
{
    match serde_json::to_string(msg) {
        Ok(json) => ws_write.send(WsMessage::Text(json.into())).await,
        Err(e) => {
            error!(error = %e, event = %msg.event, "Failed to encode Phoenix message");
            Ok(())
        }
    }
}
