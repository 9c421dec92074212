//! Presence tracker: own activity state in, presence snapshot out.
//!
//! `start` joins the presence channel, registers activity listeners on the
//! host and spawns the tracker task; `stop` undoes all of that in order
//! (idle timer, listeners, transport) and is safe to call repeatedly.

mod task;

#[cfg(test)]
mod tests;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use connectify_common::{Event, EventBus, SessionId, UserStatus};
use connectify_config::PresenceConfig;

use crate::activity::{ActivityHost, ListenerId, SignalKind};
use crate::error::PresenceError;
use crate::machine::{ActivityMachine, LocalActivityState};
use crate::session::Session;
use crate::snapshot::{PresenceSnapshot, PresenceView};
use crate::transport::{ChannelHandle, PresenceTransport};

use task::TrackerTask;

/// Tracker settings.
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Presence channel to join.
    pub channel: String,
    /// Inactivity after which this client is demoted to idle.
    pub idle_timeout: Duration,
    /// Input signals that count as activity. Visibility is always observed.
    pub activity_signals: Vec<SignalKind>,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self::from(&PresenceConfig::default())
    }
}

impl From<&PresenceConfig> for TrackerConfig {
    fn from(config: &PresenceConfig) -> Self {
        Self {
            channel: config.channel.clone(),
            idle_timeout: Duration::from_secs(u64::from(config.idle_timeout_secs)),
            activity_signals: config
                .activity_signals
                .iter()
                .copied()
                .map(SignalKind::from)
                .collect(),
        }
    }
}

impl TrackerConfig {
    /// Listener kinds to register: the configured activity signals without
    /// duplicates, followed by visibility.
    fn listener_kinds(&self) -> Vec<SignalKind> {
        let mut kinds: Vec<SignalKind> = Vec::new();
        for kind in &self.activity_signals {
            if *kind != SignalKind::Visibility && !kinds.contains(kind) {
                kinds.push(*kind);
            }
        }
        kinds.push(SignalKind::Visibility);
        kinds
    }
}

/// Resources held while joined.
struct Running {
    session_id: SessionId,
    token: String,
    channel: ChannelHandle,
    listeners: Vec<ListenerId>,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

/// Tracks this client's activity and the presence of everyone else.
pub struct PresenceTracker<T: PresenceTransport, H: ActivityHost> {
    config: TrackerConfig,
    transport: Arc<T>,
    host: H,
    snapshot_tx: Arc<watch::Sender<PresenceSnapshot>>,
    state_tx: Arc<watch::Sender<LocalActivityState>>,
    events: Option<Arc<EventBus>>,
    running: Option<Running>,
}

impl<T: PresenceTransport, H: ActivityHost> PresenceTracker<T, H> {
    pub fn new(config: TrackerConfig, transport: Arc<T>, host: H) -> Self {
        let (snapshot_tx, _) = watch::channel(PresenceSnapshot::new());
        let (state_tx, _) = watch::channel(LocalActivityState::Offline);
        Self {
            config,
            transport,
            host,
            snapshot_tx: Arc::new(snapshot_tx),
            state_tx: Arc::new(state_tx),
            events: None,
            running: None,
        }
    }

    /// Publish status changes and syncs on `bus`.
    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.events = Some(bus);
        self
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn is_joined(&self) -> bool {
        self.running.is_some()
    }

    pub fn session_id(&self) -> Option<&SessionId> {
        self.running.as_ref().map(|r| &r.session_id)
    }

    /// A read-only view of the presence snapshot.
    pub fn view(&self) -> PresenceView {
        PresenceView::new(self.snapshot_tx.subscribe())
    }

    /// Resolve a user id against the latest snapshot.
    pub fn get_user_status(&self, user_id: &str) -> UserStatus {
        self.snapshot_tx.borrow().status_of(user_id)
    }

    /// This client's own state; `Offline` while not joined.
    pub fn local_state(&self) -> LocalActivityState {
        *self.state_tx.borrow()
    }

    /// Watch this client's own state.
    pub fn watch_local_state(&self) -> watch::Receiver<LocalActivityState> {
        self.state_tx.subscribe()
    }

    /// Join the presence channel for `session`.
    ///
    /// A no-op if already joined with the same token; a different token
    /// tears the current session down first. On join failure the tracker
    /// stays unjoined and the error is returned after being logged.
    pub async fn start(&mut self, session: &Session) -> Result<(), PresenceError> {
        let token = session
            .usable_token()
            .ok_or(PresenceError::NotAuthenticated)?
            .to_string();

        if let Some(running) = &self.running {
            if running.token == token {
                return Ok(());
            }
            debug!("Session token changed, restarting presence");
            self.stop().await;
        }

        let topic = self.config.channel.clone();
        let joined = match self.transport.join(&topic, &token).await {
            Ok(joined) => joined,
            Err(e) => {
                warn!(topic = %topic, error = %e, "Unable to join presence channel");
                return Err(e);
            }
        };

        let session_id = SessionId::new();
        let (signal_tx, signal_rx) = mpsc::unbounded_channel();
        let listeners: Vec<ListenerId> = self
            .config
            .listener_kinds()
            .into_iter()
            .map(|kind| self.host.add_listener(kind, signal_tx.clone()))
            .collect();
        drop(signal_tx);

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let task = TrackerTask {
            session_id: session_id.clone(),
            transport: Arc::clone(&self.transport),
            channel: joined.handle.clone(),
            machine: ActivityMachine::new(self.config.idle_timeout),
            snapshot_tx: Arc::clone(&self.snapshot_tx),
            state_tx: Arc::clone(&self.state_tx),
            events: self.events.clone(),
        };
        let handle = tokio::spawn(task.run(joined.syncs, signal_rx, shutdown_rx));

        info!(
            session_id = %session_id,
            topic = %topic,
            listeners = listeners.len(),
            "Joined presence channel"
        );
        if let Some(bus) = &self.events {
            bus.publish(Event::PresenceJoined {
                session_id: session_id.to_string(),
            });
        }

        self.running = Some(Running {
            session_id,
            token,
            channel: joined.handle,
            listeners,
            shutdown: Some(shutdown_tx),
            task: Some(handle),
        });
        Ok(())
    }

    /// Tear down the presence session: cancel the idle timer, remove every
    /// listener, then leave the channel. Does nothing if not joined.
    pub async fn stop(&mut self) {
        let Some(mut running) = self.running.take() else {
            return;
        };

        if let Some(shutdown) = running.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(task) = running.task.take() {
            if let Err(e) = task.await {
                if e.is_panic() {
                    error!(session_id = %running.session_id, "Presence task panicked");
                } else {
                    debug!(session_id = %running.session_id, error = %e, "Presence task cancelled");
                }
            }
        }

        for id in running.listeners.drain(..) {
            self.host.remove_listener(id);
        }

        self.transport.leave(&running.channel).await;

        self.snapshot_tx.send_replace(PresenceSnapshot::new());
        self.state_tx.send_replace(LocalActivityState::Offline);

        info!(session_id = %running.session_id, "Left presence channel");
        if let Some(bus) = &self.events {
            bus.publish(Event::PresenceLeft);
        }
    }

    /// Follow the session: start when authenticated with a token, stop
    /// otherwise. Failures are logged, never returned.
    pub async fn apply_session(&mut self, session: &Session) {
        if session.usable_token().is_none() {
            self.stop().await;
            return;
        }
        if let Err(e) = self.start(session).await {
            debug!(error = %e, "Presence not started");
        }
    }

    /// Drive the tracker from a session watch until the sender goes away,
    /// then tear down.
    pub async fn run_session(&mut self, mut sessions: watch::Receiver<Session>) {
        loop {
            let session = sessions.borrow_and_update().clone();
            self.apply_session(&session).await;
            if sessions.changed().await.is_err() {
                break;
            }
        }
        self.stop().await;
    }
}

impl<T: PresenceTransport, H: ActivityHost> Drop for PresenceTracker<T, H> {
    fn drop(&mut self) {
        let Some(mut running) = self.running.take() else {
            return;
        };
        warn!(session_id = %running.session_id, "Presence tracker dropped while joined");

        if let Some(task) = running.task.take() {
            task.abort();
        }
        for id in running.listeners.drain(..) {
            self.host.remove_listener(id);
        }
        if let Ok(rt) = tokio::runtime::Handle::try_current() {
            let transport = Arc::clone(&self.transport);
            let channel = running.channel;
            rt.spawn(async move { transport.leave(&channel).await });
        }
    }
}
