//! The tracker's background task: activity signals, snapshot syncs and the
//! idle timer, multiplexed on one `select!` loop.
//!
//! Status pushes run on a separate task so a slow server reply never holds
//! up the loop. They are still sent one at a time, in edge order.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, trace, warn};

use connectify_common::{Event, EventBus, SessionId, UserStatus};

use crate::activity::ActivitySignal;
use crate::machine::{ActivityMachine, LocalActivityState};
use crate::protocol::{events, StatusUpdatePayload};
use crate::snapshot::PresenceSnapshot;
use crate::transport::{ChannelHandle, PresenceTransport};

pub(super) struct TrackerTask<T: PresenceTransport> {
    pub(super) session_id: SessionId,
    pub(super) transport: Arc<T>,
    pub(super) channel: ChannelHandle,
    pub(super) machine: ActivityMachine,
    pub(super) snapshot_tx: Arc<watch::Sender<PresenceSnapshot>>,
    pub(super) state_tx: Arc<watch::Sender<LocalActivityState>>,
    pub(super) events: Option<Arc<EventBus>>,
}

impl<T: PresenceTransport> TrackerTask<T> {
    pub(super) async fn run(
        mut self,
        mut syncs: mpsc::Receiver<PresenceSnapshot>,
        mut signals: mpsc::UnboundedReceiver<ActivitySignal>,
        mut shutdown: oneshot::Receiver<()>,
    ) {
        let pusher = StatusPusher::spawn(
            Arc::clone(&self.transport),
            self.channel.clone(),
            self.session_id.clone(),
        );

        let joined = self.machine.on_join(Instant::now());
        self.apply(joined, &pusher);

        let mut syncs_open = true;
        let mut signals_open = true;

        loop {
            let deadline = self.machine.idle_deadline();

            tokio::select! {
                biased;

                _ = &mut shutdown => break,

                signal = signals.recv(), if signals_open => match signal {
                    Some(signal) => {
                        let update = self.on_signal(signal);
                        self.apply(update, &pusher);
                    }
                    None => signals_open = false,
                },

                sync = syncs.recv(), if syncs_open => match sync {
                    Some(snapshot) => self.on_sync(snapshot),
                    None => {
                        debug!(session_id = %self.session_id, "Presence sync stream closed");
                        syncs_open = false;
                    }
                },

                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    let update = self.machine.on_idle_deadline(Instant::now());
                    self.apply(update, &pusher);
                }
            }
        }

        debug!(session_id = %self.session_id, "Presence task stopped");
    }

    fn on_signal(&mut self, signal: ActivitySignal) -> Option<UserStatus> {
        trace!(?signal, "Activity signal");
        let now = Instant::now();
        match signal {
            ActivitySignal::VisibilityChanged(visibility) => {
                self.machine.on_visibility(visibility, now)
            }
            _ => self.machine.on_activity(now),
        }
    }

    fn on_sync(&mut self, snapshot: PresenceSnapshot) {
        let online = snapshot.online_count();
        self.snapshot_tx.send_replace(snapshot);
        debug!(session_id = %self.session_id, online, "Presence synced");
        if let Some(bus) = &self.events {
            bus.publish(Event::PresenceSynced { online });
        }
    }

    /// Mirror the machine's state and queue `update` for pushing.
    fn apply(&mut self, update: Option<UserStatus>, pusher: &StatusPusher) {
        let state = self.machine.state();
        self.state_tx.send_if_modified(|current| {
            if *current == state {
                return false;
            }
            *current = state;
            true
        });

        let Some(status) = update else {
            return;
        };
        pusher.push(status);

        if let Some(bus) = &self.events {
            bus.publish(Event::LocalStatusChanged { status });
        }
    }
}

/// Ordered `status:update` pushes for one joined channel. Dropping it
/// abandons whatever push is in flight.
struct StatusPusher {
    tx: mpsc::UnboundedSender<UserStatus>,
    task: JoinHandle<()>,
}

impl StatusPusher {
    fn spawn<T: PresenceTransport>(
        transport: Arc<T>,
        channel: ChannelHandle,
        session_id: SessionId,
    ) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<UserStatus>();
        let task = tokio::spawn(async move {
            while let Some(status) = rx.recv().await {
                let payload = StatusUpdatePayload::new(status).to_value();
                match transport
                    .push(&channel, events::STATUS_UPDATE, payload)
                    .await
                {
                    Ok(()) => debug!(session_id = %session_id, %status, "Status pushed"),
                    Err(e) => warn!(
                        session_id = %session_id,
                        %status,
                        error = %e,
                        "Status push failed"
                    ),
                }
            }
        });
        Self { tx, task }
    }

    fn push(&self, status: UserStatus) {
        if self.tx.send(status).is_err() {
            warn!(%status, "Status pusher gone, update dropped");
        }
    }
}

impl Drop for StatusPusher {
    fn drop(&mut self) {
        self.task.abort();
    }
}
