use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

use connectify_common::{Event, EventBus, UserStatus};

use super::*;
use crate::activity::{ActivitySignal, ChannelHost, SignalSink, Visibility};
use crate::transport::JoinedChannel;

const SELF_ID: &str = "me";

#[derive(Default)]
struct MockState {
    joins: Vec<(String, String)>,
    pushes: Vec<(String, Value)>,
    leaves: Vec<ChannelHandle>,
    fail_join: Option<PresenceError>,
    fail_push: bool,
    push_delay: Option<Duration>,
    echo: bool,
    sync_tx: Option<mpsc::Sender<PresenceSnapshot>>,
    next_id: u64,
}

/// Records every call; optionally echoes pushed statuses back as syncs the
/// way the server would.
#[derive(Default)]
struct MockTransport {
    state: Mutex<MockState>,
}

impl MockTransport {
    fn echoing() -> Self {
        let transport = Self::default();
        transport.state.lock().unwrap().echo = true;
        transport
    }

    fn failing_join(err: PresenceError) -> Self {
        let transport = Self::default();
        transport.state.lock().unwrap().fail_join = Some(err);
        transport
    }

    fn statuses(&self) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .pushes
            .iter()
            .map(|(_, payload)| payload["status"].as_str().unwrap_or_default().to_string())
            .collect()
    }

    fn events(&self) -> Vec<String> {
        let state = self.state.lock().unwrap();
        state.pushes.iter().map(|(e, _)| e.clone()).collect()
    }

    fn join_count(&self) -> usize {
        self.state.lock().unwrap().joins.len()
    }

    fn joined_tokens(&self) -> Vec<String> {
        let state = self.state.lock().unwrap();
        state.joins.iter().map(|(_, token)| token.clone()).collect()
    }

    fn leave_count(&self) -> usize {
        self.state.lock().unwrap().leaves.len()
    }

    fn sync(&self, snapshot: PresenceSnapshot) {
        let state = self.state.lock().unwrap();
        let tx = state.sync_tx.as_ref().expect("not joined");
        tx.try_send(snapshot).unwrap();
    }
}

#[async_trait]
impl PresenceTransport for MockTransport {
    async fn join(&self, topic: &str, token: &str) -> Result<JoinedChannel, PresenceError> {
        let mut state = self.state.lock().unwrap();
        state.joins.push((topic.to_string(), token.to_string()));
        if let Some(err) = state.fail_join.clone() {
            return Err(err);
        }
        let (tx, rx) = mpsc::channel(16);
        state.sync_tx = Some(tx);
        state.next_id += 1;
        Ok(JoinedChannel {
            handle: ChannelHandle {
                id: state.next_id.to_string(),
                topic: topic.to_string(),
            },
            syncs: rx,
        })
    }

    async fn push(
        &self,
        _channel: &ChannelHandle,
        event: &str,
        payload: Value,
    ) -> Result<(), PresenceError> {
        let delay = {
            let mut state = self.state.lock().unwrap();
            state.pushes.push((event.to_string(), payload.clone()));
            state.push_delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let state = self.state.lock().unwrap();
        if state.fail_push {
            return Err(PresenceError::PushTimeout {
                event: event.to_string(),
            });
        }
        if state.echo {
            let status: UserStatus = payload["status"]
                .as_str()
                .and_then(|s| s.parse().ok())
                .unwrap_or_default();
            if let Some(tx) = &state.sync_tx {
                let _ = tx.try_send(PresenceSnapshot::new().with_user(SELF_ID, &[status]));
            }
        }
        Ok(())
    }

    async fn leave(&self, channel: &ChannelHandle) {
        let mut state = self.state.lock().unwrap();
        state.leaves.push(channel.clone());
        state.sync_tx = None;
    }
}

/// Host that records registrations on top of a real [`ChannelHost`].
#[derive(Clone, Default)]
struct SpyHost {
    inner: ChannelHost,
    added: Arc<Mutex<Vec<ListenerId>>>,
    removed: Arc<Mutex<Vec<ListenerId>>>,
}

impl SpyHost {
    fn emit(&self, signal: ActivitySignal) -> usize {
        self.inner.emit(signal)
    }

    fn added(&self) -> Vec<ListenerId> {
        self.added.lock().unwrap().clone()
    }

    fn removed(&self) -> Vec<ListenerId> {
        self.removed.lock().unwrap().clone()
    }
}

impl ActivityHost for SpyHost {
    fn add_listener(&mut self, kind: SignalKind, sink: SignalSink) -> ListenerId {
        let id = self.inner.add_listener(kind, sink);
        self.added.lock().unwrap().push(id);
        id
    }

    fn remove_listener(&mut self, id: ListenerId) {
        self.inner.remove_listener(id);
        self.removed.lock().unwrap().push(id);
    }
}

type Fixture = (PresenceTracker<MockTransport, SpyHost>, Arc<MockTransport>, SpyHost);

fn tracker_with(transport: MockTransport) -> Fixture {
    let transport = Arc::new(transport);
    let host = SpyHost::default();
    let tracker = PresenceTracker::new(
        TrackerConfig {
            channel: "status".into(),
            idle_timeout: Duration::from_secs(60),
            activity_signals: vec![SignalKind::PointerMove, SignalKind::KeyDown],
        },
        Arc::clone(&transport),
        host.clone(),
    );
    (tracker, transport, host)
}

/// Let the tracker task drain its queues.
async fn settle() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}

async fn advance(duration: Duration) {
    tokio::time::advance(duration).await;
    settle().await;
}

async fn started(transport: MockTransport) -> Fixture {
    let (mut tracker, transport, host) = tracker_with(transport);
    tracker
        .start(&Session::authenticated("tok-1"))
        .await
        .expect("start");
    settle().await;
    (tracker, transport, host)
}

#[tokio::test(start_paused = true)]
async fn join_pushes_active_once() {
    let (tracker, transport, _host) = started(MockTransport::default()).await;
    assert_eq!(transport.events(), vec!["status:update"]);
    assert_eq!(transport.statuses(), vec!["active"]);
    assert_eq!(transport.joined_tokens(), vec!["tok-1"]);
    assert_eq!(tracker.local_state(), LocalActivityState::Active);
    assert!(tracker.is_joined());
}

#[tokio::test(start_paused = true)]
async fn own_status_visible_after_echo() {
    let (tracker, _transport, _host) = started(MockTransport::echoing()).await;
    assert_eq!(tracker.get_user_status(SELF_ID), UserStatus::Active);
    assert_eq!(tracker.view().get_user_status(SELF_ID), UserStatus::Active);
}

#[tokio::test(start_paused = true)]
async fn activity_while_active_pushes_nothing() {
    let (_tracker, transport, host) = started(MockTransport::default()).await;
    for _ in 0..5 {
        host.emit(ActivitySignal::PointerMove);
        host.emit(ActivitySignal::KeyDown);
        advance(Duration::from_secs(10)).await;
    }
    assert_eq!(transport.statuses(), vec!["active"]);
}

#[tokio::test(start_paused = true)]
async fn idle_after_timeout_without_activity() {
    let (tracker, transport, _host) = started(MockTransport::default()).await;

    advance(Duration::from_secs(59)).await;
    assert_eq!(transport.statuses(), vec!["active"]);

    advance(Duration::from_millis(1_001)).await;
    assert_eq!(transport.statuses(), vec!["active", "idle"]);
    assert_eq!(tracker.local_state(), LocalActivityState::Idle);

    advance(Duration::from_secs(600)).await;
    assert_eq!(transport.statuses(), vec!["active", "idle"]);
}

#[tokio::test(start_paused = true)]
async fn activity_resets_idle_timer() {
    let (_tracker, transport, host) = started(MockTransport::default()).await;

    advance(Duration::from_secs(50)).await;
    host.emit(ActivitySignal::KeyDown);
    settle().await;
    advance(Duration::from_secs(50)).await;
    assert_eq!(transport.statuses(), vec!["active"]);

    advance(Duration::from_secs(11)).await;
    assert_eq!(transport.statuses(), vec!["active", "idle"]);
}

#[tokio::test(start_paused = true)]
async fn activity_after_idle_pushes_active() {
    let (tracker, transport, host) = started(MockTransport::default()).await;
    advance(Duration::from_secs(61)).await;

    host.emit(ActivitySignal::PointerMove);
    settle().await;
    host.emit(ActivitySignal::PointerMove);
    settle().await;

    assert_eq!(transport.statuses(), vec!["active", "idle", "active"]);
    assert_eq!(tracker.local_state(), LocalActivityState::Active);
}

#[tokio::test(start_paused = true)]
async fn hidden_goes_idle_immediately() {
    let (_tracker, transport, host) = started(MockTransport::default()).await;

    host.emit(ActivitySignal::VisibilityChanged(Visibility::Hidden));
    settle().await;
    assert_eq!(transport.statuses(), vec!["active", "idle"]);

    // The idle timer was cancelled along with the transition.
    advance(Duration::from_secs(120)).await;
    assert_eq!(transport.statuses(), vec!["active", "idle"]);

    host.emit(ActivitySignal::VisibilityChanged(Visibility::Visible));
    settle().await;
    assert_eq!(transport.statuses(), vec!["active", "idle", "active"]);
}

#[tokio::test(start_paused = true)]
async fn unconfigured_signal_kinds_are_not_observed() {
    let (_tracker, transport, host) = started(MockTransport::default()).await;
    advance(Duration::from_secs(61)).await;

    assert_eq!(host.emit(ActivitySignal::Scroll), 0);
    assert_eq!(host.emit(ActivitySignal::Touch), 0);
    settle().await;
    assert_eq!(transport.statuses(), vec!["active", "idle"]);
}

#[tokio::test(start_paused = true)]
async fn push_failure_keeps_local_state() {
    let (tracker, transport, _host) = started(MockTransport::default()).await;
    transport.state.lock().unwrap().fail_push = true;

    advance(Duration::from_secs(61)).await;
    assert_eq!(transport.statuses(), vec!["active", "idle"]);
    assert_eq!(tracker.local_state(), LocalActivityState::Idle);
}

#[tokio::test(start_paused = true)]
async fn slow_push_does_not_hold_up_the_tracker() {
    let slow = MockTransport::default();
    slow.state.lock().unwrap().push_delay = Some(Duration::from_secs(10));
    let (mut tracker, transport, host) = started(slow).await;
    assert_eq!(transport.statuses(), vec!["active"]);

    transport.sync(PresenceSnapshot::new().with_user("bob", &[UserStatus::Active]));
    settle().await;
    assert_eq!(tracker.get_user_status("bob"), UserStatus::Active);

    host.emit(ActivitySignal::VisibilityChanged(Visibility::Hidden));
    settle().await;
    assert_eq!(tracker.local_state(), LocalActivityState::Idle);

    let before = tokio::time::Instant::now();
    tracker.stop().await;
    assert!(before.elapsed() < Duration::from_secs(1));
    assert_eq!(transport.leave_count(), 1);
    assert!(!tracker.is_joined());
}

#[tokio::test(start_paused = true)]
async fn queued_pushes_keep_edge_order() {
    let slow = MockTransport::default();
    slow.state.lock().unwrap().push_delay = Some(Duration::from_secs(5));
    let (_tracker, transport, host) = started(slow).await;

    host.emit(ActivitySignal::VisibilityChanged(Visibility::Hidden));
    settle().await;
    host.emit(ActivitySignal::VisibilityChanged(Visibility::Visible));
    settle().await;
    assert_eq!(transport.statuses(), vec!["active"]);

    for _ in 0..3 {
        advance(Duration::from_secs(5)).await;
    }
    assert_eq!(transport.statuses(), vec!["active", "idle", "active"]);
}

#[tokio::test(start_paused = true)]
async fn snapshot_is_replaced_wholesale() {
    let (tracker, transport, _host) = started(MockTransport::default()).await;

    transport.sync(
        PresenceSnapshot::new()
            .with_user("alice", &[UserStatus::Idle, UserStatus::Active])
            .with_user("bob", &[UserStatus::Idle]),
    );
    settle().await;
    assert_eq!(tracker.get_user_status("alice"), UserStatus::Active);
    assert_eq!(tracker.get_user_status("bob"), UserStatus::Idle);

    transport.sync(PresenceSnapshot::new().with_user("carol", &[UserStatus::Active]));
    settle().await;
    assert_eq!(tracker.get_user_status("alice"), UserStatus::Offline);
    assert_eq!(tracker.get_user_status("bob"), UserStatus::Offline);
    assert_eq!(tracker.get_user_status("carol"), UserStatus::Active);
    assert_eq!(tracker.view().online_user_ids(), vec!["carol"]);
}

#[tokio::test(start_paused = true)]
async fn stop_tears_down_everything_once() {
    let (mut tracker, transport, host) = started(MockTransport::echoing()).await;
    let view = tracker.view();
    assert_eq!(host.added().len(), 3);

    tracker.stop().await;
    tracker.stop().await;

    let mut added = host.added();
    let mut removed = host.removed();
    added.sort_by_key(|id| id.0);
    removed.sort_by_key(|id| id.0);
    assert_eq!(added, removed);
    assert_eq!(transport.leave_count(), 1);
    assert!(!tracker.is_joined());
    assert_eq!(tracker.local_state(), LocalActivityState::Offline);
    assert_eq!(view.get_user_status(SELF_ID), UserStatus::Offline);

    // No timer survives teardown.
    advance(Duration::from_secs(120)).await;
    assert_eq!(transport.statuses(), vec!["active"]);
    assert_eq!(host.emit(ActivitySignal::KeyDown), 0);
}

#[tokio::test(start_paused = true)]
async fn stop_without_start_is_a_no_op() {
    let (mut tracker, transport, host) = tracker_with(MockTransport::default());
    tracker.stop().await;
    assert_eq!(transport.leave_count(), 0);
    assert!(host.removed().is_empty());
}

#[tokio::test(start_paused = true)]
async fn unauthenticated_session_never_joins() {
    let (mut tracker, transport, host) = tracker_with(MockTransport::default());

    let err = tracker.start(&Session::signed_out()).await.unwrap_err();
    assert_eq!(err, PresenceError::NotAuthenticated);

    let no_token = Session {
        is_authenticated: true,
        token: None,
    };
    tracker.apply_session(&no_token).await;

    assert_eq!(transport.join_count(), 0);
    assert!(host.added().is_empty());
    assert_eq!(tracker.get_user_status("anyone"), UserStatus::Offline);
}

#[tokio::test(start_paused = true)]
async fn join_failure_leaves_tracker_unjoined() {
    let (mut tracker, transport, host) = tracker_with(MockTransport::failing_join(
        PresenceError::JoinRejected {
            topic: "status".into(),
            reason: "unauthorized".into(),
        },
    ));

    let err = tracker
        .start(&Session::authenticated("bad"))
        .await
        .unwrap_err();
    assert!(matches!(err, PresenceError::JoinRejected { .. }));
    assert!(!tracker.is_joined());
    assert!(host.added().is_empty());
    assert_eq!(tracker.local_state(), LocalActivityState::Offline);
    assert_eq!(tracker.get_user_status(SELF_ID), UserStatus::Offline);

    // No retry on its own.
    advance(Duration::from_secs(600)).await;
    assert_eq!(transport.join_count(), 1);
    assert!(transport.statuses().is_empty());
}

#[tokio::test(start_paused = true)]
async fn same_token_start_is_a_no_op() {
    let (mut tracker, transport, host) = started(MockTransport::default()).await;
    tracker
        .start(&Session::authenticated("tok-1"))
        .await
        .unwrap();
    settle().await;
    assert_eq!(transport.join_count(), 1);
    assert_eq!(host.added().len(), 3);
    assert_eq!(transport.statuses(), vec!["active"]);
}

#[tokio::test(start_paused = true)]
async fn token_change_restarts_session() {
    let (mut tracker, transport, host) = started(MockTransport::default()).await;
    let first = tracker.session_id().cloned();

    tracker
        .apply_session(&Session::authenticated("tok-2"))
        .await;
    settle().await;

    assert_eq!(transport.joined_tokens(), vec!["tok-1", "tok-2"]);
    assert_eq!(transport.leave_count(), 1);
    assert_eq!(host.removed().len(), 3);
    assert_eq!(host.added().len(), 6);
    assert_ne!(tracker.session_id().cloned(), first);
    assert_eq!(transport.statuses(), vec!["active", "active"]);
}

#[tokio::test(start_paused = true)]
async fn run_session_follows_login_and_logout() {
    let (tracker, transport, host) = tracker_with(MockTransport::default());
    let (session_tx, session_rx) = tokio::sync::watch::channel(Session::signed_out());

    let driver = tokio::spawn(async move {
        let mut tracker = tracker;
        tracker.run_session(session_rx).await;
        tracker
    });
    settle().await;
    assert_eq!(transport.join_count(), 0);

    session_tx.send_replace(Session::authenticated("tok-1"));
    settle().await;
    assert_eq!(transport.join_count(), 1);
    assert_eq!(transport.statuses(), vec!["active"]);

    session_tx.send_replace(Session::signed_out());
    settle().await;
    assert_eq!(transport.leave_count(), 1);
    assert_eq!(host.removed().len(), 3);

    session_tx.send_replace(Session::authenticated("tok-1"));
    settle().await;
    drop(session_tx);

    let tracker = driver.await.unwrap();
    assert!(!tracker.is_joined());
    assert_eq!(transport.join_count(), 2);
    assert_eq!(transport.leave_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn events_are_published_on_the_bus() {
    let bus = Arc::new(EventBus::new(32));
    let mut rx = bus.subscribe();
    let (tracker, transport, _host) = tracker_with(MockTransport::echoing());
    let mut tracker = tracker.with_event_bus(Arc::clone(&bus));

    tracker
        .start(&Session::authenticated("tok-1"))
        .await
        .unwrap();
    settle().await;
    tracker.stop().await;
    assert_eq!(transport.leave_count(), 1);

    let mut seen = Vec::new();
    while let Ok(event) = rx.try_recv() {
        seen.push(event);
    }
    assert!(matches!(seen.first(), Some(Event::PresenceJoined { .. })));
    assert!(seen.iter().any(|e| matches!(
        e,
        Event::LocalStatusChanged {
            status: UserStatus::Active
        }
    )));
    assert!(seen
        .iter()
        .any(|e| matches!(e, Event::PresenceSynced { online: 1 })));
    assert!(matches!(seen.last(), Some(Event::PresenceLeft)));
}

#[test]
fn listener_kinds_dedupe_and_add_visibility() {
    let config = TrackerConfig {
        channel: "status".into(),
        idle_timeout: Duration::from_secs(60),
        activity_signals: vec![
            SignalKind::KeyDown,
            SignalKind::KeyDown,
            SignalKind::Visibility,
            SignalKind::Scroll,
        ],
    };
    assert_eq!(
        config.listener_kinds(),
        vec![SignalKind::KeyDown, SignalKind::Scroll, SignalKind::Visibility]
    );
}

#[test]
fn tracker_config_from_presence_config() {
    let config = TrackerConfig::default();
    assert_eq!(config.channel, "status");
    assert_eq!(config.idle_timeout, Duration::from_secs(60));
    assert_eq!(
        config.activity_signals,
        vec![SignalKind::PointerMove, SignalKind::KeyDown]
    );
}
