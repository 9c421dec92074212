//! Local activity state machine.
//!
//! Pure and clocked by the caller: every input takes `now`, and the machine
//! only reports which status (if any) must be pushed. The tracker task owns
//! the real timer and the transport.

use std::time::Duration;

use tokio::time::Instant;

use connectify_common::UserStatus;

use crate::activity::Visibility;

/// This client's own activity state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LocalActivityState {
    Active,
    Idle,
    /// Not joined. Never entered while the machine is running.
    #[default]
    Offline,
}

impl LocalActivityState {
    pub fn as_status(&self) -> UserStatus {
        match self {
            LocalActivityState::Active => UserStatus::Active,
            LocalActivityState::Idle => UserStatus::Idle,
            LocalActivityState::Offline => UserStatus::Offline,
        }
    }
}

/// Edge-triggered active/idle machine with a single idle deadline.
#[derive(Debug, Clone)]
pub struct ActivityMachine {
    state: LocalActivityState,
    last_pushed: UserStatus,
    idle_deadline: Option<Instant>,
    idle_timeout: Duration,
}

impl ActivityMachine {
    pub fn new(idle_timeout: Duration) -> Self {
        Self {
            state: LocalActivityState::Offline,
            last_pushed: UserStatus::Offline,
            idle_deadline: None,
            idle_timeout,
        }
    }

    pub fn state(&self) -> LocalActivityState {
        self.state
    }

    /// The pending idle deadline. At most one is ever armed.
    pub fn idle_deadline(&self) -> Option<Instant> {
        self.idle_deadline
    }

    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    /// Channel joined: the join itself counts as activity.
    pub fn on_join(&mut self, now: Instant) -> Option<UserStatus> {
        self.enter_active(now)
    }

    /// Pointer, key, or any other configured input signal.
    pub fn on_activity(&mut self, now: Instant) -> Option<UserStatus> {
        self.enter_active(now)
    }

    pub fn on_visibility(&mut self, visibility: Visibility, now: Instant) -> Option<UserStatus> {
        match visibility {
            Visibility::Visible => self.enter_active(now),
            Visibility::Hidden => self.enter_idle(),
        }
    }

    /// Idle timer fired. Ignored unless a deadline is armed and has passed.
    pub fn on_idle_deadline(&mut self, now: Instant) -> Option<UserStatus> {
        match self.idle_deadline {
            Some(deadline) if now >= deadline => self.enter_idle(),
            _ => None,
        }
    }

    fn enter_active(&mut self, now: Instant) -> Option<UserStatus> {
        self.state = LocalActivityState::Active;
        self.idle_deadline = Some(now + self.idle_timeout);
        self.edge(UserStatus::Active)
    }

    fn enter_idle(&mut self) -> Option<UserStatus> {
        self.state = LocalActivityState::Idle;
        self.idle_deadline = None;
        self.edge(UserStatus::Idle)
    }

    /// Record `status` as pushed if it differs from the last pushed value.
    fn edge(&mut self, status: UserStatus) -> Option<UserStatus> {
        if self.last_pushed == status {
            return None;
        }
        self.last_pushed = status;
        Some(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMEOUT: Duration = Duration::from_secs(60);

    fn joined() -> (ActivityMachine, Instant) {
        let mut machine = ActivityMachine::new(TIMEOUT);
        let t0 = Instant::now();
        assert_eq!(machine.on_join(t0), Some(UserStatus::Active));
        (machine, t0)
    }

    #[test]
    fn starts_offline_without_deadline() {
        let machine = ActivityMachine::new(TIMEOUT);
        assert_eq!(machine.state(), LocalActivityState::Offline);
        assert_eq!(machine.idle_deadline(), None);
    }

    #[test]
    fn join_enters_active_and_arms_deadline() {
        let (machine, t0) = joined();
        assert_eq!(machine.state(), LocalActivityState::Active);
        assert_eq!(machine.idle_deadline(), Some(t0 + TIMEOUT));
    }

    #[test]
    fn activity_while_active_only_moves_deadline() {
        let (mut machine, t0) = joined();
        for secs in [10, 20, 50, 100] {
            let now = t0 + Duration::from_secs(secs);
            assert_eq!(machine.on_activity(now), None);
            assert_eq!(machine.idle_deadline(), Some(now + TIMEOUT));
        }
        assert_eq!(machine.state(), LocalActivityState::Active);
    }

    #[test]
    fn deadline_demotes_to_idle_once() {
        let (mut machine, t0) = joined();
        let at = t0 + TIMEOUT;
        assert_eq!(machine.on_idle_deadline(at), Some(UserStatus::Idle));
        assert_eq!(machine.state(), LocalActivityState::Idle);
        assert_eq!(machine.idle_deadline(), None);
        assert_eq!(machine.on_idle_deadline(at + TIMEOUT), None);
    }

    #[test]
    fn early_deadline_call_is_ignored() {
        let (mut machine, t0) = joined();
        assert_eq!(
            machine.on_idle_deadline(t0 + Duration::from_secs(30)),
            None
        );
        assert_eq!(machine.state(), LocalActivityState::Active);
    }

    #[test]
    fn hidden_goes_idle_immediately_and_cancels_deadline() {
        let (mut machine, t0) = joined();
        let now = t0 + Duration::from_secs(5);
        assert_eq!(
            machine.on_visibility(Visibility::Hidden, now),
            Some(UserStatus::Idle)
        );
        assert_eq!(machine.idle_deadline(), None);
        assert_eq!(machine.on_idle_deadline(t0 + TIMEOUT), None);
    }

    #[test]
    fn visible_while_idle_reactivates_with_fresh_deadline() {
        let (mut machine, t0) = joined();
        machine.on_visibility(Visibility::Hidden, t0);
        let now = t0 + Duration::from_secs(300);
        assert_eq!(
            machine.on_visibility(Visibility::Visible, now),
            Some(UserStatus::Active)
        );
        assert_eq!(machine.idle_deadline(), Some(now + TIMEOUT));
    }

    #[test]
    fn visible_while_active_rearms_without_push() {
        let (mut machine, t0) = joined();
        let now = t0 + Duration::from_secs(40);
        assert_eq!(machine.on_visibility(Visibility::Visible, now), None);
        assert_eq!(machine.idle_deadline(), Some(now + TIMEOUT));
    }

    #[test]
    fn repeated_hidden_pushes_once() {
        let (mut machine, t0) = joined();
        assert!(machine.on_visibility(Visibility::Hidden, t0).is_some());
        assert!(machine.on_visibility(Visibility::Hidden, t0).is_none());
    }

    #[test]
    fn idle_then_key_press_pushes_active_again() {
        let (mut machine, t0) = joined();
        machine.on_idle_deadline(t0 + TIMEOUT);
        let now = t0 + TIMEOUT + Duration::from_secs(1);
        assert_eq!(machine.on_activity(now), Some(UserStatus::Active));
        assert_eq!(machine.state(), LocalActivityState::Active);
    }

    #[test]
    fn state_maps_to_status() {
        assert_eq!(LocalActivityState::Active.as_status(), UserStatus::Active);
        assert_eq!(LocalActivityState::Idle.as_status(), UserStatus::Idle);
        assert_eq!(LocalActivityState::Offline.as_status(), UserStatus::Offline);
    }
}
