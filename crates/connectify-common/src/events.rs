use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::types::UserStatus;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum Event {
    /// This client's own resolved status changed and was pushed.
    LocalStatusChanged { status: UserStatus },
    /// A full presence snapshot replaced the previous one.
    PresenceSynced { online: usize },
    /// The presence channel was joined for the given session.
    PresenceJoined { session_id: String },
    /// The presence session was torn down.
    PresenceLeft,
    Shutdown,
    #[serde(other)]
    Unknown,
}

pub struct EventBus {
    sender: broadcast::Sender<Event>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }

    pub fn publish(&self, event: Event) -> usize {
        self.sender.send(event).unwrap_or(0)
    }
}
