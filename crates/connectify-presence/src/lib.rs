//! Presence tracking for Connectify clients.
//!
//! Publishes this client's own activity (`active` / `idle`) on a real-time
//! channel and keeps a snapshot of everyone else's, so any user id can be
//! resolved to `active`, `idle` or `offline`.

pub mod activity;
pub mod error;
pub mod machine;
pub mod phoenix;
pub mod protocol;
pub mod realtime;
pub mod session;
pub mod snapshot;
pub mod status;
pub mod tracker;
pub mod transport;

pub use activity::{
    ActivityHost, ActivitySignal, ChannelHost, ListenerId, SignalKind, SignalSink, Visibility,
};
pub use connectify_common::UserStatus;
pub use error::PresenceError;
pub use machine::{ActivityMachine, LocalActivityState};
pub use phoenix::PhoenixTransport;
pub use protocol::{events, StatusUpdatePayload};
pub use realtime::{RealtimeClient, RealtimeConfig};
pub use session::Session;
pub use snapshot::{PresenceEntry, PresenceMeta, PresenceSnapshot, PresenceView};
pub use status::resolve;
pub use tracker::{PresenceTracker, TrackerConfig};
pub use transport::{ChannelHandle, JoinedChannel, PresenceTransport};
