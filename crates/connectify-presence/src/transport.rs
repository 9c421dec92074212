//! Capability interface between the tracker and a real-time channel.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::PresenceError;
use crate::snapshot::PresenceSnapshot;

/// Identifies one joined channel on a transport.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChannelHandle {
    pub id: String,
    pub topic: String,
}

/// A successful join: the handle plus the stream of full presence snapshots.
#[derive(Debug)]
pub struct JoinedChannel {
    pub handle: ChannelHandle,
    pub syncs: mpsc::Receiver<PresenceSnapshot>,
}

#[async_trait]
pub trait PresenceTransport: Send + Sync + 'static {
    /// Join `topic`, authenticating with `token`.
    async fn join(&self, topic: &str, token: &str) -> Result<JoinedChannel, PresenceError>;

    /// Push one event on a joined channel and wait for the server's reply.
    async fn push(
        &self,
        channel: &ChannelHandle,
        event: &str,
        payload: serde_json::Value,
    ) -> Result<(), PresenceError>;

    /// Leave the channel and release the underlying connection. Idempotent.
    async fn leave(&self, channel: &ChannelHandle);
}
