//! Application-level payloads carried on the presence channel.
//!
//! The transport envelope (Phoenix Channels protocol) is handled by
//! `realtime`; these are the bodies the tracker pushes and reads.

use serde::{Deserialize, Serialize};

use connectify_common::UserStatus;

/// Event names pushed on the presence channel.
pub mod events {
    pub const STATUS_UPDATE: &str = "status:update";
}

/// Body of a `status:update` push.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusUpdatePayload {
    pub status: UserStatus,
}

impl StatusUpdatePayload {
    pub fn new(status: UserStatus) -> Self {
        Self { status }
    }

    pub fn to_value(&self) -> serde_json::Value {
        serde_json::json!({ "status": self.status })
    }
}
