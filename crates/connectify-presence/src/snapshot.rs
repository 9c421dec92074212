//! Presence snapshot: who is connected, and with which statuses.
//!
//! A snapshot is replaced wholesale on every sync from the transport; the
//! tracker owns the only writer and hands out read-only [`PresenceView`]s.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use connectify_common::UserStatus;

use crate::status::resolve_metas;

/// One device or tab's published presence record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceMeta {
    pub status: UserStatus,
    /// Transport-assigned id of this meta, when the transport provides one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phx_ref: Option<String>,
}

impl PresenceMeta {
    pub fn new(status: UserStatus) -> Self {
        Self {
            status,
            phx_ref: None,
        }
    }

    /// Parse a raw meta object. A missing or unrecognized status is read as
    /// idle: the connection exists but is not known to be active.
    pub fn from_value(value: &serde_json::Value) -> Self {
        let status = value
            .get("status")
            .and_then(|s| s.as_str())
            .and_then(|s| s.parse().ok())
            .unwrap_or(UserStatus::Idle);
        let phx_ref = value
            .get("phx_ref")
            .and_then(|r| r.as_str())
            .map(str::to_string);
        Self { status, phx_ref }
    }
}

/// All metas currently published for one user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceEntry {
    pub metas: Vec<PresenceMeta>,
}

impl PresenceEntry {
    pub fn status(&self) -> UserStatus {
        resolve_metas(&self.metas)
    }
}

/// Full mapping from user id to that user's presence entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PresenceSnapshot {
    entries: HashMap<String, PresenceEntry>,
}

impl PresenceSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a snapshot from the transport's raw `key -> [meta]` map.
    pub fn from_raw(raw: &HashMap<String, Vec<serde_json::Value>>) -> Self {
        let entries = raw
            .iter()
            .map(|(key, metas)| {
                let entry = PresenceEntry {
                    metas: metas.iter().map(PresenceMeta::from_value).collect(),
                };
                (key.clone(), entry)
            })
            .collect();
        Self { entries }
    }

    pub fn insert(&mut self, user_id: impl Into<String>, entry: PresenceEntry) {
        self.entries.insert(user_id.into(), entry);
    }

    /// Convenience for building snapshots by hand.
    pub fn with_user(mut self, user_id: impl Into<String>, statuses: &[UserStatus]) -> Self {
        let entry = PresenceEntry {
            metas: statuses.iter().copied().map(PresenceMeta::new).collect(),
        };
        self.insert(user_id, entry);
        self
    }

    pub fn get(&self, user_id: &str) -> Option<&PresenceEntry> {
        self.entries.get(user_id)
    }

    /// Resolved status of `user_id`; absent users are offline.
    pub fn status_of(&self, user_id: &str) -> UserStatus {
        self.entries
            .get(user_id)
            .map(PresenceEntry::status)
            .unwrap_or(UserStatus::Offline)
    }

    /// Ids of users with at least one connection.
    pub fn online_user_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, entry)| !entry.metas.is_empty())
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    pub fn online_count(&self) -> usize {
        self.entries.values().filter(|e| !e.metas.is_empty()).count()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Read-only view of the tracker's latest presence snapshot.
///
/// Cheap to clone and to query; safe to call once per rendered row.
#[derive(Debug, Clone)]
pub struct PresenceView {
    rx: watch::Receiver<PresenceSnapshot>,
}

impl PresenceView {
    pub(crate) fn new(rx: watch::Receiver<PresenceSnapshot>) -> Self {
        Self { rx }
    }

    /// Resolve any user id to `active`, `idle` or `offline`.
    pub fn get_user_status(&self, user_id: &str) -> UserStatus {
        self.rx.borrow().status_of(user_id)
    }

    pub fn online_user_ids(&self) -> Vec<String> {
        self.rx.borrow().online_user_ids()
    }

    pub fn online_count(&self) -> usize {
        self.rx.borrow().online_count()
    }

    /// A copy of the current snapshot.
    pub fn snapshot(&self) -> PresenceSnapshot {
        self.rx.borrow().clone()
    }

    /// Wait until the snapshot is replaced. Returns `false` once the tracker
    /// that owns the snapshot is gone.
    pub async fn changed(&mut self) -> bool {
        self.rx.changed().await.is_ok()
    }
}
