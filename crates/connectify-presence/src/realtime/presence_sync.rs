//! Client-side presence state for one channel, kept in step with the
//! server's `presence_state` / `presence_diff` messages.

use std::collections::HashMap;

/// `key -> [meta]`, as the server describes presence.
pub type PresenceMap = HashMap<String, Vec<serde_json::Value>>;

/// Presence state for one joined channel.
///
/// Diffs that arrive before the first full state are held back and applied
/// on top of it, in arrival order.
#[derive(Debug, Default)]
pub(crate) struct PresenceSync {
    state: PresenceMap,
    synced: bool,
    pending_diffs: Vec<(PresenceMap, PresenceMap)>,
}

impl PresenceSync {
    /// Replace the whole state and flush any held-back diffs.
    pub(crate) fn apply_state(&mut self, state: PresenceMap) -> &PresenceMap {
        self.state = state;
        self.synced = true;
        for (joins, leaves) in std::mem::take(&mut self.pending_diffs) {
            merge(&mut self.state, joins, leaves);
        }
        &self.state
    }

    /// Merge a diff. Returns the merged state, or `None` if the diff was
    /// held back waiting for the first full state.
    pub(crate) fn apply_diff(
        &mut self,
        joins: PresenceMap,
        leaves: PresenceMap,
    ) -> Option<&PresenceMap> {
        if !self.synced {
            self.pending_diffs.push((joins, leaves));
            return None;
        }
        merge(&mut self.state, joins, leaves);
        Some(&self.state)
    }

    /// Forget everything; the next join starts from a fresh state.
    pub(crate) fn reset(&mut self) {
        *self = Self::default();
    }
}

fn phx_ref(meta: &serde_json::Value) -> Option<&str> {
    meta.get("phx_ref").and_then(|r| r.as_str())
}

fn merge(state: &mut PresenceMap, joins: PresenceMap, leaves: PresenceMap) {
    for (key, metas) in joins {
        let current = state.entry(key).or_default();
        for meta in metas {
            if let Some(new_ref) = phx_ref(&meta) {
                current.retain(|m| phx_ref(m) != Some(new_ref));
            }
            current.push(meta);
        }
    }

    for (key, metas) in leaves {
        let Some(current) = state.get_mut(&key) else {
            continue;
        };
        let gone: Vec<&str> = metas.iter().filter_map(phx_ref).collect();
        current.retain(|m| !phx_ref(m).is_some_and(|r| gone.contains(&r)));
        if current.is_empty() {
            state.remove(&key);
        }
    }
}
