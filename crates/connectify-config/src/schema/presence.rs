//! Presence tracker configuration types.

use serde::{Deserialize, Serialize};

/// Input signal kinds that count as user activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivitySignalKind {
    PointerMove,
    KeyDown,
    Scroll,
    Touch,
}

/// Presence tracker configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PresenceConfig {
    pub enabled: bool,
    /// Name of the shared presence channel.
    pub channel: String,
    /// Seconds without activity before this client is demoted to idle
    /// (valid range: 5-3600).
    pub idle_timeout_secs: u32,
    /// Which input signals reset the idle timer. Visibility changes are
    /// always observed.
    pub activity_signals: Vec<ActivitySignalKind>,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            channel: "status".into(),
            idle_timeout_secs: 60,
            activity_signals: vec![ActivitySignalKind::PointerMove, ActivitySignalKind::KeyDown],
        }
    }
}
