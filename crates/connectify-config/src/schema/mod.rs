//! Configuration schema types for Connectify presence.
//!
//! All structs use `serde(default)` so partial configs work correctly.
//! Missing fields are filled with the defaults the web client ships with.

mod presence;
mod realtime;
mod system;

pub use presence::*;
pub use realtime::*;
pub use system::*;

use serde::{Deserialize, Serialize};

/// Current config schema version.
pub const CONFIG_SCHEMA_VERSION: u32 = 1;

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectifyConfig {
    pub presence: PresenceConfig,
    pub realtime: RealtimeConfig,
    pub logging: LoggingConfig,
}
