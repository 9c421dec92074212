use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Coarse presence status of a user, as shown next to their name.
///
/// Only `Active` and `Idle` are ever published by a client; `Offline` is what
/// everyone else sees once all of a user's connections are gone.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    Active,
    Idle,
    #[default]
    Offline,
}

impl UserStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserStatus::Active => "active",
            UserStatus::Idle => "idle",
            UserStatus::Offline => "offline",
        }
    }
}

impl fmt::Display for UserStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UserStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(UserStatus::Active),
            "idle" => Ok(UserStatus::Idle),
            "offline" => Ok(UserStatus::Offline),
            other => Err(format!("unknown user status: {other}")),
        }
    }
}
