//! Peer configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::controller::Role;

/// Default time to wait for a join snapshot before settling on defaults.
pub const DEFAULT_JOIN_WINDOW_MS: u64 = 1500;

/// Default room name.
pub const DEFAULT_ROOM: &str = "default";

fn default_room() -> String {
    DEFAULT_ROOM.to_string()
}

fn default_join_window_ms() -> Option<u64> {
    Some(DEFAULT_JOIN_WINDOW_MS)
}

/// Settings for one peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerConfig {
    #[serde(default)]
    pub role: Role,
    /// Room joined on the relay server.
    #[serde(default = "default_room")]
    pub room: String,
    /// Join window in milliseconds; `null` waits for a snapshot indefinitely.
    #[serde(default = "default_join_window_ms")]
    pub join_window_ms: Option<u64>,
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self {
            role: Role::default(),
            room: default_room(),
            join_window_ms: default_join_window_ms(),
        }
    }
}

impl PeerConfig {
    /// Presenter configuration with defaults.
    pub fn presenter() -> Self {
        Self {
            role: Role::Presenter,
            ..Default::default()
        }
    }

    /// Student configuration with defaults.
    pub fn student() -> Self {
        Self::default()
    }

    pub fn join_window(&self) -> Option<Duration> {
        self.join_window_ms.map(Duration::from_millis)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}
