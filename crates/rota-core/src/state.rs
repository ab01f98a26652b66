//! Shared client state types.

use serde::{Deserialize, Serialize};

/// Whether the last operation against the shared folder succeeded.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connected,
}

/// Unified sync indicator shown by presentation layers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncIndicator {
    Disconnected,
    Connected,
    Conflict,
}

impl SyncIndicator {
    /// A pending conflict outranks connectivity.
    pub const fn from_parts(connection: ConnectionStatus, has_pending_conflict: bool) -> Self {
        if has_pending_conflict {
            return Self::Conflict;
        }
        match connection {
            ConnectionStatus::Disconnected => Self::Disconnected,
            ConnectionStatus::Connected => Self::Connected,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connected => "connected",
            Self::Conflict => "conflict",
        }
    }
}
