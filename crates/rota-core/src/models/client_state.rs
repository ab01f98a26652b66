//! Per-process sync state

use crate::models::{ClientId, SyncConflict};
use crate::state::{ConnectionStatus, SyncIndicator};
use crate::sync::fingerprint::Fingerprint;

/// What one client process knows about the shared document. Never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientSyncState {
    pub client_id: ClientId,
    /// Fingerprint of the document this client last read or wrote
    pub last_known_fingerprint: Option<Fingerprint>,
    pub connection: ConnectionStatus,
    /// Rejected save awaiting a decision
    pub conflict: Option<SyncConflict>,
}

impl ClientSyncState {
    pub const fn new(client_id: ClientId) -> Self {
        Self {
            client_id,
            last_known_fingerprint: None,
            connection: ConnectionStatus::Disconnected,
            conflict: None,
        }
    }

    /// Whether `current` differs from what this client last saw.
    ///
    /// A client that has never seen the document treats any fingerprint as
    /// new.
    pub fn is_stale(&self, current: &Fingerprint) -> bool {
        self.last_known_fingerprint.as_ref() != Some(current)
    }

    pub const fn indicator(&self) -> SyncIndicator {
        SyncIndicator::from_parts(self.connection, self.conflict.is_some())
    }
}
