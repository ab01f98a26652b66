//! Sync conflict model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{Payload, SyncDocument};
use crate::sync::fingerprint::Fingerprint;

/// A rejected save: another client wrote the document since this client last
/// saw it. Never resolved automatically.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncConflict {
    /// Payload this client tried to save
    pub local: Payload,
    /// Payload currently in the shared document
    pub remote: Payload,
    /// Fingerprint of the shared document at detection time
    pub remote_fingerprint: Fingerprint,
    /// Version of the shared document at detection time
    pub remote_version: u64,
    /// When the remote payload was written
    pub last_modified: DateTime<Utc>,
    /// Who wrote the remote payload
    pub modified_by: String,
}

impl SyncConflict {
    pub fn new(local: Payload, remote: &SyncDocument) -> Self {
        Self {
            local,
            remote: remote.payload.clone(),
            remote_fingerprint: remote.fingerprint.clone(),
            remote_version: remote.version,
            last_modified: remote.last_modified,
            modified_by: remote.modified_by.clone(),
        }
    }

    /// The payload a resolution keeps.
    pub fn chosen(&self, prefer_local: bool) -> &Payload {
        if prefer_local {
            &self.local
        } else {
            &self.remote
        }
    }
}
