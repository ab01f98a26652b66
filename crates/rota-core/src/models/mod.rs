//! Data models for Rota

mod client_id;
mod client_state;
mod document;
mod sync_conflict;

pub use client_id::ClientId;
pub use client_state::ClientSyncState;
pub use document::SyncDocument;
pub use sync_conflict::SyncConflict;

/// Opaque schedule data: the ordered list of week schedules as JSON.
pub type Payload = serde_json::Value;

/// The payload of a freshly initialized document (no weeks).
pub fn empty_payload() -> Payload {
    Payload::Array(Vec::new())
}
