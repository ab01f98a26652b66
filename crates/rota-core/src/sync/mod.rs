//! Multi-client synchronization through a shared folder.
//!
//! Clients share one JSON document guarded by an advisory lock file. Writes
//! are atomic renames; concurrent edits are detected by fingerprint and
//! surfaced as conflicts rather than merged.

pub mod coordinator;
pub mod fingerprint;
pub mod lock;
pub mod session;
pub mod store;
pub mod watcher;

#[cfg(test)]
mod tests;

pub use coordinator::{ChangeCheck, InitOutcome, SaveOutcome, SyncCoordinator};
pub use fingerprint::{canonical_json, fingerprint, Fingerprint};
pub use lock::{LockAcquisition, LockInfo, LockManager, LockOptions};
pub use session::{AutoSave, BackgroundSync, SessionEvent, SessionStatus, StartOutcome, SyncSession};
pub use store::DocumentStore;
pub use watcher::{ChangeEvent, ChangeWatcher, Subscription, WatchBackend, WatcherOptions};
