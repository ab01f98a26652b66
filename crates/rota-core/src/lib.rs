//! rota-core - Core library for Rota
//!
//! This crate contains the shared document model, lock and store primitives,
//! and the sync coordinator used by every Rota client (CLI, desktop shells)
//! editing one schedule through a shared folder.

pub mod config;
pub mod error;
pub mod models;
pub mod state;
pub mod sync;
pub mod util;

pub use config::{SyncConfig, WatchMode};
pub use error::{Error, Result};
pub use models::{ClientId, Payload, SyncConflict, SyncDocument};
pub use state::{ConnectionStatus, SyncIndicator};
pub use sync::{Fingerprint, SyncCoordinator, SyncSession};
