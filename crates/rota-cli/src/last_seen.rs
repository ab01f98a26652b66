//! Fingerprints this desk has seen, kept between CLI runs.
//!
//! Each run is a fresh process, so the coordinator's in-memory view is
//! rebuilt from here. A save without `--base` is checked against the last
//! document `rota show` or `rota save` reported, never against whatever is on
//! disk at save time.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use rota_core::Fingerprint;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct LastSeen {
    /// Document path to the fingerprint last seen there
    #[serde(default)]
    pub documents: BTreeMap<String, Fingerprint>,
}

/// Sibling of the config file: `sync-config.json` keeps `sync-config.seen.json`.
pub fn last_seen_path(config_path: &Path) -> PathBuf {
    config_path.with_extension("seen.json")
}

fn document_key(document_path: &Path) -> String {
    document_path.display().to_string()
}

impl LastSeen {
    pub fn load_from_path(path: &Path) -> Result<Self, String> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path).map_err(|error| {
            format!("Failed to read last-seen state at {}: {}", path.display(), error)
        })?;
        serde_json::from_str::<Self>(&raw).map_err(|error| {
            format!("Failed to parse last-seen state at {}: {}", path.display(), error)
        })
    }

    pub fn save_to_path(&self, path: &Path) -> Result<(), String> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|error| {
                format!(
                    "Failed to create state directory {}: {}",
                    parent.display(),
                    error
                )
            })?;
        }

        let serialized = serde_json::to_string_pretty(self)
            .map_err(|error| format!("Failed to serialize last-seen state: {error}"))?;
        std::fs::write(path, serialized).map_err(|error| {
            format!("Failed to write last-seen state at {}: {}", path.display(), error)
        })
    }

    pub fn get(&self, document_path: &Path) -> Option<&Fingerprint> {
        self.documents.get(&document_key(document_path))
    }

    pub fn record(&mut self, document_path: &Path, fingerprint: Fingerprint) {
        self.documents
            .insert(document_key(document_path), fingerprint);
    }
}
