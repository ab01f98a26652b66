//! Sync configuration shared by every client.
//!
//! All clients pointing at the same `shared_dir` must agree on the file names;
//! the timing values are per-client and may differ.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::util::millis;
use crate::{Error, Result};

pub const DEFAULT_DOCUMENT_FILE: &str = "rota-sync.json";
pub const DEFAULT_LOCK_FILE: &str = "rota-sync.lock";

/// How the change watcher observes the shared folder.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WatchMode {
    /// Platform notifications, falling back to polling when unavailable
    #[default]
    Native,
    /// Metadata polling only
    Polling,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SyncConfig {
    /// Folder visible to every client (local disk or network share)
    #[serde(default = "default_shared_dir")]
    pub shared_dir: PathBuf,
    #[serde(default = "default_document_file")]
    pub document_file: String,
    #[serde(default = "default_lock_file")]
    pub lock_file: String,
    /// Wait before reclaiming a held lock
    #[serde(default = "default_lock_wait_ms")]
    pub lock_wait_ms: u64,
    /// Age after which a lock marker is presumed abandoned
    #[serde(default = "default_lock_stale_ms")]
    pub lock_stale_ms: u64,
    #[serde(default = "default_lock_poll_interval_ms")]
    pub lock_poll_interval_ms: u64,
    #[serde(default = "default_save_attempts")]
    pub save_attempts: u32,
    /// Linear backoff step between save attempts
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    /// Periodic change check interval
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_watch_debounce_ms")]
    pub watch_debounce_ms: u64,
    #[serde(default)]
    pub watch_mode: WatchMode,
}

fn default_shared_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_document_file() -> String {
    DEFAULT_DOCUMENT_FILE.to_string()
}

fn default_lock_file() -> String {
    DEFAULT_LOCK_FILE.to_string()
}

const fn default_lock_wait_ms() -> u64 {
    5_000
}

const fn default_lock_stale_ms() -> u64 {
    5_000
}

const fn default_lock_poll_interval_ms() -> u64 {
    50
}

const fn default_save_attempts() -> u32 {
    3
}

const fn default_retry_backoff_ms() -> u64 {
    100
}

const fn default_poll_interval_ms() -> u64 {
    5_000
}

const fn default_watch_debounce_ms() -> u64 {
    250
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::for_dir(default_shared_dir())
    }
}

impl SyncConfig {
    /// Default configuration rooted at `shared_dir`.
    pub fn for_dir(shared_dir: impl Into<PathBuf>) -> Self {
        Self {
            shared_dir: shared_dir.into(),
            document_file: default_document_file(),
            lock_file: default_lock_file(),
            lock_wait_ms: default_lock_wait_ms(),
            lock_stale_ms: default_lock_stale_ms(),
            lock_poll_interval_ms: default_lock_poll_interval_ms(),
            save_attempts: default_save_attempts(),
            retry_backoff_ms: default_retry_backoff_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            watch_debounce_ms: default_watch_debounce_ms(),
            watch_mode: WatchMode::default(),
        }
    }

    pub fn document_path(&self) -> PathBuf {
        self.shared_dir.join(&self.document_file)
    }

    pub fn lock_path(&self) -> PathBuf {
        self.shared_dir.join(&self.lock_file)
    }

    pub const fn lock_wait(&self) -> Duration {
        millis(self.lock_wait_ms)
    }

    pub const fn lock_stale_after(&self) -> Duration {
        millis(self.lock_stale_ms)
    }

    pub const fn lock_poll_interval(&self) -> Duration {
        millis(self.lock_poll_interval_ms)
    }

    /// Delay before retry number `attempt` (1-based).
    pub fn retry_backoff(&self, attempt: u32) -> Duration {
        millis(self.retry_backoff_ms.saturating_mul(u64::from(attempt)))
    }

    pub const fn poll_interval(&self) -> Duration {
        millis(self.poll_interval_ms)
    }

    pub const fn watch_debounce(&self) -> Duration {
        millis(self.watch_debounce_ms)
    }

    pub fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("document_file", &self.document_file),
            ("lock_file", &self.lock_file),
        ] {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                return Err(Error::Config(format!("{field} must not be empty")));
            }
            if trimmed.contains(['/', '\\']) {
                return Err(Error::Config(format!(
                    "{field} must be a file name, not a path"
                )));
            }
        }
        if self.document_file == self.lock_file {
            return Err(Error::Config(
                "document_file and lock_file must differ".to_string(),
            ));
        }
        if self.save_attempts == 0 {
            return Err(Error::Config("save_attempts must be at least 1".to_string()));
        }
        if self.lock_poll_interval_ms == 0 || self.poll_interval_ms == 0 {
            return Err(Error::Config(
                "poll intervals must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
