//! Advisory lock file shared by all clients.
//!
//! The marker's existence means "locked" and its content is the owner's
//! client id. Creation uses an exclusive create, but nothing here is atomic
//! across every network filesystem: the fingerprint check in the coordinator
//! covers the remaining window.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::time::{sleep, Instant};

use crate::models::ClientId;
use crate::util::normalize_text_option;
use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockOptions {
    /// Delay between attempts while the marker is held
    pub poll_interval: Duration,
    /// Marker age after which it is presumed abandoned
    pub stale_after: Duration,
}

impl Default for LockOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(50),
            stale_after: Duration::from_secs(5),
        }
    }
}

/// How the caller came to hold the lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockAcquisition {
    /// The marker was free
    Acquired,
    /// An abandoned or overdue marker was removed first
    Reclaimed { previous_owner: Option<String> },
}

/// Snapshot of an existing marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockInfo {
    pub owner: Option<String>,
    /// `None` when the filesystem reports no usable modification time
    pub age: Option<Duration>,
}

impl LockInfo {
    pub fn is_stale(&self, stale_after: Duration) -> bool {
        self.age.is_some_and(|age| age >= stale_after)
    }
}

#[derive(Debug, Clone)]
pub struct LockManager {
    path: PathBuf,
    options: LockOptions,
}

impl LockManager {
    pub fn new(path: impl Into<PathBuf>, options: LockOptions) -> Self {
        Self {
            path: path.into(),
            options,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Wait up to `max_wait` for the marker, then take it regardless.
    ///
    /// Returns an error only for I/O failures other than contention, such as
    /// a missing shared directory.
    pub async fn acquire(&self, owner: &ClientId, max_wait: Duration) -> Result<LockAcquisition> {
        let started = Instant::now();
        let mut reclaimed_from: Option<Option<String>> = None;

        loop {
            if self.try_create(owner).await? {
                tracing::debug!(
                    "Lock {} acquired by {} after {:?}",
                    self.path.display(),
                    owner,
                    started.elapsed()
                );
                return Ok(reclaimed_from.map_or(LockAcquisition::Acquired, |previous_owner| {
                    LockAcquisition::Reclaimed { previous_owner }
                }));
            }

            if let Some(info) = self.inspect().await? {
                if info.is_stale(self.options.stale_after) {
                    tracing::warn!(
                        "Removing stale lock {} held by {} (age {:?})",
                        self.path.display(),
                        info.owner.as_deref().unwrap_or("unknown"),
                        info.age.unwrap_or_default()
                    );
                    self.remove_marker().await?;
                    reclaimed_from = Some(info.owner);
                    continue;
                }

                if started.elapsed() >= max_wait {
                    tracing::warn!(
                        "Lock {} still held by {} after {:?}; reclaiming",
                        self.path.display(),
                        info.owner.as_deref().unwrap_or("unknown"),
                        max_wait
                    );
                    self.remove_marker().await?;
                    fs::write(&self.path, owner.as_str()).await?;
                    return Ok(LockAcquisition::Reclaimed {
                        previous_owner: info.owner,
                    });
                }
            }

            let remaining = max_wait.saturating_sub(started.elapsed());
            sleep(self.options.poll_interval.min(remaining.max(Duration::from_millis(1)))).await;
        }
    }

    /// Remove the marker if it is ours. Missing markers are not an error.
    ///
    /// A marker now owned by someone else means it was reclaimed from us; it
    /// is left in place.
    pub async fn release(&self, owner: &ClientId) -> Result<()> {
        let content = match fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(error) if error.kind() == ErrorKind::NotFound => return Ok(()),
            Err(error) => return Err(error.into()),
        };

        if let Some(current) = normalize_text_option(Some(content)) {
            if current != owner.as_str() {
                tracing::warn!(
                    "Lock {} is held by {}, not {}; leaving it in place",
                    self.path.display(),
                    current,
                    owner
                );
                return Ok(());
            }
        }

        self.remove_marker().await?;
        tracing::debug!("Lock {} released by {}", self.path.display(), owner);
        Ok(())
    }

    /// Remove the marker whoever holds it. Returns whether one existed.
    pub async fn force_release(&self) -> Result<bool> {
        let removed = self.remove_marker().await?;
        if removed {
            tracing::warn!("Lock {} force-released", self.path.display());
        }
        Ok(removed)
    }

    pub async fn inspect(&self) -> Result<Option<LockInfo>> {
        let metadata = match fs::metadata(&self.path).await {
            Ok(metadata) => metadata,
            Err(error) if error.kind() == ErrorKind::NotFound => return Ok(None),
            Err(error) => return Err(error.into()),
        };
        let age = metadata
            .modified()
            .ok()
            .and_then(|modified| SystemTime::now().duration_since(modified).ok());

        let owner = match fs::read_to_string(&self.path).await {
            Ok(content) => normalize_text_option(Some(content)),
            Err(error) if error.kind() == ErrorKind::NotFound => return Ok(None),
            Err(error) => return Err(error.into()),
        };

        Ok(Some(LockInfo { owner, age }))
    }

    async fn try_create(&self, owner: &ClientId) -> Result<bool> {
        let mut file = match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.path)
            .await
        {
            Ok(file) => file,
            Err(error) if error.kind() == ErrorKind::AlreadyExists => return Ok(false),
            Err(error) => return Err(error.into()),
        };

        let written = async {
            file.write_all(owner.as_str().as_bytes()).await?;
            file.sync_all().await
        }
        .await;

        if let Err(error) = written {
            drop(file);
            let _ = fs::remove_file(&self.path).await;
            return Err(error.into());
        }
        Ok(true)
    }

    async fn remove_marker(&self) -> Result<bool> {
        match fs::remove_file(&self.path).await {
            Ok(()) => Ok(true),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(false),
            Err(error) => Err(error.into()),
        }
    }
}
