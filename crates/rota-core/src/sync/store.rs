//! Durable shared document with atomic replacement.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tokio::fs;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::models::SyncDocument;
use crate::sync::fingerprint::fingerprint;
use crate::{Error, Result};

/// Reads and writes the shared document file.
///
/// Every write goes through a sibling temp file that is flushed, synced and
/// then renamed (or hard-linked) into place, so readers see either the old or
/// the new document, never a partial one.
#[derive(Debug, Clone)]
pub struct DocumentStore {
    path: PathBuf,
}

impl DocumentStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn exists(&self) -> Result<bool> {
        Ok(fs::try_exists(&self.path).await?)
    }

    /// Read the current document; `None` when it has not been created.
    pub async fn read(&self) -> Result<Option<SyncDocument>> {
        let raw = match fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(error) if error.kind() == ErrorKind::NotFound => return Ok(None),
            Err(error) => return Err(error.into()),
        };

        let mut document: SyncDocument =
            serde_json::from_slice(&raw).map_err(|source| Error::CorruptDocument {
                path: self.path.clone(),
                source,
            })?;

        if !document.has_consistent_fingerprint() {
            let recomputed = fingerprint(&document.payload);
            tracing::warn!(
                "Shared document {} has hash {} but content hashes to {}; it was edited outside rota",
                self.path.display(),
                document.fingerprint,
                recomputed
            );
            document.fingerprint = recomputed;
        }

        Ok(Some(document))
    }

    /// Atomically replace the document.
    pub async fn write(&self, document: &SyncDocument) -> Result<()> {
        let temp_path = self.write_temp(document).await?;
        if let Err(error) = fs::rename(&temp_path, &self.path).await {
            remove_temp(&temp_path).await;
            return Err(error.into());
        }
        tracing::debug!(
            "Wrote shared document {} (version {})",
            self.path.display(),
            document.version
        );
        Ok(())
    }

    /// Write the document only if none exists yet.
    ///
    /// Returns `true` when this call created it. Concurrent callers race on a
    /// hard link, which fails for all but one of them; filesystems without
    /// hard links fall back to check-then-rename.
    pub async fn create_if_absent(&self, document: &SyncDocument) -> Result<bool> {
        let temp_path = self.write_temp(document).await?;

        let outcome = match fs::hard_link(&temp_path, &self.path).await {
            Ok(()) => Ok(true),
            Err(error) if error.kind() == ErrorKind::AlreadyExists => Ok(false),
            Err(error) => {
                tracing::debug!(
                    "Hard link into {} failed ({}); falling back to rename",
                    self.path.display(),
                    error
                );
                self.rename_if_absent(&temp_path).await
            }
        };

        remove_temp(&temp_path).await;
        outcome
    }

    async fn rename_if_absent(&self, temp_path: &Path) -> Result<bool> {
        if self.exists().await? {
            return Ok(false);
        }
        fs::rename(temp_path, &self.path).await?;
        Ok(true)
    }

    async fn write_temp(&self, document: &SyncDocument) -> Result<PathBuf> {
        let bytes = serde_json::to_vec_pretty(document)?;
        let temp_path = self.temp_path();

        let written = async {
            let mut file = fs::File::create(&temp_path).await?;
            file.write_all(&bytes).await?;
            file.flush().await?;
            file.sync_all().await
        }
        .await;

        if let Err(error) = written {
            remove_temp(&temp_path).await;
            return Err(error.into());
        }
        Ok(temp_path)
    }

    fn temp_path(&self) -> PathBuf {
        let name = self.path.file_name().map_or_else(
            || "document".to_string(),
            |name| name.to_string_lossy().into_owned(),
        );
        self.path
            .with_file_name(format!(".{name}.{}.tmp", Uuid::now_v7().simple()))
    }
}

async fn remove_temp(path: &Path) {
    match fs::remove_file(path).await {
        Ok(()) => {}
        Err(error) if error.kind() == ErrorKind::NotFound => {}
        Err(error) => tracing::warn!("Failed to remove temp file {}: {}", path.display(), error),
    }
}
