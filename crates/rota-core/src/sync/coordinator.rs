//! Save/load/check orchestration over the lock and document store.

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tokio::time::sleep;

use crate::config::SyncConfig;
use crate::models::{ClientId, ClientSyncState, Payload, SyncConflict, SyncDocument};
use crate::state::ConnectionStatus;
use crate::sync::fingerprint::Fingerprint;
use crate::sync::lock::{LockAcquisition, LockManager, LockOptions};
use crate::sync::store::DocumentStore;
use crate::{Error, Result};

/// Result of [`SyncCoordinator::initialize`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitOutcome {
    pub client_id: ClientId,
    /// Whether this call created the shared document
    pub created: bool,
    pub version: u64,
}

/// Result of an accepted or rejected save.
#[derive(Debug, Clone, PartialEq)]
pub enum SaveOutcome {
    Saved {
        version: u64,
        fingerprint: Fingerprint,
    },
    /// Another client wrote first; nothing was written
    Conflict(SyncConflict),
}

impl SaveOutcome {
    pub const fn is_saved(&self) -> bool {
        matches!(self, Self::Saved { .. })
    }
}

/// Result of [`SyncCoordinator::check_for_changes`].
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeCheck {
    Unchanged,
    Changed {
        payload: Payload,
        version: u64,
        modified_by: String,
        last_modified: DateTime<Utc>,
    },
}

impl ChangeCheck {
    pub const fn has_changes(&self) -> bool {
        matches!(self, Self::Changed { .. })
    }
}

/// Mediates every access to the shared document for one client process.
///
/// Construct once per process and share it by `Arc`. Saves issued
/// concurrently from one process run one after another behind the save gate;
/// the client state mutex is only held for short reads and updates, so status
/// queries never wait on the lock file.
pub struct SyncCoordinator {
    config: SyncConfig,
    client_id: ClientId,
    store: DocumentStore,
    lock: LockManager,
    save_gate: Mutex<()>,
    state: Mutex<ClientSyncState>,
}

impl SyncCoordinator {
    pub fn new(config: SyncConfig, client_id: ClientId) -> Result<Self> {
        config.validate()?;
        let store = DocumentStore::new(config.document_path());
        let lock = LockManager::new(
            config.lock_path(),
            LockOptions {
                poll_interval: config.lock_poll_interval(),
                stale_after: config.lock_stale_after(),
            },
        );
        Ok(Self {
            save_gate: Mutex::new(()),
            state: Mutex::new(ClientSyncState::new(client_id.clone())),
            config,
            client_id,
            store,
            lock,
        })
    }

    pub const fn client_id(&self) -> &ClientId {
        &self.client_id
    }

    pub const fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub const fn lock_manager(&self) -> &LockManager {
        &self.lock
    }

    /// Create the shared document if it does not exist yet.
    ///
    /// Safe to call from every client at startup; only one caller creates it.
    pub async fn initialize(&self) -> Result<InitOutcome> {
        let mut state = self.state.lock().await;
        let result = self.initialize_locked(&mut state).await;
        track_connection(&mut state, &result);
        result
    }

    async fn initialize_locked(&self, state: &mut ClientSyncState) -> Result<InitOutcome> {
        let initial = SyncDocument::initial(&self.client_id);
        if self.store.create_if_absent(&initial).await? {
            tracing::info!(
                "Created shared document {} as {}",
                self.store.path().display(),
                self.client_id
            );
            state.last_known_fingerprint = Some(initial.fingerprint);
            return Ok(InitOutcome {
                client_id: self.client_id.clone(),
                created: true,
                version: initial.version,
            });
        }

        let existing = self.read_required().await?;
        tracing::debug!(
            "Shared document {} already exists at version {}",
            self.store.path().display(),
            existing.version
        );
        Ok(InitOutcome {
            client_id: self.client_id.clone(),
            created: false,
            version: existing.version,
        })
    }

    /// Write `payload` as the next document version unless another client
    /// changed the document since this client last saw it.
    ///
    /// I/O failures are retried with linear backoff; conflicts are returned
    /// immediately and never retried.
    pub async fn save(&self, payload: Payload) -> Result<SaveOutcome> {
        let _gate = self.save_gate.lock().await;
        // The view the payload was edited from; later checks must not move it.
        let base = self.state.lock().await.last_known_fingerprint.clone();
        let attempts = self.config.save_attempts;
        let mut attempt = 1;

        loop {
            match self.save_attempt(base.as_ref(), &payload).await {
                Ok(outcome) => {
                    let mut state = self.state.lock().await;
                    state.connection = ConnectionStatus::Connected;
                    match &outcome {
                        SaveOutcome::Saved { fingerprint, .. } => {
                            state.last_known_fingerprint = Some(fingerprint.clone());
                            state.conflict = None;
                        }
                        SaveOutcome::Conflict(conflict) => {
                            state.conflict = Some(conflict.clone());
                        }
                    }
                    return Ok(outcome);
                }
                Err(error) if error.is_retryable() && attempt < attempts => {
                    let backoff = self.config.retry_backoff(attempt);
                    tracing::warn!(
                        "Save attempt {}/{} failed: {}; retrying in {:?}",
                        attempt,
                        attempts,
                        error,
                        backoff
                    );
                    sleep(backoff).await;
                    attempt += 1;
                }
                Err(error) => {
                    tracing::error!("Save failed after {} attempt(s): {}", attempt, error);
                    self.state.lock().await.connection = ConnectionStatus::Disconnected;
                    return Err(Error::SaveFailed {
                        attempts: attempt,
                        source: Box::new(error),
                    });
                }
            }
        }
    }

    async fn save_attempt(
        &self,
        base: Option<&Fingerprint>,
        payload: &Payload,
    ) -> Result<SaveOutcome> {
        let acquisition = self
            .lock
            .acquire(&self.client_id, self.config.lock_wait())
            .await?;
        if let LockAcquisition::Reclaimed { previous_owner } = &acquisition {
            tracing::info!(
                "Reclaimed lock from {}",
                previous_owner.as_deref().unwrap_or("unknown owner")
            );
        }

        let result = self.write_locked(base, payload).await;

        if let Err(error) = self.lock.release(&self.client_id).await {
            tracing::warn!("Failed to release lock {}: {}", self.lock.path().display(), error);
        }
        result
    }

    async fn write_locked(
        &self,
        base: Option<&Fingerprint>,
        payload: &Payload,
    ) -> Result<SaveOutcome> {
        let current = self.read_required().await?;

        if base != Some(&current.fingerprint) && !current.is_modified_by(&self.client_id) {
            tracing::info!(
                "Save rejected: version {} by {} is newer than this client's view",
                current.version,
                current.modified_by
            );
            return Ok(SaveOutcome::Conflict(SyncConflict::new(
                payload.clone(),
                &current,
            )));
        }

        let next = current.next(payload.clone(), &self.client_id);
        self.store.write(&next).await?;
        tracing::info!(
            "Saved shared document version {} ({})",
            next.version,
            next.fingerprint
        );

        Ok(SaveOutcome::Saved {
            version: next.version,
            fingerprint: next.fingerprint,
        })
    }

    /// Read the shared payload and remember it as this client's view.
    pub async fn load(&self) -> Result<Payload> {
        Ok(self.load_document().await?.payload)
    }

    /// Like [`Self::load`], keeping the version metadata.
    pub async fn load_document(&self) -> Result<SyncDocument> {
        let mut state = self.state.lock().await;
        let result = self.read_required().await;
        track_connection(&mut state, &result);
        if let Ok(document) = &result {
            state.last_known_fingerprint = Some(document.fingerprint.clone());
        }
        result
    }

    /// Report whether another client wrote since this client last looked.
    ///
    /// Never writes the document. A changed result updates this client's view,
    /// so an immediate second call reports `Unchanged`.
    pub async fn check_for_changes(&self) -> Result<ChangeCheck> {
        let mut state = self.state.lock().await;
        let document = match self.store.read().await {
            Ok(Some(document)) => document,
            Ok(None) => return Ok(ChangeCheck::Unchanged),
            Err(error) => {
                state.connection = ConnectionStatus::Disconnected;
                return Err(error);
            }
        };
        state.connection = ConnectionStatus::Connected;

        if !state.is_stale(&document.fingerprint) || document.is_modified_by(&self.client_id) {
            return Ok(ChangeCheck::Unchanged);
        }

        tracing::debug!(
            "Shared document changed: version {} by {}",
            document.version,
            document.modified_by
        );
        state.last_known_fingerprint = Some(document.fingerprint);
        Ok(ChangeCheck::Changed {
            payload: document.payload,
            version: document.version,
            modified_by: document.modified_by,
            last_modified: document.last_modified,
        })
    }

    /// Treat `fingerprint` as the state this client has seen.
    pub async fn acknowledge_remote(&self, fingerprint: Fingerprint) {
        let mut state = self.state.lock().await;
        state.last_known_fingerprint = Some(fingerprint);
    }

    pub async fn pending_conflict(&self) -> Option<SyncConflict> {
        self.state.lock().await.conflict.clone()
    }

    /// Snapshot of this client's sync state.
    pub async fn status(&self) -> ClientSyncState {
        self.state.lock().await.clone()
    }

    async fn read_required(&self) -> Result<SyncDocument> {
        self.store
            .read()
            .await?
            .ok_or_else(|| Error::NotInitialized(self.store.path().to_path_buf()))
    }
}

fn track_connection<T>(state: &mut ClientSyncState, result: &Result<T>) {
    state.connection = if result.is_ok() {
        ConnectionStatus::Connected
    } else {
        ConnectionStatus::Disconnected
    };
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::sync::fingerprint::fingerprint;

    fn fast_config(dir: &std::path::Path) -> SyncConfig {
        let mut config = SyncConfig::for_dir(dir);
        config.lock_wait_ms = 300;
        config.lock_poll_interval_ms = 10;
        config.retry_backoff_ms = 10;
        config
    }

    fn coordinator(dir: &std::path::Path, name: &str) -> SyncCoordinator {
        SyncCoordinator::new(fast_config(dir), name.parse().unwrap()).unwrap()
    }

    #[tokio::test]
    async fn initialize_creates_version_one() {
        let dir = tempfile::tempdir().unwrap();
        let client = coordinator(dir.path(), "desk-1");

        let outcome = client.initialize().await.unwrap();
        assert!(outcome.created);
        assert_eq!(outcome.version, 1);

        let status = client.status().await;
        assert_eq!(status.connection, ConnectionStatus::Connected);
        assert_eq!(
            status.last_known_fingerprint,
            Some(fingerprint(&json!([])))
        );
    }

    #[tokio::test]
    async fn second_initialize_is_a_noop() {
        let dir = tempfile::tempdir().unwrap();
        let first = coordinator(dir.path(), "desk-1");
        let second = coordinator(dir.path(), "desk-2");

        first.initialize().await.unwrap();
        first.save(json!([{"week": 1}])).await.unwrap();
        let outcome = second.initialize().await.unwrap();

        assert!(!outcome.created);
        assert_eq!(outcome.version, 2);
        assert_eq!(second.load().await.unwrap(), json!([{"week": 1}]));
    }

    #[tokio::test]
    async fn save_increments_version_and_releases_lock() {
        let dir = tempfile::tempdir().unwrap();
        let client = coordinator(dir.path(), "desk-1");
        client.initialize().await.unwrap();

        let outcome = client.save(json!([{"week": 1}])).await.unwrap();
        assert_eq!(
            outcome,
            SaveOutcome::Saved {
                version: 2,
                fingerprint: fingerprint(&json!([{"week": 1}])),
            }
        );
        assert!(!client.config().lock_path().exists());

        let document = client.load_document().await.unwrap();
        assert_eq!(document.version, 2);
        assert_eq!(document.modified_by, "desk-1");
    }

    #[tokio::test]
    async fn save_before_initialize_fails_without_retrying() {
        let dir = tempfile::tempdir().unwrap();
        let client = coordinator(dir.path(), "desk-1");

        let error = client.save(json!([])).await.unwrap_err();
        match error {
            Error::SaveFailed { attempts, source } => {
                assert_eq!(attempts, 1);
                assert!(matches!(*source, Error::NotInitialized(_)));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(!dir.path().join("rota-sync.lock").exists());
        assert_eq!(
            client.status().await.connection,
            ConnectionStatus::Disconnected
        );
    }

    #[tokio::test]
    async fn save_into_missing_share_exhausts_retries() {
        let dir = tempfile::tempdir().unwrap();
        let client = coordinator(&dir.path().join("unmounted"), "desk-1");

        let error = client.save(json!([])).await.unwrap_err();
        match error {
            Error::SaveFailed { attempts, source } => {
                assert_eq!(attempts, 3);
                assert!(matches!(*source, Error::Io(_)));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn load_of_corrupted_document_fails() {
        let dir = tempfile::tempdir().unwrap();
        let client = coordinator(dir.path(), "desk-1");
        std::fs::write(dir.path().join("rota-sync.json"), "[1, 2").unwrap();

        let error = client.load().await.unwrap_err();
        assert!(matches!(error, Error::CorruptDocument { .. }));
    }

    #[tokio::test]
    async fn check_for_changes_on_missing_document_is_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let client = coordinator(dir.path(), "desk-1");
        assert_eq!(
            client.check_for_changes().await.unwrap(),
            ChangeCheck::Unchanged
        );
    }

    #[tokio::test]
    async fn concurrent_saves_in_one_process_are_serialized() {
        let dir = tempfile::tempdir().unwrap();
        let client = Arc::new(coordinator(dir.path(), "desk-1"));
        client.initialize().await.unwrap();

        let mut handles = Vec::new();
        for week in 0..5 {
            let client = Arc::clone(&client);
            handles.push(tokio::spawn(async move {
                client.save(json!([{ "week": week }])).await.unwrap()
            }));
        }

        let mut versions = Vec::new();
        for handle in handles {
            match handle.await.unwrap() {
                SaveOutcome::Saved { version, .. } => versions.push(version),
                SaveOutcome::Conflict(conflict) => panic!("own writes conflicted: {conflict:?}"),
            }
        }
        versions.sort_unstable();
        assert_eq!(versions, vec![2, 3, 4, 5, 6]);
    }

    #[tokio::test]
    async fn status_stays_responsive_while_save_waits_for_lock() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = fast_config(dir.path());
        config.lock_wait_ms = 1_000;
        config.lock_stale_ms = 60_000;
        let client = Arc::new(SyncCoordinator::new(config, "desk-1".parse().unwrap()).unwrap());
        client.initialize().await.unwrap();
        std::fs::write(dir.path().join("rota-sync.lock"), "desk-2").unwrap();

        let saving = {
            let client = Arc::clone(&client);
            tokio::spawn(async move { client.save(json!(["late"])).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        let started = std::time::Instant::now();
        let status = tokio::time::timeout(Duration::from_millis(200), client.status())
            .await
            .expect("status must not wait for the pending save");
        assert_eq!(status.connection, ConnectionStatus::Connected);
        assert!(tokio::time::timeout(Duration::from_millis(200), client.pending_conflict())
            .await
            .unwrap()
            .is_none());
        assert!(tokio::time::timeout(Duration::from_millis(200), client.check_for_changes())
            .await
            .is_ok());
        assert!(started.elapsed() < Duration::from_millis(600));
        assert!(!saving.is_finished());

        assert!(saving.await.unwrap().unwrap().is_saved());
    }

    #[tokio::test]
    async fn save_compares_against_view_at_call_time() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = fast_config(dir.path());
        config.lock_wait_ms = 500;
        config.lock_stale_ms = 60_000;
        let first = coordinator(dir.path(), "desk-1");
        let second = Arc::new(SyncCoordinator::new(config, "desk-2".parse().unwrap()).unwrap());
        first.initialize().await.unwrap();
        second.load().await.unwrap();

        std::fs::write(dir.path().join("rota-sync.lock"), "desk-3").unwrap();
        let saving = {
            let second = Arc::clone(&second);
            tokio::spawn(async move { second.save(json!(["from-2"])).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        // A remote write lands and a background check adopts it mid-save.
        let remote = SyncDocument::initial(&"desk-1".parse().unwrap())
            .next(json!(["from-1"]), &"desk-1".parse().unwrap());
        DocumentStore::new(dir.path().join("rota-sync.json"))
            .write(&remote)
            .await
            .unwrap();
        assert!(second.check_for_changes().await.unwrap().has_changes());

        match saving.await.unwrap().unwrap() {
            SaveOutcome::Conflict(conflict) => assert_eq!(conflict.remote, json!(["from-1"])),
            SaveOutcome::Saved { .. } => panic!("save edited from version 1 must conflict"),
        }
    }

    #[tokio::test]
    async fn acknowledge_remote_clears_staleness() {
        let dir = tempfile::tempdir().unwrap();
        let first = coordinator(dir.path(), "desk-1");
        let second = coordinator(dir.path(), "desk-2");
        first.initialize().await.unwrap();
        first.save(json!(["a"])).await.unwrap();

        let conflict = match second.save(json!(["b"])).await.unwrap() {
            SaveOutcome::Conflict(conflict) => conflict,
            SaveOutcome::Saved { .. } => panic!("unseen remote write must conflict"),
        };
        assert!(second.pending_conflict().await.is_some());

        second
            .acknowledge_remote(conflict.remote_fingerprint.clone())
            .await;
        let outcome = second.save(json!(["b"])).await.unwrap();
        assert!(outcome.is_saved());
        assert!(second.pending_conflict().await.is_none());

        assert!(first.check_for_changes().await.unwrap().has_changes());
    }
}
