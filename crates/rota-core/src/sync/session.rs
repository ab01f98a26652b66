//! Client-side view of synchronization for presentation layers.

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

use crate::models::{ClientId, Payload, SyncConflict};
use crate::state::{ConnectionStatus, SyncIndicator};
use crate::sync::coordinator::{ChangeCheck, SaveOutcome, SyncCoordinator};
use crate::sync::fingerprint::Fingerprint;
use crate::sync::watcher::{ChangeWatcher, Subscription};
use crate::{Error, Result};

const EVENT_CAPACITY: usize = 64;

/// Notifications for whoever renders sync status.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    RemoteChanged {
        payload: Payload,
        version: u64,
        modified_by: String,
    },
    Conflict(SyncConflict),
    Saved {
        version: u64,
    },
    StatusChanged(SyncIndicator),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStatus {
    pub client_id: ClientId,
    pub connection: ConnectionStatus,
    pub has_pending_conflict: bool,
    pub last_known_fingerprint: Option<Fingerprint>,
}

impl SessionStatus {
    pub const fn indicator(&self) -> SyncIndicator {
        SyncIndicator::from_parts(self.connection, self.has_pending_conflict)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StartOutcome {
    pub client_id: ClientId,
    pub created: bool,
    pub payload: Payload,
}

/// Result of [`SyncSession::auto_save`].
#[derive(Debug, Clone, PartialEq)]
pub enum AutoSave {
    Completed(SaveOutcome),
    /// Nothing was written; a conflict must be resolved first
    BlockedByConflict,
}

pub struct SyncSession {
    coordinator: Arc<SyncCoordinator>,
    events: broadcast::Sender<SessionEvent>,
}

impl SyncSession {
    pub fn new(coordinator: Arc<SyncCoordinator>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            coordinator,
            events,
        }
    }

    pub const fn coordinator(&self) -> &Arc<SyncCoordinator> {
        &self.coordinator
    }

    pub fn events(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Initialize the shared document and load it.
    pub async fn start(&self) -> Result<StartOutcome> {
        let before = self.indicator().await;
        let result = async {
            let init = self.coordinator.initialize().await?;
            let payload = self.coordinator.load().await?;
            Ok::<_, Error>(StartOutcome {
                client_id: init.client_id,
                created: init.created,
                payload,
            })
        }
        .await;
        self.publish_status(before).await;
        result
    }

    pub async fn status(&self) -> SessionStatus {
        let state = self.coordinator.status().await;
        SessionStatus {
            client_id: state.client_id,
            connection: state.connection,
            has_pending_conflict: state.conflict.is_some(),
            last_known_fingerprint: state.last_known_fingerprint,
        }
    }

    pub async fn pending_conflict(&self) -> Option<SyncConflict> {
        self.coordinator.pending_conflict().await
    }

    /// Save regardless of pending conflicts.
    pub async fn save(&self, payload: Payload) -> Result<SaveOutcome> {
        let before = self.indicator().await;
        let result = self.coordinator.save(payload).await;
        if let Ok(outcome) = &result {
            self.publish_outcome(outcome);
        }
        self.publish_status(before).await;
        result
    }

    /// Save unless a conflict is waiting for a decision.
    pub async fn auto_save(&self, payload: Payload) -> Result<AutoSave> {
        if self.coordinator.pending_conflict().await.is_some() {
            tracing::debug!("Auto-save skipped while a conflict is pending");
            return Ok(AutoSave::BlockedByConflict);
        }
        self.save(payload).await.map(AutoSave::Completed)
    }

    /// Keep one side of the pending conflict and save it.
    ///
    /// The save may itself conflict if yet another client wrote meanwhile;
    /// that conflict becomes the new pending one.
    pub async fn resolve_conflict(&self, prefer_local: bool) -> Result<SaveOutcome> {
        let conflict = self
            .coordinator
            .pending_conflict()
            .await
            .ok_or(Error::NoPendingConflict)?;

        tracing::info!(
            "Resolving conflict with version {} by keeping {} changes",
            conflict.remote_version,
            if prefer_local { "local" } else { "remote" }
        );
        self.coordinator
            .acknowledge_remote(conflict.remote_fingerprint.clone())
            .await;
        self.save(conflict.chosen(prefer_local).clone()).await
    }

    /// Manual "sync now": always a fresh load.
    pub async fn sync_now(&self) -> Result<Payload> {
        let before = self.indicator().await;
        let result = self.coordinator.load().await;
        self.publish_status(before).await;
        result
    }

    pub async fn check_for_changes(&self) -> Result<ChangeCheck> {
        let before = self.indicator().await;
        let result = self.coordinator.check_for_changes().await;
        if let Ok(ChangeCheck::Changed {
            payload,
            version,
            modified_by,
            ..
        }) = &result
        {
            self.publish(SessionEvent::RemoteChanged {
                payload: payload.clone(),
                version: *version,
                modified_by: modified_by.clone(),
            });
        }
        self.publish_status(before).await;
        result
    }

    /// Run change checks every poll interval and on watcher notifications.
    ///
    /// Both triggers go through [`Self::check_for_changes`]. The returned
    /// handle stops the loop when dropped.
    pub fn spawn_background(self: &Arc<Self>, watcher: Option<&ChangeWatcher>) -> BackgroundSync {
        let (trigger_tx, mut trigger_rx) = mpsc::channel::<()>(1);
        let subscription = watcher.map(|watcher| {
            let trigger_tx = trigger_tx.clone();
            watcher.subscribe(move |_| {
                // A full channel already has a check queued.
                let _ = trigger_tx.try_send(());
            })
        });

        let session = Arc::clone(self);
        let poll_interval = self.coordinator.config().poll_interval();
        let task = tokio::spawn(async move {
            let _keep_open = trigger_tx;
            let mut ticker = interval(poll_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = trigger_rx.recv() => {}
                }
                if let Err(error) = session.check_for_changes().await {
                    tracing::warn!("Background change check failed: {}", error);
                }
            }
        });

        BackgroundSync {
            task,
            _subscription: subscription,
        }
    }

    async fn indicator(&self) -> SyncIndicator {
        self.coordinator.status().await.indicator()
    }

    async fn publish_status(&self, before: SyncIndicator) {
        let after = self.indicator().await;
        if after != before {
            self.publish(SessionEvent::StatusChanged(after));
        }
    }

    fn publish_outcome(&self, outcome: &SaveOutcome) {
        match outcome {
            SaveOutcome::Saved { version, .. } => {
                self.publish(SessionEvent::Saved { version: *version });
            }
            SaveOutcome::Conflict(conflict) => {
                self.publish(SessionEvent::Conflict(conflict.clone()));
            }
        }
    }

    fn publish(&self, event: SessionEvent) {
        // No receivers is fine: nobody is rendering status.
        let _ = self.events.send(event);
    }
}

/// Handle for the background check loop.
pub struct BackgroundSync {
    task: JoinHandle<()>,
    _subscription: Option<Subscription>,
}

impl BackgroundSync {
    pub fn stop(self) {
        drop(self);
    }
}

impl Drop for BackgroundSync {
    fn drop(&mut self) {
        self.task.abort();
    }
}
