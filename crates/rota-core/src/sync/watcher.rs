//! Push notifications for changes to the shared document.
//!
//! Best effort only: a watcher that never fires costs latency, not
//! correctness, because sessions also poll.

use std::collections::HashMap;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::{Duration, SystemTime};

use chrono::{DateTime, Utc};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, MissedTickBehavior};

use crate::config::{SyncConfig, WatchMode};
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatcherOptions {
    /// Window in which bursts of events collapse into one notification
    pub debounce: Duration,
    /// Metadata check interval for the polling backend
    pub poll_interval: Duration,
    pub mode: WatchMode,
}

impl WatcherOptions {
    pub fn from_config(config: &SyncConfig) -> Self {
        Self {
            debounce: config.watch_debounce(),
            poll_interval: config.poll_interval(),
            mode: config.watch_mode,
        }
    }
}

impl Default for WatcherOptions {
    fn default() -> Self {
        Self::from_config(&SyncConfig::default())
    }
}

/// Mechanism actually in use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchBackend {
    Native,
    Polling,
}

/// The shared document was touched by someone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub path: PathBuf,
    pub observed_at: DateTime<Utc>,
}

type Callback = Arc<dyn Fn(&ChangeEvent) + Send + Sync>;

#[derive(Default)]
struct Registry {
    next_id: AtomicU64,
    callbacks: Mutex<HashMap<u64, Callback>>,
}

impl Registry {
    fn insert(&self, callback: Callback) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.callbacks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, callback);
        id
    }

    fn remove(&self, id: u64) {
        self.callbacks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
    }

    fn len(&self) -> usize {
        self.callbacks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn notify(&self, event: &ChangeEvent) {
        // Callbacks run outside the lock so they may unsubscribe.
        let callbacks = self
            .callbacks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect::<Vec<_>>();
        for callback in callbacks {
            callback(event);
        }
    }
}

/// Registration handle; dropping it unsubscribes.
pub struct Subscription {
    id: u64,
    registry: Weak<Registry>,
}

impl Subscription {
    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(self.id);
        }
    }
}

/// Watches one document path and fans change events out to subscribers.
pub struct ChangeWatcher {
    path: PathBuf,
    backend: WatchBackend,
    registry: Arc<Registry>,
    _native: Option<RecommendedWatcher>,
    tasks: Vec<JoinHandle<()>>,
}

impl ChangeWatcher {
    /// Start watching `path`, which need not exist yet.
    ///
    /// Must be called inside a Tokio runtime. Falls back to polling when the
    /// platform watcher cannot be set up.
    pub fn start(path: impl Into<PathBuf>, options: WatcherOptions) -> Self {
        let path = path.into();
        let registry = Arc::new(Registry::default());
        let (raw_tx, raw_rx) = mpsc::unbounded_channel();

        let mut native = None;
        let mut tasks = Vec::new();
        let backend = match options.mode {
            WatchMode::Native => match start_native(&path, raw_tx.clone()) {
                Ok(watcher) => {
                    native = Some(watcher);
                    WatchBackend::Native
                }
                Err(error) => {
                    tracing::warn!(
                        "Native watch on {} unavailable ({}); falling back to polling",
                        path.display(),
                        error
                    );
                    WatchBackend::Polling
                }
            },
            WatchMode::Polling => WatchBackend::Polling,
        };

        if backend == WatchBackend::Polling {
            tasks.push(tokio::spawn(poll_metadata(
                path.clone(),
                options.poll_interval,
                raw_tx,
            )));
        }
        tasks.push(tokio::spawn(dispatch(
            raw_rx,
            options.debounce,
            Arc::clone(&registry),
            path.clone(),
        )));

        tracing::debug!("Watching {} with {:?} backend", path.display(), backend);
        Self {
            path,
            backend,
            registry,
            _native: native,
            tasks,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub const fn backend(&self) -> WatchBackend {
        self.backend
    }

    /// Register `callback`; it runs on the watcher's dispatch task and must
    /// not block.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&ChangeEvent) + Send + Sync + 'static,
    {
        let id = self.registry.insert(Arc::new(callback));
        Subscription {
            id,
            registry: Arc::downgrade(&self.registry),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.registry.len()
    }
}

impl Drop for ChangeWatcher {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

fn start_native(path: &Path, tx: mpsc::UnboundedSender<()>) -> Result<RecommendedWatcher> {
    let file_name = path
        .file_name()
        .map(ToOwned::to_owned)
        .ok_or_else(|| Error::InvalidInput(format!("{} has no file name", path.display())))?;
    let dir = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    let mut watcher = notify::recommended_watcher(move |result: notify::Result<Event>| {
        match result {
            Ok(event) => {
                if is_relevant(&event, &file_name) {
                    let _ = tx.send(());
                }
            }
            Err(error) => tracing::warn!("File watcher error: {}", error),
        }
    })?;
    // The directory, not the file: atomic saves replace the file's inode.
    watcher.watch(dir, RecursiveMode::NonRecursive)?;
    Ok(watcher)
}

fn is_relevant(event: &Event, file_name: &OsStr) -> bool {
    let interesting = matches!(
        event.kind,
        EventKind::Any | EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    );
    interesting
        && event
            .paths
            .iter()
            .any(|path| path.file_name() == Some(file_name))
}

async fn poll_metadata(path: PathBuf, every: Duration, tx: mpsc::UnboundedSender<()>) {
    let mut ticker = interval(every.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await;
    let mut last = snapshot(&path).await;

    loop {
        ticker.tick().await;
        let current = snapshot(&path).await;
        if current != last {
            last = current;
            if tx.send(()).is_err() {
                break;
            }
        }
    }
}

async fn snapshot(path: &Path) -> Option<(Option<SystemTime>, u64)> {
    let metadata = tokio::fs::metadata(path).await.ok()?;
    Some((metadata.modified().ok(), metadata.len()))
}

async fn dispatch(
    mut rx: mpsc::UnboundedReceiver<()>,
    debounce: Duration,
    registry: Arc<Registry>,
    path: PathBuf,
) {
    while rx.recv().await.is_some() {
        sleep(debounce).await;
        while rx.try_recv().is_ok() {}

        let event = ChangeEvent {
            path: path.clone(),
            observed_at: Utc::now(),
        };
        tracing::debug!("Change detected on {}", path.display());
        registry.notify(&event);
    }
}
