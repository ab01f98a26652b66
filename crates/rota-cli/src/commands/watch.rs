use std::sync::Arc;

use rota_core::sync::{ChangeWatcher, SessionEvent, WatcherOptions};
use rota_core::{SyncSession, WatchMode};
use tokio::sync::broadcast::error::RecvError;

use crate::commands::common::open_coordinator;
use crate::error::CliError;
use crate::settings::Settings;

pub async fn run_watch(settings: &Settings, polling: bool) -> Result<(), CliError> {
    let session = Arc::new(SyncSession::new(Arc::new(open_coordinator(settings)?)));
    let mut events = session.events();

    let started = session.start().await?;
    println!(
        "Watching {} as {} ({} weeks)",
        settings.sync.document_path().display(),
        started.client_id,
        started.payload.as_array().map_or(0, Vec::len)
    );

    let mut options = WatcherOptions::from_config(&settings.sync);
    if polling {
        options.mode = WatchMode::Polling;
    }
    let watcher = ChangeWatcher::start(settings.sync.document_path(), options);
    tracing::info!("Change watcher running with {:?} backend", watcher.backend());
    let background = session.spawn_background(Some(&watcher));

    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal?;
                break;
            }
            event = events.recv() => match event {
                Ok(event) => print_event(&event),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!("Skipped {} sync events", skipped);
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    background.stop();
    Ok(())
}

pub fn describe_event(event: &SessionEvent) -> String {
    match event {
        SessionEvent::RemoteChanged {
            payload,
            version,
            modified_by,
        } => format!(
            "Version {version} saved by {modified_by} ({} weeks)",
            payload.as_array().map_or(0, Vec::len)
        ),
        SessionEvent::Conflict(conflict) => format!(
            "Conflict with version {} by {}",
            conflict.remote_version, conflict.modified_by
        ),
        SessionEvent::Saved { version } => format!("Saved version {version}"),
        SessionEvent::StatusChanged(indicator) => format!("Status: {}", indicator.label()),
    }
}

fn print_event(event: &SessionEvent) {
    println!("{}", describe_event(event));
}
