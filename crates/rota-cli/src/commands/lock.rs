use std::time::Duration;

use rota_core::sync::LockInfo;
use serde::Serialize;

use crate::cli::LockCommands;
use crate::commands::common::{open_coordinator, print_json};
use crate::error::CliError;
use crate::settings::Settings;

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct LockStatusItem {
    pub locked: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age_ms: Option<u128>,
    pub stale: bool,
}

pub async fn run_lock(settings: &Settings, command: LockCommands) -> Result<(), CliError> {
    let coordinator = open_coordinator(settings)?;
    let lock = coordinator.lock_manager();

    match command {
        LockCommands::Status { json } => {
            let info = lock.inspect().await?;
            let item = lock_status_item(info.as_ref(), settings.sync.lock_stale_after());
            if json {
                return print_json(&item);
            }
            if item.locked {
                println!(
                    "Locked by {} for {}{}",
                    item.owner.as_deref().unwrap_or("unknown owner"),
                    item.age_ms
                        .map_or_else(|| "an unknown time".to_string(), |ms| format!("{ms}ms")),
                    if item.stale { " (stale)" } else { "" }
                );
            } else {
                println!("Unlocked");
            }
        }
        LockCommands::Release => {
            if lock.force_release().await? {
                tracing::warn!("Removed lock marker {}", lock.path().display());
                println!("Released {}", lock.path().display());
            } else {
                println!("No lock to release");
            }
        }
    }
    Ok(())
}

pub fn lock_status_item(info: Option<&LockInfo>, stale_after: Duration) -> LockStatusItem {
    info.map_or(
        LockStatusItem {
            locked: false,
            owner: None,
            age_ms: None,
            stale: false,
        },
        |info| LockStatusItem {
            locked: true,
            owner: info.owner.clone(),
            age_ms: info.age.map(|age| age.as_millis()),
            stale: info.is_stale(stale_after),
        },
    )
}
