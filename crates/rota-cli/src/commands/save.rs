use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use rota_core::sync::SaveOutcome;
use rota_core::SyncSession;

use crate::cli::ConflictSide;
use crate::commands::common::{
    format_conflict_lines, open_coordinator, read_payload, remember_fingerprint, resolve_base,
};
use crate::error::CliError;
use crate::settings::Settings;

pub async fn run_save(
    settings: &Settings,
    input: &Path,
    base: Option<&str>,
    prefer: Option<ConflictSide>,
) -> Result<(), CliError> {
    let payload = read_payload(input)?;
    // The payload is checked against the view it was edited from, not
    // against whatever the shared folder holds right now.
    let base = resolve_base(settings, base)?;
    let session = SyncSession::new(Arc::new(open_coordinator(settings)?));
    session.coordinator().acknowledge_remote(base).await;

    let mut outcome = session.save(payload).await?;
    if let (SaveOutcome::Conflict(conflict), Some(side)) = (&outcome, prefer) {
        for line in format_conflict_lines(conflict, Utc::now()) {
            eprintln!("{line}");
        }
        eprintln!(
            "Keeping {} changes",
            if side.prefers_local() {
                "local"
            } else {
                "remote"
            }
        );
        outcome = session.resolve_conflict(side.prefers_local()).await?;
    }

    match outcome {
        SaveOutcome::Saved {
            version,
            fingerprint,
        } => {
            println!("Saved version {version} ({fingerprint})");
            remember_fingerprint(settings, fingerprint)
        }
        SaveOutcome::Conflict(conflict) => {
            for line in format_conflict_lines(&conflict, Utc::now()) {
                eprintln!("{line}");
            }
            Err(CliError::Conflict {
                version: conflict.remote_version,
                modified_by: conflict.modified_by,
            })
        }
    }
}
