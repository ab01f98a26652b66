use std::io::{self, IsTerminal, Read};
use std::path::Path;

use chrono::{DateTime, Utc};
use rota_core::sync::ChangeCheck;
use rota_core::{Fingerprint, Payload, SyncConflict, SyncCoordinator, SyncDocument};
use serde::Serialize;

use crate::error::CliError;
use crate::last_seen::{last_seen_path, LastSeen};
use crate::settings::Settings;

#[derive(Debug, Serialize, PartialEq)]
pub struct DocumentSummary {
    pub version: u64,
    pub modified_by: String,
    pub last_modified: DateTime<Utc>,
    pub fingerprint: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Payload>,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct ChangeItem {
    pub changed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<DateTime<Utc>>,
}

pub fn open_coordinator(settings: &Settings) -> Result<SyncCoordinator, CliError> {
    Ok(SyncCoordinator::new(
        settings.sync.clone(),
        settings.client_id.clone(),
    )?)
}

/// The fingerprint this desk last saw for the configured document.
pub fn last_seen_fingerprint(settings: &Settings) -> Result<Option<Fingerprint>, CliError> {
    let seen = LastSeen::load_from_path(&last_seen_path(&settings.config_path))
        .map_err(CliError::Config)?;
    Ok(seen.get(&settings.sync.document_path()).cloned())
}

pub fn remember_fingerprint(settings: &Settings, fingerprint: Fingerprint) -> Result<(), CliError> {
    let path = last_seen_path(&settings.config_path);
    let mut seen = LastSeen::load_from_path(&path).map_err(CliError::Config)?;
    seen.record(&settings.sync.document_path(), fingerprint);
    seen.save_to_path(&path).map_err(CliError::Config)
}

/// Explicit `--base`, falling back to the last fingerprint this desk saw.
pub fn resolve_base(settings: &Settings, explicit: Option<&str>) -> Result<Fingerprint, CliError> {
    match explicit {
        Some(base) => parse_fingerprint(base),
        None => last_seen_fingerprint(settings)?.ok_or(CliError::MissingBase),
    }
}

pub fn summarize_document(document: &SyncDocument, include_payload: bool) -> DocumentSummary {
    DocumentSummary {
        version: document.version,
        modified_by: document.modified_by.clone(),
        last_modified: document.last_modified,
        fingerprint: document.fingerprint.to_string(),
        payload: include_payload.then(|| document.payload.clone()),
    }
}

pub fn change_to_item(check: &ChangeCheck) -> ChangeItem {
    match check {
        ChangeCheck::Unchanged => ChangeItem {
            changed: false,
            version: None,
            modified_by: None,
            last_modified: None,
        },
        ChangeCheck::Changed {
            version,
            modified_by,
            last_modified,
            ..
        } => ChangeItem {
            changed: true,
            version: Some(*version),
            modified_by: Some(modified_by.clone()),
            last_modified: Some(*last_modified),
        },
    }
}

pub fn format_document_lines(summary: &DocumentSummary, now: DateTime<Utc>) -> Vec<String> {
    let mut lines = vec![
        format!("version      {}", summary.version),
        format!(
            "modified     {} by {}",
            format_relative_time(summary.last_modified, now),
            summary.modified_by
        ),
        format!("fingerprint  {}", summary.fingerprint),
    ];
    if let Some(payload) = &summary.payload {
        lines.push(format!("weeks        {}", week_count(payload)));
    }
    lines
}

pub fn format_conflict_lines(conflict: &SyncConflict, now: DateTime<Utc>) -> Vec<String> {
    vec![
        format!(
            "Conflict: version {} was saved by {} {}",
            conflict.remote_version,
            conflict.modified_by,
            format_relative_time(conflict.last_modified, now)
        ),
        format!(
            "  local  {} weeks   remote  {} weeks",
            week_count(&conflict.local),
            week_count(&conflict.remote)
        ),
        format!("  remote fingerprint {}", conflict.remote_fingerprint),
    ]
}

pub fn format_relative_time(timestamp: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let elapsed = now.signed_duration_since(timestamp);
    if elapsed.num_minutes() < 1 {
        "just now".to_string()
    } else if elapsed.num_hours() < 1 {
        format!("{}m ago", elapsed.num_minutes())
    } else if elapsed.num_days() < 1 {
        format!("{}h ago", elapsed.num_hours())
    } else {
        format!("{}d ago", elapsed.num_days())
    }
}

fn week_count(payload: &Payload) -> usize {
    payload.as_array().map_or(0, Vec::len)
}

pub fn parse_fingerprint(value: &str) -> Result<Fingerprint, CliError> {
    Ok(value.parse::<Fingerprint>()?)
}

/// Parse a schedule payload; the top level must be the list of weeks.
pub fn parse_payload(raw: &str, source_name: &str) -> Result<Payload, CliError> {
    let payload =
        serde_json::from_str::<Payload>(raw).map_err(|error| CliError::InvalidPayload {
            source_name: source_name.to_string(),
            message: error.to_string(),
        })?;
    if !payload.is_array() {
        return Err(CliError::InvalidPayload {
            source_name: source_name.to_string(),
            message: "expected a JSON array of weeks".to_string(),
        });
    }
    Ok(payload)
}

/// Read a payload from a file, or from stdin when `input` is `-`.
pub fn read_payload(input: &Path) -> Result<Payload, CliError> {
    if input == Path::new("-") {
        let raw = read_piped_stdin()?.ok_or(CliError::EmptyPayload)?;
        return parse_payload(&raw, "stdin");
    }

    let raw = std::fs::read_to_string(input)?;
    parse_payload(&raw, &input.display().to_string())
}

fn read_piped_stdin() -> Result<Option<String>, CliError> {
    let stdin = io::stdin();
    if stdin.is_terminal() {
        return Ok(None);
    }

    let mut buffer = String::new();
    stdin.lock().read_to_string(&mut buffer)?;
    let trimmed = buffer.trim();
    Ok((!trimmed.is_empty()).then(|| trimmed.to_string()))
}

pub fn print_json<T: Serialize>(value: &T) -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
