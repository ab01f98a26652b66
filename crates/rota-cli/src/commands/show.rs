use chrono::Utc;

use crate::commands::common::{
    format_document_lines, open_coordinator, print_json, remember_fingerprint,
    summarize_document,
};
use crate::error::CliError;
use crate::settings::Settings;

/// Print the shared document and record it as this desk's view.
pub async fn run_show(
    settings: &Settings,
    as_json: bool,
    include_payload: bool,
) -> Result<(), CliError> {
    let coordinator = open_coordinator(settings)?;
    let document = coordinator.load_document().await?;
    remember_fingerprint(settings, document.fingerprint.clone())?;
    let summary = summarize_document(&document, include_payload);

    if as_json {
        return print_json(&summary);
    }

    for line in format_document_lines(&summary, Utc::now()) {
        println!("{line}");
    }
    if include_payload {
        println!("{}", serde_json::to_string_pretty(&document.payload)?);
    }
    Ok(())
}
