use crate::commands::common::open_coordinator;
use crate::error::CliError;
use crate::settings::Settings;

pub async fn run_init(settings: &Settings) -> Result<(), CliError> {
    let coordinator = open_coordinator(settings)?;
    let outcome = coordinator.initialize().await?;

    if outcome.created {
        println!(
            "Created {} (version {}) as {}",
            settings.sync.document_path().display(),
            outcome.version,
            outcome.client_id
        );
    } else {
        println!(
            "{} already exists (version {})",
            settings.sync.document_path().display(),
            outcome.version
        );
    }
    Ok(())
}
