use rota_core::sync::ChangeCheck;

use crate::commands::common::{change_to_item, open_coordinator, print_json, resolve_base};
use crate::error::CliError;
use crate::settings::Settings;

/// Report whether the document moved past `base`.
///
/// Does not record the newer fingerprint: the desk has not seen that payload
/// until it runs `rota show`.
pub async fn run_check(
    settings: &Settings,
    base: Option<&str>,
    as_json: bool,
) -> Result<(), CliError> {
    let base = resolve_base(settings, base)?;
    let coordinator = open_coordinator(settings)?;
    coordinator.acknowledge_remote(base.clone()).await;
    let check = coordinator.check_for_changes().await?;

    if as_json {
        return print_json(&change_to_item(&check));
    }

    match check {
        ChangeCheck::Unchanged => println!("No changes since {base}"),
        ChangeCheck::Changed {
            version,
            modified_by,
            ..
        } => println!("Changed: version {version} by {modified_by}"),
    }
    Ok(())
}
