//! Persistent CLI configuration and override resolution.

use std::path::{Path, PathBuf};

use rota_core::util::normalize_text_option;
use rota_core::{ClientId, SyncConfig};
use serde::{Deserialize, Serialize};

use crate::error::CliError;

const CONFIG_FILE_NAME: &str = "sync-config.json";
pub const SHARED_DIR_ENV: &str = "ROTA_SHARED_DIR";
pub const CLIENT_ID_ENV: &str = "ROTA_CLIENT_ID";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CliConfig {
    #[serde(default = "default_config_version")]
    pub version: u32,
    /// Stable identity for this desk; generated by `rota config init`
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub sync: SyncConfig,
}

const fn default_config_version() -> u32 {
    1
}

/// Where the client identity in effect came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientIdSource {
    Flag,
    Environment,
    ConfigFile,
    /// Generated for this run only; own writes will not be recognized later
    Ephemeral,
}

/// Configuration after applying flags and environment overrides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Settings {
    pub config_path: PathBuf,
    pub client_id: ClientId,
    pub client_id_source: ClientIdSource,
    pub sync: SyncConfig,
}

/// Explicit values from the command line.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub config: Option<PathBuf>,
    pub shared_dir: Option<PathBuf>,
    pub client_id: Option<String>,
}

pub fn default_config_path() -> Result<PathBuf, CliError> {
    dirs::config_dir()
        .map(|dir| dir.join("rota").join(CONFIG_FILE_NAME))
        .ok_or_else(|| CliError::Config("Failed to resolve CLI config directory".to_string()))
}

pub fn resolve_config_path(explicit: Option<PathBuf>) -> Result<PathBuf, CliError> {
    explicit.map_or_else(default_config_path, Ok)
}

impl CliConfig {
    pub fn load_from_path(path: &Path) -> Result<Self, String> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path)
            .map_err(|error| format!("Failed to read config at {}: {}", path.display(), error))?;
        let mut config = serde_json::from_str::<Self>(&raw)
            .map_err(|error| format!("Failed to parse config at {}: {}", path.display(), error))?;
        config.normalize();
        config
            .sync
            .validate()
            .map_err(|error| format!("Invalid config at {}: {}", path.display(), error))?;
        Ok(config)
    }

    pub fn save_to_path(&self, path: &Path) -> Result<(), String> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|error| {
                format!(
                    "Failed to create config directory {}: {}",
                    parent.display(),
                    error
                )
            })?;
        }

        let mut normalized = self.clone();
        normalized.normalize();
        normalized
            .sync
            .validate()
            .map_err(|error| error.to_string())?;
        let serialized = serde_json::to_string_pretty(&normalized)
            .map_err(|error| format!("Failed to serialize config: {error}"))?;
        std::fs::write(path, serialized)
            .map_err(|error| format!("Failed to write config at {}: {}", path.display(), error))
    }

    /// Apply overrides in precedence order: flag, environment, file.
    pub fn resolve(
        self,
        config_path: PathBuf,
        overrides: Overrides,
        env_shared_dir: Option<String>,
        env_client_id: Option<String>,
    ) -> Result<Settings, CliError> {
        let mut sync = self.sync;
        if let Some(shared_dir) = overrides
            .shared_dir
            .or_else(|| normalize_text_option(env_shared_dir).map(PathBuf::from))
        {
            sync.shared_dir = shared_dir;
        }

        let (raw_client_id, client_id_source) = [
            (overrides.client_id, ClientIdSource::Flag),
            (env_client_id, ClientIdSource::Environment),
            (self.client_id, ClientIdSource::ConfigFile),
        ]
        .into_iter()
        .find_map(|(value, source)| normalize_text_option(value).map(|value| (value, source)))
        .map_or((None, ClientIdSource::Ephemeral), |(value, source)| {
            (Some(value), source)
        });

        let client_id = match raw_client_id {
            Some(value) => value.parse::<ClientId>()?,
            None => ClientId::generate(),
        };

        Ok(Settings {
            config_path,
            client_id,
            client_id_source,
            sync,
        })
    }

    fn normalize(&mut self) {
        self.client_id = normalize_text_option(self.client_id.take());
    }
}

/// Load the config file and apply flag and environment overrides.
pub fn load_settings(overrides: Overrides) -> Result<Settings, CliError> {
    let config_path = resolve_config_path(overrides.config.clone())?;
    let config = CliConfig::load_from_path(&config_path).map_err(CliError::Config)?;
    let settings = config.resolve(
        config_path,
        overrides,
        std::env::var(SHARED_DIR_ENV).ok(),
        std::env::var(CLIENT_ID_ENV).ok(),
    )?;
    if settings.client_id_source == ClientIdSource::Ephemeral {
        tracing::warn!(
            "No client id configured; using {} for this run. Run `rota config init` to keep one.",
            settings.client_id
        );
    }
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn file_config() -> CliConfig {
        CliConfig {
            version: 1,
            client_id: Some("desk-file".to_string()),
            sync: SyncConfig::for_dir("/srv/from-file"),
        }
    }

    #[test]
    fn missing_config_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = CliConfig::load_from_path(&dir.path().join("absent.json")).unwrap();
        assert_eq!(loaded, CliConfig::default());
    }

    #[test]
    fn config_roundtrip_trims_client_id() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILE_NAME);

        let mut config = file_config();
        config.client_id = Some("  theatre-3 ".to_string());
        config.sync.lock_wait_ms = 750;
        config.save_to_path(&path).unwrap();

        let loaded = CliConfig::load_from_path(&path).unwrap();
        assert_eq!(loaded.client_id.as_deref(), Some("theatre-3"));
        assert_eq!(loaded.sync.lock_wait_ms, 750);
        assert_eq!(loaded.sync.shared_dir, PathBuf::from("/srv/from-file"));
    }

    #[test]
    fn unknown_sync_fields_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, r#"{"sync": {"lock_timeout": 5}}"#).unwrap();

        let error = CliConfig::load_from_path(&path).unwrap_err();
        assert!(error.contains("Failed to parse config"));
    }

    #[test]
    fn invalid_sync_section_is_rejected_on_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, r#"{"sync": {"save_attempts": 0}}"#).unwrap();

        let error = CliConfig::load_from_path(&path).unwrap_err();
        assert!(error.contains("Invalid config"));
        assert!(error.contains("save_attempts"));
    }

    #[test]
    fn flag_beats_environment_beats_file() {
        let settings = file_config()
            .resolve(
                PathBuf::from("cfg.json"),
                Overrides {
                    config: None,
                    shared_dir: Some(PathBuf::from("/mnt/flag")),
                    client_id: Some("desk-flag".to_string()),
                },
                Some("/mnt/env".to_string()),
                Some("desk-env".to_string()),
            )
            .unwrap();
        assert_eq!(settings.sync.shared_dir, PathBuf::from("/mnt/flag"));
        assert_eq!(settings.client_id.as_str(), "desk-flag");
        assert_eq!(settings.client_id_source, ClientIdSource::Flag);

        let settings = file_config()
            .resolve(
                PathBuf::from("cfg.json"),
                Overrides::default(),
                Some("/mnt/env".to_string()),
                Some(" ".to_string()),
            )
            .unwrap();
        assert_eq!(settings.sync.shared_dir, PathBuf::from("/mnt/env"));
        assert_eq!(settings.client_id.as_str(), "desk-file");
        assert_eq!(settings.client_id_source, ClientIdSource::ConfigFile);
    }

    #[test]
    fn missing_client_id_is_generated_for_the_run() {
        let settings = CliConfig::default()
            .resolve(PathBuf::from("cfg.json"), Overrides::default(), None, None)
            .unwrap();
        assert_eq!(settings.client_id_source, ClientIdSource::Ephemeral);
        assert!(!settings.client_id.as_str().is_empty());
    }

    #[test]
    fn control_characters_in_client_id_are_rejected() {
        let result = CliConfig::default().resolve(
            PathBuf::from("cfg.json"),
            Overrides::default(),
            None,
            Some("desk\u{7}".to_string()),
        );
        assert!(matches!(result, Err(CliError::Core(_))));
    }
}
