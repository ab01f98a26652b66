use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] rota_core::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("No payload provided on stdin")]
    EmptyPayload,
    #[error("Invalid payload in {source_name}: {message}")]
    InvalidPayload {
        source_name: String,
        message: String,
    },
    #[error("No base fingerprint: run `rota show` first or pass `--base`")]
    MissingBase,
    #[error("Configuration error: {0}")]
    Config(String),
    #[error(
        "Save conflicts with version {version} by {modified_by}. Re-run with `--prefer local` or `--prefer remote`."
    )]
    Conflict { version: u64, modified_by: String },
}
