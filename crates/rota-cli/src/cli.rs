use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "rota")]
#[command(about = "Share one staff rota between desks through a common folder")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to the CLI config file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Shared folder holding the rota document (overrides config and ROTA_SHARED_DIR)
    #[arg(long, global = true, value_name = "DIR")]
    pub shared_dir: Option<PathBuf>,

    /// Identity written into saved documents (overrides config and ROTA_CLIENT_ID)
    #[arg(long, global = true, value_name = "ID")]
    pub client_id: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create the shared document if it does not exist yet
    Init,
    /// Show the shared document
    Show {
        /// Output as JSON
        #[arg(long)]
        json: bool,
        /// Include the schedule payload
        #[arg(long)]
        payload: bool,
    },
    /// Save a schedule payload to the shared document
    Save {
        /// JSON payload file, or `-` for stdin
        #[arg(value_name = "FILE")]
        input: PathBuf,
        /// Fingerprint the payload was edited from (defaults to the last one `show` or `save` reported)
        #[arg(long, value_name = "FINGERPRINT")]
        base: Option<String>,
        /// Resolve a conflict immediately by keeping one side
        #[arg(long, value_enum)]
        prefer: Option<ConflictSide>,
    },
    /// Check whether another desk changed the document
    Check {
        /// Fingerprint of the document last seen (defaults to the recorded one)
        #[arg(long, value_name = "FINGERPRINT")]
        base: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Follow the shared document and print changes until interrupted
    Watch {
        /// Poll file metadata instead of using platform notifications
        #[arg(long)]
        polling: bool,
    },
    /// Inspect or clear the shared lock marker
    Lock {
        #[command(subcommand)]
        command: LockCommands,
    },
    /// Manage the CLI config file
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
    /// Generate shell completion scripts
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: CompletionShell,
        /// Optional output path (stdout when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum ConflictSide {
    Local,
    Remote,
}

impl ConflictSide {
    pub const fn prefers_local(self) -> bool {
        matches!(self, Self::Local)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum CompletionShell {
    Bash,
    Zsh,
    Fish,
}

#[derive(Subcommand)]
pub enum LockCommands {
    /// Show who holds the lock and for how long
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Remove the lock marker regardless of owner
    Release,
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Write a config file with a fresh client identity and `--shared-dir`
    Init {
        /// Keep an existing client identity instead of generating one
        #[arg(long)]
        keep_client_id: bool,
        /// Use metadata polling for `rota watch`
        #[arg(long)]
        polling: bool,
    },
    /// Print the effective configuration
    Show,
}
