pub mod check;
pub mod common;
pub mod completions;
pub mod config;
pub mod init;
pub mod lock;
pub mod save;
pub mod show;
pub mod watch;
