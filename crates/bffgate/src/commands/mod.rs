//! CLI command handlers.

use std::path::{Path, PathBuf};

pub mod config;
pub mod start;

/// Shared context for all commands.
#[derive(Debug, Clone)]
pub struct Context {
    /// Verbose output enabled.
    pub verbose: bool,
}

/// Directory for the rotating log file, if file logging is on.
///
/// An explicit directory wins; otherwise the platform's local data dir.
pub fn log_dir(enabled: bool, explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(dir) = explicit {
        return Some(dir.to_path_buf());
    }
    if !enabled {
        return None;
    }
    Some(
        dirs::data_local_dir()
            .map(|d| d.join("bffgate").join("logs"))
            .unwrap_or_else(|| PathBuf::from("logs")),
    )
}
