//! CLI error type.

use std::fmt;

use enginekit::config::ConfigError;
use enginekit::installer::InstallError;

/// Errors surfaced to the user by CLI commands.
#[derive(Debug)]
pub enum CliError {
    /// Invalid or unreadable configuration.
    Config(String),
    /// Installing or uninstalling failed.
    Install(String),
    /// Starting or stopping the runtime failed.
    Process(String),
    /// The operation was cancelled.
    Cancelled,
    /// Terminal or stdio failure.
    Io(std::io::Error),
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Config(msg) => write!(f, "Configuration error: {}", msg),
            CliError::Install(msg) => write!(f, "Install error: {}", msg),
            CliError::Process(msg) => write!(f, "Process error: {}", msg),
            CliError::Cancelled => write!(f, "Cancelled"),
            CliError::Io(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl std::error::Error for CliError {}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        CliError::Config(e.to_string())
    }
}

impl From<InstallError> for CliError {
    fn from(e: InstallError) -> Self {
        if e.is_cancelled() {
            CliError::Cancelled
        } else {
            CliError::Install(e.to_string())
        }
    }
}

impl From<std::io::Error> for CliError {
    fn from(e: std::io::Error) -> Self {
        CliError::Io(e)
    }
}

impl From<dialoguer::Error> for CliError {
    fn from(e: dialoguer::Error) -> Self {
        CliError::Io(std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))
    }
}
