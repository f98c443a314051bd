//! Configuration errors.

use std::path::PathBuf;

use thiserror::Error;

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors raised while reading, editing or writing the configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read or written.
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The file is not valid INI.
    #[error("failed to parse {}: {reason}", path.display())]
    Parse { path: PathBuf, reason: String },

    /// A value does not have the expected type.
    #[error("invalid value '{value}' for {key}: {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },

    /// The key is not a known `section.key` name.
    #[error("unknown configuration key '{0}'")]
    UnknownKey(String),
}
