//! Error types for process supervision.

use std::path::PathBuf;

use thiserror::Error;

/// Result type for process operations.
pub type ProcessResult<T> = Result<T, ProcessError>;

/// Errors raised while starting or stopping the managed process.
#[derive(Debug, Error)]
pub enum ProcessError {
    /// None of the known startup scripts exist under the product root.
    #[error("no startup script found in {}", root.display())]
    NoStartupScript { root: PathBuf },

    /// The startup script could not be launched.
    #[error("failed to spawn {}: {source}", script.display())]
    Spawn {
        script: PathBuf,
        source: std::io::Error,
    },

    /// Signalling the process failed.
    #[error("failed to terminate process {pid}: {reason}")]
    Termination { pid: u32, reason: String },

    /// The target process no longer exists.
    #[error("process {pid} not found")]
    NotFound { pid: u32 },

    /// The runtime is not installed.
    #[error("runtime is not installed")]
    NotInstalled,
}
