//! Error types for the runtime installer.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result type for installer operations.
pub type InstallResult<T> = Result<T, InstallError>;

/// Errors that can occur while resolving, downloading or installing a runtime.
#[derive(Debug, Error)]
pub enum InstallError {
    /// Transport-level failure (timeout, reset, refused, DNS, unreachable).
    #[error("network error for {url}: {reason}")]
    Network { url: String, reason: String },

    /// The server answered with an unusable HTTP status.
    #[error("HTTP {status} from {url}")]
    Http { url: String, status: u16 },

    /// Content hash did not match the published digest.
    #[error("integrity check failed for {filename}: expected {expected}, got {actual}")]
    Integrity {
        filename: String,
        expected: String,
        actual: String,
    },

    /// Transfer finished but the file does not have the announced size.
    #[error("size mismatch for {filename}: expected {expected} bytes, got {actual}")]
    SizeMismatch {
        filename: String,
        expected: u64,
        actual: u64,
    },

    /// Server answered a resume with a range that does not start at our offset.
    #[error("invalid content range for {url}: {reason}")]
    BadContentRange { url: String, reason: String },

    /// Every download attempt failed.
    #[error("failed to download {url} after {attempts} attempts: {reason}")]
    DownloadFailed {
        url: String,
        attempts: u32,
        reason: String,
    },

    /// The registry returned a release without a usable asset.
    #[error("no suitable asset in release {version}")]
    NoSuitableAsset { version: String },

    /// Registry response could not be decoded.
    #[error("failed to parse release metadata from {url}: {reason}")]
    ReleaseParse { url: String, reason: String },

    /// The opaque extractor failed.
    #[error("failed to extract {}: {reason}", path.display())]
    Extraction { path: PathBuf, reason: String },

    /// Extraction succeeded but none of the expected root directories exist.
    #[error("product root not found under {}", dir.display())]
    ProductRootNotFound { dir: PathBuf },

    /// The post-install configuration hook failed.
    #[error("configuration hook {url} failed: {reason}")]
    Hook { url: String, reason: String },

    /// Filesystem error on a specific path.
    #[error("I/O error on {}: {source}", path.display())]
    Io { path: PathBuf, source: io::Error },

    /// The caller cancelled the operation.
    #[error("operation cancelled")]
    Cancelled,
}

impl InstallError {
    /// Wrap an I/O error with the path it occurred on.
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether this is a cancellation rather than a failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Network-class errors leave the partial download resumable.
    ///
    /// Everything else is treated as corruption of the partial file.
    pub fn is_network(&self) -> bool {
        matches!(self, Self::Network { .. })
    }

    /// Build a network or HTTP error from a reqwest failure.
    pub(crate) fn from_reqwest(url: &str, err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            return Self::Http {
                url: url.to_string(),
                status: status.as_u16(),
            };
        }
        Self::Network {
            url: url.to_string(),
            reason: describe_reqwest(&err),
        }
    }
}

fn describe_reqwest(err: &reqwest::Error) -> String {
    if err.is_timeout() {
        format!("timed out: {}", err)
    } else if err.is_connect() {
        format!("connection failed: {}", err)
    } else {
        err.to_string()
    }
}
