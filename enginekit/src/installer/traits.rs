//! Seams of the installer.
//!
//! Every collaborator the orchestrator drives is a trait so tests can swap
//! in fakes. Async methods return [`BoxFuture`] to keep the traits
//! dyn-compatible (`Arc<dyn ArchiveExtractor>` and friends).

use std::future::Future;
use std::path::Path;
use std::pin::Pin;

use crate::cancel::CancelToken;

use super::error::InstallResult;
use super::release::ReleaseDescriptor;

/// Boxed future type for dyn-compatible async methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Byte-level progress callback.
///
/// # Arguments
///
/// * `downloaded` - Bytes present in the destination file so far
/// * `total` - Total expected bytes, if the server announced it
pub type ProgressCallback = Box<dyn Fn(u64, Option<u64>) + Send + Sync>;

/// Source of release metadata.
pub trait ReleaseSource: Send + Sync {
    /// Resolve the newest published release for this platform.
    fn latest(&self) -> BoxFuture<'_, InstallResult<ReleaseDescriptor>>;
}

/// Transfers a single artifact to disk.
pub trait ArtifactDownloader: Send + Sync {
    /// Download `url` to `dest`, resuming a partial file when possible.
    ///
    /// Fails with `DownloadFailed` once retries are exhausted and with
    /// `Cancelled` when the token fires.
    fn download<'a>(
        &'a self,
        url: &'a str,
        dest: &'a Path,
        on_progress: ProgressCallback,
        cancel: &'a CancelToken,
    ) -> BoxFuture<'a, InstallResult<u64>>;
}

/// Opaque archive extraction capability.
pub trait ArchiveExtractor: Send + Sync {
    /// Extract `archive` into `dest_dir`, creating it if needed.
    fn extract<'a>(
        &'a self,
        archive: &'a Path,
        dest_dir: &'a Path,
        cancel: &'a CancelToken,
    ) -> BoxFuture<'a, InstallResult<()>>;
}

/// Post-install handoff to the host's configuration store.
pub trait ConfigurationHook: Send + Sync {
    /// Notify the host that the runtime now lives at `root_dir`.
    fn configure<'a>(
        &'a self,
        install_dir: &'a Path,
        root_dir: &'a Path,
        release: &'a ReleaseDescriptor,
    ) -> BoxFuture<'a, InstallResult<()>>;
}
