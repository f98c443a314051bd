//! Extraction into a clean install directory and product root discovery.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info};

use super::error::{InstallError, InstallResult};
use super::profile::ProductProfile;
use super::traits::ArchiveExtractor;
use crate::cancel::CancelToken;

/// Installs an archive and finds the product's real root directory.
#[derive(Clone)]
pub struct ArchiveInstaller {
    extractor: Arc<dyn ArchiveExtractor>,
    profile: ProductProfile,
}

impl ArchiveInstaller {
    /// Create an installer using `extractor` for decompression.
    pub fn new(extractor: Arc<dyn ArchiveExtractor>, profile: ProductProfile) -> Self {
        Self { extractor, profile }
    }

    /// Extract `archive` into a fresh `dest_dir` and return the product root.
    ///
    /// Any pre-existing `dest_dir` is removed first.
    pub async fn install(
        &self,
        archive: &Path,
        dest_dir: &Path,
        cancel: &CancelToken,
    ) -> InstallResult<PathBuf> {
        self.extract_clean(archive, dest_dir, cancel).await?;
        cancel.check()?;
        self.require_root(dest_dir)
    }

    /// Remove `dest_dir` if present and extract `archive` into it.
    async fn extract_clean(
        &self,
        archive: &Path,
        dest_dir: &Path,
        cancel: &CancelToken,
    ) -> InstallResult<()> {
        cancel.check()?;

        if tokio::fs::try_exists(dest_dir).await.unwrap_or(false) {
            info!(dir = %dest_dir.display(), "Removing previous installation");
            tokio::fs::remove_dir_all(dest_dir)
                .await
                .map_err(|e| InstallError::io(dest_dir, e))?;
        }

        self.extractor.extract(archive, dest_dir, cancel).await
    }

    /// Like [`locate_root`](Self::locate_root) but fails when nothing matches.
    fn require_root(&self, dest_dir: &Path) -> InstallResult<PathBuf> {
        locate_root(dest_dir, &self.profile).ok_or_else(|| InstallError::ProductRootNotFound {
            dir: dest_dir.to_path_buf(),
        })
    }

    /// Find the product root under an existing install directory.
    pub fn locate_root(&self, dest_dir: &Path) -> Option<PathBuf> {
        locate_root(dest_dir, &self.profile)
    }
}

/// Search `dest_dir` for the product root.
///
/// Candidate subdirectories are checked in the profile's order; failing
/// that, `dest_dir` itself qualifies when it directly holds a marker entry.
pub fn locate_root(dest_dir: &Path, profile: &ProductProfile) -> Option<PathBuf> {
    if !dest_dir.is_dir() {
        return None;
    }

    for candidate in &profile.root_candidates {
        let path = dest_dir.join(candidate);
        if path.is_dir() {
            debug!(root = %path.display(), "Found product root");
            return Some(path);
        }
    }

    if profile
        .root_markers
        .iter()
        .any(|marker| dest_dir.join(marker).exists())
    {
        debug!(root = %dest_dir.display(), "Install directory is the product root");
        return Some(dest_dir.to_path_buf());
    }

    None
}
