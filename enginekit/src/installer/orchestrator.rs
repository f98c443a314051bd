//! Installation state machine.
//!
//! This module orchestrates the full installation workflow:
//! 1. Resolve the latest release (fallback descriptor on registry failure)
//! 2. Reuse a cached artifact if it still verifies
//! 3. Download, then verify against the published digest
//! 4. Extract into a clean install directory
//! 5. Locate the product root
//! 6. Hand the location to the configuration hook
//!
//! Every transition checks the [`CancelToken`] first; a fired token ends the
//! run in [`InstallationState::Cancelled`].

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::archive::ArchiveInstaller;
use super::config::InstallerConfig;
use super::download::checksum::{self, probably_complete};
use super::download::{partial_path, DownloadManager};
use super::error::{InstallError, InstallResult};
use super::extractor::ShellExtractor;
use super::hook::HttpConfigHook;
use super::release::{ReleaseDescriptor, ReleaseResolver};
use super::traits::{
    ArchiveExtractor, ArtifactDownloader, ConfigurationHook, ProgressCallback, ReleaseSource,
};
use crate::cancel::CancelToken;
use crate::control::ControlChannel;

/// Share of the progress bar assigned to the download phase.
const DOWNLOAD_START: f64 = 5.0;
const DOWNLOAD_END: f64 = 85.0;

/// Phase of an installation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InstallationState {
    /// Nothing has happened yet.
    Idle,
    /// Querying the release registry.
    FetchingRelease,
    /// Verifying a previously downloaded artifact.
    CheckingCache,
    /// Transferring the artifact.
    Downloading,
    /// Running the extractor.
    Extracting,
    /// Searching for the product root.
    LocatingRoot,
    /// Notifying the configuration hook.
    Configuring,
    /// Installed successfully.
    Completed,
    /// Stopped by the caller.
    Cancelled,
    /// Stopped by an error.
    Failed,
}

impl InstallationState {
    /// Get a human-readable name for the state.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::FetchingRelease => "Fetching release",
            Self::CheckingCache => "Checking cache",
            Self::Downloading => "Downloading",
            Self::Extracting => "Extracting",
            Self::LocatingRoot => "Locating root",
            Self::Configuring => "Configuring",
            Self::Completed => "Completed",
            Self::Cancelled => "Cancelled",
            Self::Failed => "Failed",
        }
    }

    /// Whether no further transition can follow.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Failed)
    }

    fn progress(&self) -> f64 {
        match self {
            Self::Idle => 0.0,
            Self::FetchingRelease => 1.0,
            Self::CheckingCache => 3.0,
            Self::Downloading => DOWNLOAD_START,
            Self::Extracting => DOWNLOAD_END,
            Self::LocatingRoot => 95.0,
            Self::Configuring => 97.0,
            Self::Completed => 100.0,
            Self::Cancelled | Self::Failed => 0.0,
        }
    }
}

impl std::fmt::Display for InstallationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Result of a successful installation.
#[derive(Debug, Clone)]
pub struct InstallReport {
    /// Release that was installed.
    pub release: ReleaseDescriptor,
    /// Whether the registry was unreachable and the fallback was used.
    pub used_fallback: bool,
    /// Whether a cached artifact was reused.
    pub used_cache: bool,
    /// Bytes of the artifact on disk.
    pub artifact_bytes: u64,
    /// Directory the archive was extracted into.
    pub install_dir: PathBuf,
    /// Product root inside `install_dir`.
    pub root_dir: PathBuf,
    /// States visited, in order, ending with `Completed`.
    pub states: Vec<InstallationState>,
}

/// Result of an uninstall.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UninstallReport {
    /// Whether an install directory was present and removed.
    pub removed_install: bool,
    /// Stale artifacts removed from the staging area.
    pub removed_artifacts: Vec<PathBuf>,
}

/// Drives one product's install and uninstall lifecycle.
pub struct InstallationOrchestrator {
    config: InstallerConfig,
    releases: Arc<dyn ReleaseSource>,
    downloader: Arc<dyn ArtifactDownloader>,
    archive: ArchiveInstaller,
    hook: Option<Arc<dyn ConfigurationHook>>,
    channel: Arc<dyn ControlChannel>,
    history: Mutex<Vec<InstallationState>>,
}

impl InstallationOrchestrator {
    /// Create an orchestrator with the default collaborators.
    pub fn new(config: InstallerConfig, channel: Arc<dyn ControlChannel>) -> InstallResult<Self> {
        let releases = Arc::new(ReleaseResolver::new(config.profile.clone())?);
        let downloader =
            Arc::new(DownloadManager::new(config.download)?.with_channel(Arc::clone(&channel)));
        let archive = ArchiveInstaller::new(Arc::new(ShellExtractor::new()), config.profile.clone());
        let hook: Option<Arc<dyn ConfigurationHook>> = match &config.hook_url {
            Some(url) => Some(Arc::new(HttpConfigHook::new(url.clone())?)),
            None => None,
        };

        Ok(Self {
            config,
            releases,
            downloader,
            archive,
            hook,
            channel,
            history: Mutex::new(vec![InstallationState::Idle]),
        })
    }

    /// Replace the release source.
    pub fn with_release_source(mut self, releases: Arc<dyn ReleaseSource>) -> Self {
        self.releases = releases;
        self
    }

    /// Replace the downloader.
    pub fn with_downloader(mut self, downloader: Arc<dyn ArtifactDownloader>) -> Self {
        self.downloader = downloader;
        self
    }

    /// Replace the archive extractor.
    pub fn with_extractor(mut self, extractor: Arc<dyn ArchiveExtractor>) -> Self {
        self.archive = ArchiveInstaller::new(extractor, self.config.profile.clone());
        self
    }

    /// Replace (or remove) the configuration hook.
    pub fn with_hook(mut self, hook: Option<Arc<dyn ConfigurationHook>>) -> Self {
        self.hook = hook;
        self
    }

    /// Configuration in effect.
    pub fn config(&self) -> &InstallerConfig {
        &self.config
    }

    /// States visited by the most recent install, in order.
    pub fn history(&self) -> Vec<InstallationState> {
        self.history.lock().clone()
    }

    /// Current state.
    pub fn state(&self) -> InstallationState {
        self.history
            .lock()
            .last()
            .copied()
            .unwrap_or(InstallationState::Idle)
    }

    /// Product root of an existing installation, if any.
    pub fn root_dir(&self) -> Option<PathBuf> {
        self.archive.locate_root(&self.config.install_dir())
    }

    /// Whether the product is installed.
    pub fn is_installed(&self) -> bool {
        self.root_dir().is_some()
    }

    /// Run a complete installation.
    ///
    /// Fails with `Cancelled` when `cancel` fires; the history then ends in
    /// `Cancelled` and no error event is emitted.
    pub async fn install(&self, cancel: &CancelToken) -> InstallResult<InstallReport> {
        *self.history.lock() = vec![InstallationState::Idle];

        match self.run(cancel).await {
            Ok(mut report) => {
                self.enter(InstallationState::Completed);
                self.channel
                    .emit_progress(100.0, "Installation complete");
                info!(
                    version = %report.release.version,
                    root = %report.root_dir.display(),
                    "Installation complete"
                );
                report.states = self.history();
                Ok(report)
            }
            Err(e) if e.is_cancelled() => {
                self.enter(InstallationState::Cancelled);
                info!("Installation cancelled");
                self.channel.emit_cancelled("Installation cancelled");
                Err(e)
            }
            Err(e) => {
                self.enter(InstallationState::Failed);
                warn!(error = %e, "Installation failed");
                self.channel.emit_error(&format!("Installation failed: {}", e));
                Err(e)
            }
        }
    }

    async fn run(&self, cancel: &CancelToken) -> InstallResult<InstallReport> {
        self.advance(InstallationState::FetchingRelease, cancel)?;
        let (release, used_fallback) = self.resolve_release(cancel).await?;

        let temp_dir = self.config.temp_dir();
        tokio::fs::create_dir_all(&temp_dir)
            .await
            .map_err(|e| InstallError::io(&temp_dir, e))?;
        let artifact = temp_dir.join(&release.file_name);

        let used_cache = self.check_cache(&artifact, &release, cancel).await?;
        let artifact_bytes = if used_cache {
            file_size(&artifact).await
        } else {
            self.fetch_verified(&release, &artifact, cancel).await?
        };

        self.advance(InstallationState::Extracting, cancel)?;
        let install_dir = self.config.install_dir();
        let located = self.archive.install(&artifact, &install_dir, cancel).await;

        // Root lookup runs inside `install`; record its phase once extraction is done.
        if matches!(&located, Ok(_) | Err(InstallError::ProductRootNotFound { .. })) {
            self.advance(InstallationState::LocatingRoot, cancel)?;
        }
        let root_dir = located?;
        self.channel
            .emit_log(&format!("Product root: {}", root_dir.display()));

        self.advance(InstallationState::Configuring, cancel)?;
        self.configure(&install_dir, &root_dir, &release).await;

        if !self.config.keep_archives {
            remove_file_quietly(&artifact).await;
        }

        Ok(InstallReport {
            release,
            used_fallback,
            used_cache,
            artifact_bytes,
            install_dir,
            root_dir,
            states: Vec::new(),
        })
    }

    /// Check the token, then record and announce `state`.
    fn advance(&self, state: InstallationState, cancel: &CancelToken) -> InstallResult<()> {
        cancel.check()?;
        self.enter(state);
        debug!(state = %state, "Installation state changed");
        self.channel.emit_log(&format!("{}...", state.name()));
        self.channel.emit_progress(state.progress(), state.name());
        Ok(())
    }

    fn enter(&self, state: InstallationState) {
        self.history.lock().push(state);
    }

    async fn resolve_release(
        &self,
        cancel: &CancelToken,
    ) -> InstallResult<(ReleaseDescriptor, bool)> {
        let lookup = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(InstallError::Cancelled),
            result = self.releases.latest() => result,
        };

        match lookup {
            Ok(release) => {
                self.channel
                    .emit_log(&format!("Latest release: {}", release.version));
                Ok((release, false))
            }
            Err(e) => {
                let fallback = self.config.profile.fallback.clone();
                warn!(
                    error = %e,
                    fallback = %fallback.version,
                    "Release lookup failed; using fallback release"
                );
                self.channel.emit_log(&format!(
                    "Release lookup failed ({}); using {}",
                    e, fallback.version
                ));
                Ok((fallback, true))
            }
        }
    }

    /// Returns whether the cached artifact can be used as is.
    async fn check_cache(
        &self,
        artifact: &Path,
        release: &ReleaseDescriptor,
        cancel: &CancelToken,
    ) -> InstallResult<bool> {
        if !tokio::fs::try_exists(artifact).await.unwrap_or(false) {
            return Ok(false);
        }

        self.advance(InstallationState::CheckingCache, cancel)?;

        let valid = match &release.digest {
            Some(digest) => verify_blocking(artifact, digest).await,
            None if self.config.require_digest => false,
            None => probably_complete(artifact),
        };

        if valid {
            info!(path = %artifact.display(), "Reusing cached artifact");
            self.channel.emit_log("Cached download is valid, skipping download");
        } else {
            info!(path = %artifact.display(), "Discarding stale artifact");
            self.channel.emit_log("Cached download is invalid, downloading again");
            tokio::fs::remove_file(artifact)
                .await
                .map_err(|e| InstallError::io(artifact, e))?;
        }
        Ok(valid)
    }

    /// Download and, when a digest is published, verify with one retry.
    async fn fetch_verified(
        &self,
        release: &ReleaseDescriptor,
        artifact: &Path,
        cancel: &CancelToken,
    ) -> InstallResult<u64> {
        self.advance(InstallationState::Downloading, cancel)?;
        let mut bytes = self.download(release, artifact, cancel).await?;

        let Some(digest) = &release.digest else {
            return Ok(bytes);
        };

        if let Err(e) = checksum_blocking(artifact, digest).await {
            warn!(error = %e, "Downloaded artifact failed verification; downloading again");
            self.channel
                .emit_log("Integrity check failed, downloading again");
            remove_file_quietly(artifact).await;

            cancel.check()?;
            bytes = self.download(release, artifact, cancel).await?;
            if let Err(e) = checksum_blocking(artifact, digest).await {
                remove_file_quietly(artifact).await;
                return Err(e);
            }
        }

        self.channel.emit_log("Integrity check passed");
        Ok(bytes)
    }

    async fn download(
        &self,
        release: &ReleaseDescriptor,
        artifact: &Path,
        cancel: &CancelToken,
    ) -> InstallResult<u64> {
        if tokio::fs::try_exists(partial_path(artifact)).await.unwrap_or(false) {
            info!(path = %artifact.display(), "Resuming interrupted download");
            self.channel
                .emit_log(&format!("Resuming interrupted download of {}", release.file_name));
        } else {
            self.channel
                .emit_log(&format!("Downloading {}", release.file_name));
        }

        let channel = Arc::clone(&self.channel);
        let announced = release.size_bytes;
        let on_progress: ProgressCallback = Box::new(move |downloaded, total| {
            let Some(total) = total.or(announced).filter(|t| *t > 0) else {
                return;
            };
            let ratio = (downloaded as f64 / total as f64).min(1.0);
            let percent = DOWNLOAD_START + ratio * (DOWNLOAD_END - DOWNLOAD_START);
            channel.emit_progress(
                percent,
                &format!(
                    "Downloading {:.1} / {:.1} MiB",
                    downloaded as f64 / 1_048_576.0,
                    total as f64 / 1_048_576.0
                ),
            );
        });

        self.downloader
            .download(&release.download_url, artifact, on_progress, cancel)
            .await
    }

    async fn configure(&self, install_dir: &Path, root_dir: &Path, release: &ReleaseDescriptor) {
        let Some(hook) = &self.hook else {
            debug!("No configuration hook configured");
            return;
        };

        match hook.configure(install_dir, root_dir, release).await {
            Ok(()) => self.channel.emit_log("Configuration updated"),
            Err(e) => {
                warn!(error = %e, "Configuration hook failed");
                self.channel
                    .emit_log(&format!("Configuration hook failed: {}", e));
            }
        }
    }

    /// Remove the install directory and stale downloaded artifacts.
    ///
    /// Not cancellable. Succeeds without doing anything when nothing is
    /// installed.
    pub async fn uninstall(&self) -> InstallResult<UninstallReport> {
        let install_dir = self.config.install_dir();
        let mut report = UninstallReport::default();

        if tokio::fs::try_exists(&install_dir).await.unwrap_or(false) {
            self.channel
                .emit_log(&format!("Removing {}", install_dir.display()));
            tokio::fs::remove_dir_all(&install_dir)
                .await
                .map_err(|e| InstallError::io(&install_dir, e))?;
            report.removed_install = true;
        } else {
            debug!(dir = %install_dir.display(), "Nothing to uninstall");
        }

        report.removed_artifacts = self.remove_stale_artifacts().await;
        self.channel.emit_log("Uninstall complete");
        Ok(report)
    }

    async fn remove_stale_artifacts(&self) -> Vec<PathBuf> {
        let temp_dir = self.config.temp_dir();
        let pattern = format!(
            "{}/{}",
            glob::Pattern::escape(&temp_dir.to_string_lossy()),
            self.config.profile.artifact_pattern
        );

        let entries = match glob::glob(&pattern) {
            Ok(paths) => paths,
            Err(e) => {
                warn!(pattern = %pattern, error = %e, "Invalid artifact pattern");
                return Vec::new();
            }
        };

        let mut removed = Vec::new();
        for path in entries.flatten() {
            if !path.is_file() {
                continue;
            }
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {
                    debug!(path = %path.display(), "Removed stale artifact");
                    removed.push(path);
                }
                Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove artifact"),
            }
        }
        removed
    }
}

async fn verify_blocking(path: &Path, digest: &str) -> bool {
    let path = path.to_path_buf();
    let digest = digest.to_string();
    tokio::task::spawn_blocking(move || checksum::verify(&path, &digest))
        .await
        .unwrap_or(false)
}

async fn checksum_blocking(path: &Path, digest: &str) -> InstallResult<()> {
    let owned = path.to_path_buf();
    let digest = digest.to_string();
    tokio::task::spawn_blocking(move || checksum::verify_checksum(&owned, &digest))
        .await
        .map_err(|e| InstallError::io(path, std::io::Error::other(e)))?
}

async fn file_size(path: &Path) -> u64 {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.len())
        .unwrap_or(0)
}

async fn remove_file_quietly(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(path = %path.display(), error = %e, "Failed to remove file");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::{ControlEvent, EventChannel};
    use crate::installer::profile::ProductProfile;
    use crate::installer::traits::BoxFuture;
    use sha2::{Digest, Sha256};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;
    use tokio::sync::mpsc::UnboundedReceiver;

    use InstallationState::*;

    const ASSET: &str = "ComfyUI_windows_portable_nvidia.7z";

    fn payload() -> Vec<u8> {
        (0..4096u32).flat_map(|i| i.to_le_bytes()).collect()
    }

    fn digest_of(data: &[u8]) -> String {
        format!("sha256:{:x}", Sha256::digest(data))
    }

    struct FakeReleases {
        release: Option<ReleaseDescriptor>,
    }

    impl ReleaseSource for FakeReleases {
        fn latest(&self) -> BoxFuture<'_, InstallResult<ReleaseDescriptor>> {
            let result = self.release.clone().ok_or(InstallError::Network {
                url: "registry".to_string(),
                reason: "timed out".to_string(),
            });
            Box::pin(async move { result })
        }
    }

    /// Writes a fixed body; the first `corrupt_first` calls write garbage.
    struct FakeDownloader {
        body: Vec<u8>,
        calls: AtomicUsize,
        corrupt_first: usize,
        cancel_on_call: bool,
    }

    impl FakeDownloader {
        fn new(body: Vec<u8>) -> Self {
            Self {
                body,
                calls: AtomicUsize::new(0),
                corrupt_first: 0,
                cancel_on_call: false,
            }
        }
    }

    impl ArtifactDownloader for FakeDownloader {
        fn download<'a>(
            &'a self,
            _url: &'a str,
            dest: &'a Path,
            on_progress: ProgressCallback,
            cancel: &'a CancelToken,
        ) -> BoxFuture<'a, InstallResult<u64>> {
            Box::pin(async move {
                let call = self.calls.fetch_add(1, Ordering::SeqCst);
                if self.cancel_on_call {
                    cancel.cancel();
                    return Err(InstallError::Cancelled);
                }
                let body = if call < self.corrupt_first {
                    vec![0u8; self.body.len()]
                } else {
                    self.body.clone()
                };
                std::fs::write(dest, &body).unwrap();
                on_progress(body.len() as u64, Some(body.len() as u64));
                Ok(body.len() as u64)
            })
        }
    }

    struct FakeExtractor;

    impl ArchiveExtractor for FakeExtractor {
        fn extract<'a>(
            &'a self,
            _archive: &'a Path,
            dest_dir: &'a Path,
            _cancel: &'a CancelToken,
        ) -> BoxFuture<'a, InstallResult<()>> {
            Box::pin(async move {
                std::fs::create_dir_all(dest_dir.join("ComfyUI_windows_portable")).unwrap();
                Ok(())
            })
        }
    }

    /// Extracts a tree with no recognizable product root.
    struct RootlessExtractor;

    impl ArchiveExtractor for RootlessExtractor {
        fn extract<'a>(
            &'a self,
            _archive: &'a Path,
            dest_dir: &'a Path,
            _cancel: &'a CancelToken,
        ) -> BoxFuture<'a, InstallResult<()>> {
            Box::pin(async move {
                std::fs::create_dir_all(dest_dir.join("unrelated")).unwrap();
                Ok(())
            })
        }
    }

    struct FailingHook {
        calls: AtomicUsize,
    }

    impl ConfigurationHook for FailingHook {
        fn configure<'a>(
            &'a self,
            _install_dir: &'a Path,
            _root_dir: &'a Path,
            _release: &'a ReleaseDescriptor,
        ) -> BoxFuture<'a, InstallResult<()>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Box::pin(async {
                Err(InstallError::Hook {
                    url: "http://127.0.0.1/configure".to_string(),
                    reason: "refused".to_string(),
                })
            })
        }
    }

    fn release(digest: Option<String>) -> ReleaseDescriptor {
        let mut release = ReleaseDescriptor::new("v9.9.9", "http://example.com/a.7z", ASSET);
        release.digest = digest;
        release
    }

    fn orchestrator(
        temp: &TempDir,
        releases: FakeReleases,
        downloader: Arc<FakeDownloader>,
    ) -> (InstallationOrchestrator, UnboundedReceiver<ControlEvent>) {
        let (channel, rx) = EventChannel::new();
        let profile = ProductProfile::comfyui_portable().with_fallback(ReleaseDescriptor::new(
            "v0.0.1",
            "http://example.com/fallback.7z",
            ASSET,
        ));
        let config = InstallerConfig::new(temp.path().to_path_buf()).with_profile(profile);
        let orchestrator = InstallationOrchestrator::new(config, Arc::new(channel))
            .unwrap()
            .with_release_source(Arc::new(releases))
            .with_downloader(downloader)
            .with_extractor(Arc::new(FakeExtractor));
        (orchestrator, rx)
    }

    fn drain(rx: &mut UnboundedReceiver<ControlEvent>) -> Vec<ControlEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_fresh_install_with_digest() {
        let temp = TempDir::new().unwrap();
        let body = payload();
        let downloader = Arc::new(FakeDownloader::new(body.clone()));
        let (orch, _rx) = orchestrator(
            &temp,
            FakeReleases {
                release: Some(release(Some(digest_of(&body)))),
            },
            Arc::clone(&downloader),
        );

        let report = orch.install(&CancelToken::new()).await.unwrap();

        assert_eq!(
            report.states,
            vec![
                Idle,
                FetchingRelease,
                Downloading,
                Extracting,
                LocatingRoot,
                Configuring,
                Completed
            ]
        );
        assert!(!report.used_cache);
        assert!(!report.used_fallback);
        assert_eq!(report.artifact_bytes, body.len() as u64);
        assert_eq!(
            report.root_dir,
            temp.path().join("comfyui/ComfyUI_windows_portable")
        );
        assert!(orch.is_installed());
        assert!(temp.path().join("temp").join(ASSET).exists());
    }

    #[tokio::test]
    async fn test_valid_cache_skips_download() {
        let temp = TempDir::new().unwrap();
        let body = payload();
        std::fs::create_dir_all(temp.path().join("temp")).unwrap();
        std::fs::write(temp.path().join("temp").join(ASSET), &body).unwrap();

        let downloader = Arc::new(FakeDownloader::new(body.clone()));
        let (orch, _rx) = orchestrator(
            &temp,
            FakeReleases {
                release: Some(release(Some(digest_of(&body).to_uppercase()))),
            },
            Arc::clone(&downloader),
        );

        let report = orch.install(&CancelToken::new()).await.unwrap();

        assert_eq!(
            report.states,
            vec![
                Idle,
                FetchingRelease,
                CheckingCache,
                Extracting,
                LocatingRoot,
                Configuring,
                Completed
            ]
        );
        assert!(report.used_cache);
        assert_eq!(downloader.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_stale_cache_is_replaced() {
        let temp = TempDir::new().unwrap();
        let body = payload();
        std::fs::create_dir_all(temp.path().join("temp")).unwrap();
        std::fs::write(temp.path().join("temp").join(ASSET), b"stale").unwrap();

        let downloader = Arc::new(FakeDownloader::new(body.clone()));
        let (orch, _rx) = orchestrator(
            &temp,
            FakeReleases {
                release: Some(release(Some(digest_of(&body)))),
            },
            Arc::clone(&downloader),
        );

        let report = orch.install(&CancelToken::new()).await.unwrap();

        assert_eq!(&report.states[..4], &[Idle, FetchingRelease, CheckingCache, Downloading]);
        assert_eq!(downloader.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_small_cache_without_digest_is_redownloaded() {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir_all(temp.path().join("temp")).unwrap();
        std::fs::write(temp.path().join("temp").join(ASSET), b"tiny").unwrap();

        let downloader = Arc::new(FakeDownloader::new(payload()));
        let (orch, _rx) = orchestrator(
            &temp,
            FakeReleases {
                release: Some(release(None)),
            },
            Arc::clone(&downloader),
        );

        let report = orch.install(&CancelToken::new()).await.unwrap();
        assert!(!report.used_cache);
        assert_eq!(downloader.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_registry_failure_uses_fallback() {
        let temp = TempDir::new().unwrap();
        let downloader = Arc::new(FakeDownloader::new(payload()));
        let (orch, mut rx) = orchestrator(&temp, FakeReleases { release: None }, downloader);

        let report = orch.install(&CancelToken::new()).await.unwrap();

        assert!(report.used_fallback);
        assert_eq!(report.release.version, "v0.0.1");
        assert!(drain(&mut rx)
            .iter()
            .any(|e| matches!(e, ControlEvent::Log { message } if message.contains("v0.0.1"))));
    }

    #[tokio::test]
    async fn test_integrity_mismatch_redownloads_once() {
        let temp = TempDir::new().unwrap();
        let body = payload();
        let mut downloader = FakeDownloader::new(body.clone());
        downloader.corrupt_first = 1;
        let downloader = Arc::new(downloader);
        let (orch, _rx) = orchestrator(
            &temp,
            FakeReleases {
                release: Some(release(Some(digest_of(&body)))),
            },
            Arc::clone(&downloader),
        );

        orch.install(&CancelToken::new()).await.unwrap();
        assert_eq!(downloader.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_persistent_integrity_mismatch_fails() {
        let temp = TempDir::new().unwrap();
        let body = payload();
        let mut downloader = FakeDownloader::new(body.clone());
        downloader.corrupt_first = 2;
        let downloader = Arc::new(downloader);
        let (orch, mut rx) = orchestrator(
            &temp,
            FakeReleases {
                release: Some(release(Some(digest_of(&body)))),
            },
            Arc::clone(&downloader),
        );

        let result = orch.install(&CancelToken::new()).await;

        assert!(matches!(result, Err(InstallError::Integrity { .. })));
        assert_eq!(orch.state(), Failed);
        assert!(!temp.path().join("temp").join(ASSET).exists());
        assert!(drain(&mut rx)
            .iter()
            .any(|e| matches!(e, ControlEvent::Error { .. })));
    }

    #[tokio::test]
    async fn test_cancel_before_start() {
        let temp = TempDir::new().unwrap();
        let downloader = Arc::new(FakeDownloader::new(payload()));
        let (orch, mut rx) = orchestrator(
            &temp,
            FakeReleases {
                release: Some(release(None)),
            },
            Arc::clone(&downloader),
        );

        let cancel = CancelToken::new();
        cancel.cancel();
        let result = orch.install(&cancel).await;

        assert!(matches!(result, Err(InstallError::Cancelled)));
        assert_eq!(orch.history(), vec![Idle, Cancelled]);
        assert_eq!(downloader.calls.load(Ordering::SeqCst), 0);

        let events = drain(&mut rx);
        assert!(events
            .iter()
            .any(|e| matches!(e, ControlEvent::Cancelled { .. })));
        assert!(!events.iter().any(|e| matches!(e, ControlEvent::Error { .. })));
    }

    #[tokio::test]
    async fn test_cancel_during_download() {
        let temp = TempDir::new().unwrap();
        let mut downloader = FakeDownloader::new(payload());
        downloader.cancel_on_call = true;
        let (orch, mut rx) = orchestrator(
            &temp,
            FakeReleases {
                release: Some(release(None)),
            },
            Arc::new(downloader),
        );

        let result = orch.install(&CancelToken::new()).await;

        assert!(matches!(result, Err(InstallError::Cancelled)));
        assert_eq!(
            orch.history(),
            vec![Idle, FetchingRelease, Downloading, Cancelled]
        );
        assert!(!orch.is_installed());
        assert!(!drain(&mut rx)
            .iter()
            .any(|e| matches!(e, ControlEvent::Error { .. })));
    }

    #[tokio::test]
    async fn test_interrupted_transfer_is_not_taken_for_cache() {
        let temp = TempDir::new().unwrap();
        let staging = temp.path().join("temp");
        std::fs::create_dir_all(&staging).unwrap();
        // Large enough to pass the size heuristic if it were mistaken for a finished artifact.
        std::fs::write(partial_path(&staging.join(ASSET)), vec![7u8; 2 * 1024 * 1024]).unwrap();

        let downloader = Arc::new(FakeDownloader::new(payload()));
        let (orch, mut rx) = orchestrator(
            &temp,
            FakeReleases {
                release: Some(release(None)),
            },
            Arc::clone(&downloader),
        );

        let report = orch.install(&CancelToken::new()).await.unwrap();

        assert!(!report.used_cache);
        assert_eq!(&report.states[..3], &[Idle, FetchingRelease, Downloading]);
        assert_eq!(downloader.calls.load(Ordering::SeqCst), 1);
        assert!(drain(&mut rx).iter().any(
            |e| matches!(e, ControlEvent::Log { message } if message.starts_with("Resuming interrupted download"))
        ));
    }

    #[tokio::test]
    async fn test_missing_root_fails_in_locating_phase() {
        let temp = TempDir::new().unwrap();
        let (orch, _rx) = orchestrator(
            &temp,
            FakeReleases {
                release: Some(release(None)),
            },
            Arc::new(FakeDownloader::new(payload())),
        );
        let orch = orch.with_extractor(Arc::new(RootlessExtractor));

        let result = orch.install(&CancelToken::new()).await;

        assert!(matches!(result, Err(InstallError::ProductRootNotFound { .. })));
        assert_eq!(
            orch.history(),
            vec![
                Idle,
                FetchingRelease,
                Downloading,
                Extracting,
                LocatingRoot,
                Failed
            ]
        );
    }

    #[tokio::test]
    async fn test_hook_failure_is_not_fatal() {
        let temp = TempDir::new().unwrap();
        let hook = Arc::new(FailingHook {
            calls: AtomicUsize::new(0),
        });
        let (orch, _rx) = orchestrator(
            &temp,
            FakeReleases {
                release: Some(release(None)),
            },
            Arc::new(FakeDownloader::new(payload())),
        );
        let orch = orch.with_hook(Some(hook.clone() as Arc<dyn ConfigurationHook>));

        let report = orch.install(&CancelToken::new()).await.unwrap();

        assert_eq!(report.states.last(), Some(&Completed));
        assert_eq!(hook.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_discard_archive_when_not_kept() {
        let temp = TempDir::new().unwrap();
        let (channel, _rx) = EventChannel::new();
        let config = InstallerConfig::new(temp.path().to_path_buf()).with_keep_archives(false);
        let orch = InstallationOrchestrator::new(config, Arc::new(channel))
            .unwrap()
            .with_release_source(Arc::new(FakeReleases {
                release: Some(release(None)),
            }))
            .with_downloader(Arc::new(FakeDownloader::new(payload())))
            .with_extractor(Arc::new(FakeExtractor));

        orch.install(&CancelToken::new()).await.unwrap();
        assert!(!temp.path().join("temp").join(ASSET).exists());
    }

    #[tokio::test]
    async fn test_uninstall_absent_is_noop() {
        let temp = TempDir::new().unwrap();
        let (orch, _rx) = orchestrator(
            &temp,
            FakeReleases { release: None },
            Arc::new(FakeDownloader::new(Vec::new())),
        );

        let report = orch.uninstall().await.unwrap();
        assert_eq!(report, UninstallReport::default());
    }

    #[tokio::test]
    async fn test_uninstall_removes_install_and_matching_artifacts_only() {
        let temp = TempDir::new().unwrap();
        let staging = temp.path().join("temp");
        std::fs::create_dir_all(temp.path().join("comfyui/ComfyUI")).unwrap();
        std::fs::create_dir_all(&staging).unwrap();
        std::fs::write(staging.join(ASSET), b"a").unwrap();
        std::fs::write(staging.join("ComfyUI_old.7z"), b"b").unwrap();
        std::fs::write(staging.join("unrelated.bin"), b"c").unwrap();

        let (orch, _rx) = orchestrator(
            &temp,
            FakeReleases { release: None },
            Arc::new(FakeDownloader::new(Vec::new())),
        );
        assert!(orch.is_installed());

        let report = orch.uninstall().await.unwrap();

        assert!(report.removed_install);
        assert_eq!(report.removed_artifacts.len(), 2);
        assert!(!temp.path().join("comfyui").exists());
        assert!(staging.join("unrelated.bin").exists());
        assert!(!orch.is_installed());
    }
}
