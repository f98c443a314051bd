//! Caller-facing façade.
//!
//! [`EngineManager`] ties the installer and the supervisor together and
//! converts every failure into a structured, serializable result. Nothing
//! here returns `Err`; hosts render the result or forward it as JSON.
//!
//! ```ignore
//! let config = ConfigFile::load()?;
//! let manager = EngineManager::from_config(&config, Arc::new(TracingChannel))?;
//!
//! let result = manager.install().await;
//! if result.success {
//!     let started = manager.start_process().await;
//!     println!("{}", started.message);
//! }
//! ```

use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info};

use crate::cancel::CancelToken;
use crate::config::ConfigFile;
use crate::control::ControlChannel;
use crate::installer::{InstallResult, InstallationOrchestrator, InstallerConfig};
use crate::process::{
    platform_terminator, CapabilityProbe, ProcessError, ProcessStatus, ProcessSupervisor,
    StartOutcome, StaticProbe, StopOutcome, SupervisorConfig,
};

/// Outcome of an install, uninstall or cancel request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OperationResult {
    pub success: bool,
    pub message: String,
    pub error: Option<String>,
    pub cancelled: bool,
}

impl OperationResult {
    fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            error: None,
            cancelled: false,
        }
    }

    fn failed(message: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            error: Some(error.into()),
            cancelled: false,
        }
    }

    fn cancelled(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            error: None,
            cancelled: true,
        }
    }
}

/// Clears the in-flight install slot when the install ends or is dropped.
struct ActiveInstall<'a>(&'a Mutex<Option<CancelToken>>);

impl Drop for ActiveInstall<'_> {
    fn drop(&mut self) {
        *self.0.lock() = None;
    }
}

/// Installs, removes, starts and stops the managed runtime.
pub struct EngineManager {
    orchestrator: InstallationOrchestrator,
    supervisor: ProcessSupervisor,
    active_install: Mutex<Option<CancelToken>>,
}

impl EngineManager {
    /// Build from explicit configuration.
    pub fn new(
        installer: InstallerConfig,
        supervisor: SupervisorConfig,
        probe: Arc<dyn CapabilityProbe>,
        channel: Arc<dyn ControlChannel>,
    ) -> InstallResult<Self> {
        let profile = installer.profile.clone();
        let orchestrator = InstallationOrchestrator::new(installer, Arc::clone(&channel))?;
        let supervisor =
            ProcessSupervisor::new(supervisor, profile, probe, platform_terminator(), channel);
        Ok(Self::from_parts(orchestrator, supervisor))
    }

    /// Build from the configuration file.
    pub fn from_config(config: &ConfigFile, channel: Arc<dyn ControlChannel>) -> InstallResult<Self> {
        let probe: Arc<dyn CapabilityProbe> = match config.probe() {
            Some(probe) => Arc::new(probe),
            None => Arc::new(StaticProbe(false)),
        };
        Self::new(
            config.installer_config(),
            config.supervisor_config(),
            probe,
            channel,
        )
    }

    /// Build from already assembled components.
    pub fn from_parts(orchestrator: InstallationOrchestrator, supervisor: ProcessSupervisor) -> Self {
        Self {
            orchestrator,
            supervisor,
            active_install: Mutex::new(None),
        }
    }

    /// The installer.
    pub fn orchestrator(&self) -> &InstallationOrchestrator {
        &self.orchestrator
    }

    /// The process supervisor.
    pub fn supervisor(&self) -> &ProcessSupervisor {
        &self.supervisor
    }

    /// Whether an install is running in this process.
    pub fn install_in_progress(&self) -> bool {
        self.active_install.lock().is_some()
    }

    /// Install the latest release with a fresh cancellation token.
    ///
    /// A second call while an install is in flight is rejected.
    pub async fn install(&self) -> OperationResult {
        let token = {
            let mut active = self.active_install.lock();
            if active.is_some() {
                return OperationResult::failed(
                    "An installation is already in progress",
                    "install already running",
                );
            }
            let token = CancelToken::new();
            *active = Some(token.clone());
            token
        };
        let _active = ActiveInstall(&self.active_install);

        match self.orchestrator.install(&token).await {
            Ok(report) => {
                let mut message = format!(
                    "Installed {} {} at {}",
                    self.orchestrator.config().profile.name,
                    report.release.version,
                    report.root_dir.display()
                );
                if report.used_fallback {
                    message.push_str(" (release registry unavailable, used fallback release)");
                }
                OperationResult::ok(message)
            }
            Err(e) if e.is_cancelled() => OperationResult::cancelled("Installation cancelled"),
            Err(e) => OperationResult::failed("Installation failed", e.to_string()),
        }
    }

    /// Cancel the in-flight install, if any.
    pub fn cancel_install(&self) -> OperationResult {
        match self.active_install.lock().as_ref() {
            Some(token) => {
                info!("Cancelling installation");
                token.cancel();
                OperationResult::ok("Cancellation requested")
            }
            None => {
                debug!("Cancel requested with no installation running");
                OperationResult::failed("No installation in progress", "nothing to cancel")
            }
        }
    }

    /// Remove the installation and stale downloads.
    ///
    /// Refused while an install or the managed process is running.
    pub async fn uninstall(&self) -> OperationResult {
        if self.install_in_progress() {
            return OperationResult::failed(
                "Cannot uninstall while an installation is in progress",
                "install running",
            );
        }
        if self.supervisor.status().running {
            return OperationResult::failed(
                "Stop the running process before uninstalling",
                "process running",
            );
        }

        match self.orchestrator.uninstall().await {
            Ok(report) if report.removed_install => OperationResult::ok(format!(
                "Removed {} ({} stale download(s) deleted)",
                self.orchestrator.config().install_dir().display(),
                report.removed_artifacts.len()
            )),
            Ok(report) => OperationResult::ok(format!(
                "Nothing installed ({} stale download(s) deleted)",
                report.removed_artifacts.len()
            )),
            Err(e) => OperationResult::failed("Uninstall failed", e.to_string()),
        }
    }

    /// Whether the product root can be found on disk.
    pub fn is_installed(&self) -> bool {
        self.orchestrator.is_installed()
    }

    /// Start the runtime from the installed product root.
    pub async fn start_process(&self) -> StartOutcome {
        match self.orchestrator.root_dir() {
            Some(root) => self.supervisor.start(&root).await,
            None => StartOutcome {
                success: false,
                message: ProcessError::NotInstalled.to_string(),
                mode: None,
                pid: None,
            },
        }
    }

    /// Stop the runtime.
    pub async fn stop_process(&self) -> StopOutcome {
        self.supervisor.stop().await
    }

    /// Current process state.
    pub fn process_status(&self) -> ProcessStatus {
        self.supervisor.status()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::TracingChannel;
    use crate::installer::{
        ArchiveExtractor, ArtifactDownloader, BoxFuture, InstallError, ProductProfile,
        ProgressCallback, ReleaseDescriptor, ReleaseSource,
    };
    use std::path::Path;
    use std::time::Duration;
    use tempfile::TempDir;

    struct FixedRelease;

    impl ReleaseSource for FixedRelease {
        fn latest(&self) -> BoxFuture<'_, InstallResult<ReleaseDescriptor>> {
            Box::pin(async {
                Ok(ReleaseDescriptor::new(
                    "v1.0.0",
                    "http://127.0.0.1:9/ComfyUI.7z",
                    "ComfyUI.7z",
                ))
            })
        }
    }

    /// Writes a small file, or blocks until cancelled.
    struct Downloader {
        block: bool,
    }

    impl ArtifactDownloader for Downloader {
        fn download<'a>(
            &'a self,
            _url: &'a str,
            dest: &'a Path,
            _on_progress: ProgressCallback,
            cancel: &'a CancelToken,
        ) -> BoxFuture<'a, InstallResult<u64>> {
            Box::pin(async move {
                if self.block {
                    cancel.cancelled().await;
                    return Err(InstallError::Cancelled);
                }
                std::fs::write(dest, b"archive").unwrap();
                Ok(7)
            })
        }
    }

    struct Extractor;

    impl ArchiveExtractor for Extractor {
        fn extract<'a>(
            &'a self,
            _archive: &'a Path,
            dest_dir: &'a Path,
            _cancel: &'a CancelToken,
        ) -> BoxFuture<'a, InstallResult<()>> {
            Box::pin(async move {
                let root = dest_dir.join("ComfyUI_portable");
                std::fs::create_dir_all(&root).unwrap();
                std::fs::write(root.join("run_cpu.sh"), "sleep 30\n").unwrap();
                Ok(())
            })
        }
    }

    fn manager(temp: &TempDir, block: bool) -> EngineManager {
        let mut profile = ProductProfile::comfyui_portable();
        profile.cpu_scripts = vec!["run_cpu.sh".to_string()];
        profile.gpu_scripts = vec!["run_gpu.sh".to_string()];

        let channel: Arc<dyn ControlChannel> = Arc::new(TracingChannel);
        let config = InstallerConfig::new(temp.path().to_path_buf()).with_profile(profile.clone());
        let orchestrator = InstallationOrchestrator::new(config, Arc::clone(&channel))
            .unwrap()
            .with_release_source(Arc::new(FixedRelease))
            .with_downloader(Arc::new(Downloader { block }))
            .with_extractor(Arc::new(Extractor));
        let supervisor = ProcessSupervisor::new(
            SupervisorConfig::default().with_settle(Duration::from_millis(300)),
            profile,
            Arc::new(StaticProbe(false)),
            platform_terminator(),
            channel,
        );
        EngineManager::from_parts(orchestrator, supervisor)
    }

    #[tokio::test]
    async fn test_install_and_uninstall() {
        let temp = TempDir::new().unwrap();
        let manager = manager(&temp, false);
        assert!(!manager.is_installed());

        let result = manager.install().await;
        assert!(result.success, "{:?}", result);
        assert!(result.message.contains("v1.0.0"));
        assert!(manager.is_installed());
        assert!(!manager.install_in_progress());

        let removed = manager.uninstall().await;
        assert!(removed.success);
        assert!(!manager.is_installed());

        let again = manager.uninstall().await;
        assert!(again.success);
        assert!(again.message.starts_with("Nothing installed"));
    }

    #[tokio::test]
    async fn test_concurrent_install_rejected_and_cancel() {
        let temp = TempDir::new().unwrap();
        let manager = Arc::new(manager(&temp, true));

        let worker = Arc::clone(&manager);
        let first = tokio::spawn(async move { worker.install().await });

        tokio::time::timeout(Duration::from_secs(5), async {
            while !manager.install_in_progress() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        let second = manager.install().await;
        assert!(!second.success);
        assert!(!second.cancelled);

        assert!(manager.cancel_install().success);
        let first = first.await.unwrap();
        assert!(first.cancelled);
        assert!(first.error.is_none());
        assert!(!manager.install_in_progress());
        assert!(!manager.cancel_install().success);
    }

    #[tokio::test]
    async fn test_start_requires_installation() {
        let temp = TempDir::new().unwrap();
        let manager = manager(&temp, false);

        let outcome = manager.start_process().await;
        assert!(!outcome.success);
        assert_eq!(outcome.message, "runtime is not installed");
        assert!(!manager.process_status().running);
        assert!(!manager.stop_process().await.success);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_uninstall_refused_while_running() {
        let temp = TempDir::new().unwrap();
        let manager = manager(&temp, false);
        assert!(manager.install().await.success);

        let started = manager.start_process().await;
        assert!(started.success, "{}", started.message);
        assert!(!manager.uninstall().await.success);

        assert!(manager.stop_process().await.success);
        assert!(manager.uninstall().await.success);
    }

    #[test]
    fn test_result_serializes() {
        let json = serde_json::to_value(OperationResult::cancelled("stopped")).unwrap();
        assert_eq!(json["cancelled"], true);
        assert_eq!(json["success"], false);
        assert!(json["error"].is_null());
    }
}
