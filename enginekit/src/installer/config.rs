//! Configuration for the runtime installer.

use std::path::PathBuf;
use std::time::Duration;

use super::download::DownloadOptions;
use super::profile::ProductProfile;

/// Configuration for the runtime installer.
#[derive(Debug, Clone)]
pub struct InstallerConfig {
    /// Root directory holding the install target and the staging area.
    pub data_dir: PathBuf,

    /// Product being installed.
    pub profile: ProductProfile,

    /// Download retry and timeout settings.
    pub download: DownloadOptions,

    /// Refuse the size heuristic when the release publishes no digest.
    ///
    /// With this set, a cached artifact without digest is always
    /// downloaded again.
    pub require_digest: bool,

    /// Whether to keep the downloaded archive after installation.
    pub keep_archives: bool,

    /// Endpoint of the configuration hook, if any.
    pub hook_url: Option<String>,
}

impl Default for InstallerConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            profile: ProductProfile::default(),
            download: DownloadOptions::default(),
            require_digest: false,
            keep_archives: true,
            hook_url: None,
        }
    }
}

impl InstallerConfig {
    /// Create a new configuration rooted at `data_dir`.
    pub fn new(data_dir: PathBuf) -> Self {
        Self {
            data_dir,
            ..Default::default()
        }
    }

    /// Directory the archive is extracted into.
    pub fn install_dir(&self) -> PathBuf {
        self.data_dir.join(&self.profile.install_dir_name)
    }

    /// Staging directory for downloads.
    pub fn temp_dir(&self) -> PathBuf {
        self.data_dir.join("temp")
    }

    /// Set the product profile.
    pub fn with_profile(mut self, profile: ProductProfile) -> Self {
        self.profile = profile;
        self
    }

    /// Set the download options.
    pub fn with_download(mut self, download: DownloadOptions) -> Self {
        self.download = download;
        self
    }

    /// Set the HTTP timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.download.timeout = timeout;
        self
    }

    /// Enable or disable the digest requirement.
    pub fn with_require_digest(mut self, require: bool) -> Self {
        self.require_digest = require;
        self
    }

    /// Enable or disable keeping downloaded archives.
    pub fn with_keep_archives(mut self, keep: bool) -> Self {
        self.keep_archives = keep;
        self
    }

    /// Set the configuration hook endpoint.
    pub fn with_hook_url(mut self, url: impl Into<String>) -> Self {
        self.hook_url = Some(url.into());
        self
    }
}

/// Default data directory (`<local data dir>/enginekit`).
pub fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("enginekit")
}
