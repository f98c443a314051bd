//! INI configuration file.
//!
//! ```text
//! [paths]
//! data_dir = /home/user/.local/share/enginekit
//!
//! [release]
//! endpoint = https://api.github.com/repos/comfyanonymous/ComfyUI/releases/latest
//! platform = linux
//! accelerator = nvidia
//!
//! [download]
//! max_retries = 3
//! timeout = 30
//! retry_delay = 3
//! require_digest = false
//! keep_archives = true
//!
//! [process]
//! settle_secs = 3
//! stop_timeout_secs = 10
//! kill_timeout_secs = 5
//! probe_command = nvidia-smi --query-gpu=name --format=csv,noheader
//!
//! [hook]
//! url = http://127.0.0.1:8000/configure
//! ```
//!
//! Missing keys keep their defaults. A missing file is the default
//! configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use ini::Ini;
use tracing::debug;

use super::error::{ConfigError, ConfigResult};
use super::keys::ConfigKey;
use crate::installer::{default_data_dir, DownloadOptions, InstallerConfig, ProductProfile};
use crate::process::{CommandProbe, SupervisorConfig, DEFAULT_PROBE_COMMAND};

/// Path of the configuration file (`<config dir>/enginekit/config.ini`).
pub fn config_file_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("enginekit")
        .join("config.ini")
}

/// `[paths]` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathsSettings {
    pub data_dir: PathBuf,
}

/// `[release]` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseSettings {
    pub endpoint: String,
    pub platform: String,
    pub accelerator: String,
}

/// `[download]` section. Durations are whole seconds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadSettings {
    pub max_retries: u32,
    pub timeout_secs: u64,
    pub retry_delay_secs: u64,
    pub require_digest: bool,
    pub keep_archives: bool,
}

/// `[process]` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessSettings {
    pub settle_secs: u64,
    pub stop_timeout_secs: u64,
    pub kill_timeout_secs: u64,
    pub probe_command: String,
}

/// `[hook]` section.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HookSettings {
    pub url: Option<String>,
}

/// Parsed configuration file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigFile {
    pub paths: PathsSettings,
    pub release: ReleaseSettings,
    pub download: DownloadSettings,
    pub process: ProcessSettings,
    pub hook: HookSettings,
}

impl Default for ConfigFile {
    fn default() -> Self {
        let profile = ProductProfile::default();
        let download = DownloadOptions::default();
        let process = SupervisorConfig::default();

        Self {
            paths: PathsSettings {
                data_dir: default_data_dir(),
            },
            release: ReleaseSettings {
                endpoint: profile.registry_url,
                platform: profile.platform,
                accelerator: profile.accelerator,
            },
            download: DownloadSettings {
                max_retries: download.max_retries,
                timeout_secs: download.timeout.as_secs(),
                retry_delay_secs: download.retry_delay.as_secs(),
                require_digest: false,
                keep_archives: true,
            },
            process: ProcessSettings {
                settle_secs: process.settle.as_secs(),
                stop_timeout_secs: process.stop_timeout.as_secs(),
                kill_timeout_secs: process.kill_timeout.as_secs(),
                probe_command: DEFAULT_PROBE_COMMAND.to_string(),
            },
            hook: HookSettings::default(),
        }
    }
}

impl ConfigFile {
    /// Load from the default location.
    pub fn load() -> ConfigResult<Self> {
        Self::load_from(&config_file_path())
    }

    /// Load from `path`. A missing file yields the defaults.
    pub fn load_from(path: &Path) -> ConfigResult<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "No configuration file, using defaults");
            return Ok(Self::default());
        }

        let ini = Ini::load_from_file(path).map_err(|e| match e {
            ini::Error::Io(source) => ConfigError::Io {
                path: path.to_path_buf(),
                source,
            },
            ini::Error::Parse(e) => ConfigError::Parse {
                path: path.to_path_buf(),
                reason: e.to_string(),
            },
        })?;

        Self::from_ini(&ini)
    }

    /// Build from parsed INI content.
    pub fn from_ini(ini: &Ini) -> ConfigResult<Self> {
        let mut config = Self::default();
        for key in ConfigKey::all() {
            let value = ini
                .section(Some(key.section()))
                .and_then(|section| section.get(key.key_name()));
            if let Some(value) = value {
                key.set(&mut config, value)?;
            }
        }
        Ok(config)
    }

    /// Render as INI.
    pub fn to_ini(&self) -> Ini {
        let mut ini = Ini::new();
        for key in ConfigKey::all() {
            let value = key.get(self);
            if !value.is_empty() {
                ini.with_section(Some(key.section()))
                    .set(key.key_name(), value);
            }
        }
        ini
    }

    /// Save to the default location.
    pub fn save(&self) -> ConfigResult<()> {
        self.save_to(&config_file_path())
    }

    /// Save to `path`, creating parent directories.
    pub fn save_to(&self, path: &Path) -> ConfigResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| ConfigError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        self.to_ini()
            .write_to_file(path)
            .map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })
    }

    /// Product profile with the `[release]` overrides applied.
    pub fn profile(&self) -> ProductProfile {
        ProductProfile::default()
            .with_registry_url(&self.release.endpoint)
            .with_platform(&self.release.platform)
            .with_accelerator(&self.release.accelerator)
    }

    /// Installer configuration.
    pub fn installer_config(&self) -> InstallerConfig {
        let download = DownloadOptions::default()
            .with_max_retries(self.download.max_retries)
            .with_timeout(Duration::from_secs(self.download.timeout_secs))
            .with_retry_delay(Duration::from_secs(self.download.retry_delay_secs));

        let config = InstallerConfig::new(self.paths.data_dir.clone())
            .with_profile(self.profile())
            .with_download(download)
            .with_require_digest(self.download.require_digest)
            .with_keep_archives(self.download.keep_archives);

        match &self.hook.url {
            Some(url) => config.with_hook_url(url),
            None => config,
        }
    }

    /// Supervisor configuration.
    pub fn supervisor_config(&self) -> SupervisorConfig {
        SupervisorConfig::default()
            .with_settle(Duration::from_secs(self.process.settle_secs))
            .with_stop_timeout(Duration::from_secs(self.process.stop_timeout_secs))
            .with_kill_timeout(Duration::from_secs(self.process.kill_timeout_secs))
    }

    /// Accelerator probe. An empty probe command disables detection.
    pub fn probe(&self) -> Option<CommandProbe> {
        CommandProbe::from_command_line(&self.process.probe_command)
    }
}
