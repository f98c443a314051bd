//! Named configuration keys for `config get/set/list`.

use std::path::PathBuf;
use std::str::FromStr;

use super::error::{ConfigError, ConfigResult};
use super::file::ConfigFile;

/// A `section.key` entry of the configuration file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigKey {
    PathsDataDir,
    ReleaseEndpoint,
    ReleasePlatform,
    ReleaseAccelerator,
    DownloadMaxRetries,
    DownloadTimeout,
    DownloadRetryDelay,
    DownloadRequireDigest,
    DownloadKeepArchives,
    ProcessSettleSecs,
    ProcessStopTimeoutSecs,
    ProcessKillTimeoutSecs,
    ProcessProbeCommand,
    HookUrl,
}

const ALL_KEYS: &[ConfigKey] = &[
    ConfigKey::PathsDataDir,
    ConfigKey::ReleaseEndpoint,
    ConfigKey::ReleasePlatform,
    ConfigKey::ReleaseAccelerator,
    ConfigKey::DownloadMaxRetries,
    ConfigKey::DownloadTimeout,
    ConfigKey::DownloadRetryDelay,
    ConfigKey::DownloadRequireDigest,
    ConfigKey::DownloadKeepArchives,
    ConfigKey::ProcessSettleSecs,
    ConfigKey::ProcessStopTimeoutSecs,
    ConfigKey::ProcessKillTimeoutSecs,
    ConfigKey::ProcessProbeCommand,
    ConfigKey::HookUrl,
];

impl ConfigKey {
    /// Every key, grouped by section in file order.
    pub fn all() -> &'static [ConfigKey] {
        ALL_KEYS
    }

    /// Full `section.key` name.
    pub fn name(&self) -> String {
        format!("{}.{}", self.section(), self.key_name())
    }

    /// INI section.
    pub fn section(&self) -> &'static str {
        match self {
            Self::PathsDataDir => "paths",
            Self::ReleaseEndpoint | Self::ReleasePlatform | Self::ReleaseAccelerator => "release",
            Self::DownloadMaxRetries
            | Self::DownloadTimeout
            | Self::DownloadRetryDelay
            | Self::DownloadRequireDigest
            | Self::DownloadKeepArchives => "download",
            Self::ProcessSettleSecs
            | Self::ProcessStopTimeoutSecs
            | Self::ProcessKillTimeoutSecs
            | Self::ProcessProbeCommand => "process",
            Self::HookUrl => "hook",
        }
    }

    /// Key within its section.
    pub fn key_name(&self) -> &'static str {
        match self {
            Self::PathsDataDir => "data_dir",
            Self::ReleaseEndpoint => "endpoint",
            Self::ReleasePlatform => "platform",
            Self::ReleaseAccelerator => "accelerator",
            Self::DownloadMaxRetries => "max_retries",
            Self::DownloadTimeout => "timeout",
            Self::DownloadRetryDelay => "retry_delay",
            Self::DownloadRequireDigest => "require_digest",
            Self::DownloadKeepArchives => "keep_archives",
            Self::ProcessSettleSecs => "settle_secs",
            Self::ProcessStopTimeoutSecs => "stop_timeout_secs",
            Self::ProcessKillTimeoutSecs => "kill_timeout_secs",
            Self::ProcessProbeCommand => "probe_command",
            Self::HookUrl => "url",
        }
    }

    /// One-line explanation shown by `config list`.
    pub fn description(&self) -> &'static str {
        match self {
            Self::PathsDataDir => "install, download and log root",
            Self::ReleaseEndpoint => "registry URL returning the latest release",
            Self::ReleasePlatform => "platform tag matched in asset names",
            Self::ReleaseAccelerator => "accelerator tag matched in asset names (empty: platform only)",
            Self::DownloadMaxRetries => "retries after the first attempt",
            Self::DownloadTimeout => "connect and stall timeout, seconds",
            Self::DownloadRetryDelay => "pause between attempts, seconds",
            Self::DownloadRequireDigest => "reject cached archives without a published digest",
            Self::DownloadKeepArchives => "keep the archive after a successful install",
            Self::ProcessSettleSecs => "seconds a start must survive to count as running",
            Self::ProcessStopTimeoutSecs => "wait after a graceful stop, seconds",
            Self::ProcessKillTimeoutSecs => "wait after a forced stop, seconds",
            Self::ProcessProbeCommand => "accelerator query command (empty: skip detection)",
            Self::HookUrl => "endpoint told where the runtime was installed",
        }
    }

    /// Current value as text. Empty when unset.
    pub fn get(&self, config: &ConfigFile) -> String {
        match self {
            Self::PathsDataDir => config.paths.data_dir.display().to_string(),
            Self::ReleaseEndpoint => config.release.endpoint.clone(),
            Self::ReleasePlatform => config.release.platform.clone(),
            Self::ReleaseAccelerator => config.release.accelerator.clone(),
            Self::DownloadMaxRetries => config.download.max_retries.to_string(),
            Self::DownloadTimeout => config.download.timeout_secs.to_string(),
            Self::DownloadRetryDelay => config.download.retry_delay_secs.to_string(),
            Self::DownloadRequireDigest => config.download.require_digest.to_string(),
            Self::DownloadKeepArchives => config.download.keep_archives.to_string(),
            Self::ProcessSettleSecs => config.process.settle_secs.to_string(),
            Self::ProcessStopTimeoutSecs => config.process.stop_timeout_secs.to_string(),
            Self::ProcessKillTimeoutSecs => config.process.kill_timeout_secs.to_string(),
            Self::ProcessProbeCommand => config.process.probe_command.clone(),
            Self::HookUrl => config.hook.url.clone().unwrap_or_default(),
        }
    }

    /// Parse `value` and store it.
    pub fn set(&self, config: &mut ConfigFile, value: &str) -> ConfigResult<()> {
        let value = value.trim();
        match self {
            Self::PathsDataDir => config.paths.data_dir = PathBuf::from(self.non_empty(value)?),
            Self::ReleaseEndpoint => config.release.endpoint = self.non_empty(value)?,
            Self::ReleasePlatform => config.release.platform = self.non_empty(value)?,
            Self::ReleaseAccelerator => config.release.accelerator = value.to_string(),
            Self::DownloadMaxRetries => config.download.max_retries = self.parse(value)?,
            Self::DownloadTimeout => config.download.timeout_secs = self.parse(value)?,
            Self::DownloadRetryDelay => config.download.retry_delay_secs = self.parse(value)?,
            Self::DownloadRequireDigest => config.download.require_digest = self.parse_bool(value)?,
            Self::DownloadKeepArchives => config.download.keep_archives = self.parse_bool(value)?,
            Self::ProcessSettleSecs => config.process.settle_secs = self.parse(value)?,
            Self::ProcessStopTimeoutSecs => config.process.stop_timeout_secs = self.parse(value)?,
            Self::ProcessKillTimeoutSecs => config.process.kill_timeout_secs = self.parse(value)?,
            Self::ProcessProbeCommand => config.process.probe_command = value.to_string(),
            Self::HookUrl => {
                config.hook.url = (!value.is_empty()).then(|| value.to_string());
            }
        }
        Ok(())
    }

    fn invalid(&self, value: &str, reason: impl Into<String>) -> ConfigError {
        ConfigError::InvalidValue {
            key: self.name(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }

    fn non_empty(&self, value: &str) -> ConfigResult<String> {
        if value.is_empty() {
            Err(self.invalid(value, "value must not be empty"))
        } else {
            Ok(value.to_string())
        }
    }

    fn parse<T>(&self, value: &str) -> ConfigResult<T>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        value.parse().map_err(|e: T::Err| self.invalid(value, e.to_string()))
    }

    fn parse_bool(&self, value: &str) -> ConfigResult<bool> {
        match value.to_ascii_lowercase().as_str() {
            "true" | "yes" | "on" | "1" => Ok(true),
            "false" | "no" | "off" | "0" => Ok(false),
            _ => Err(self.invalid(value, "expected true or false")),
        }
    }
}

impl FromStr for ConfigKey {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        ALL_KEYS
            .iter()
            .copied()
            .find(|key| key.name() == wanted)
            .ok_or_else(|| ConfigError::UnknownKey(s.to_string()))
    }
}

impl std::fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.section(), self.key_name())
    }
}
