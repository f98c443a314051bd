//! Persistent configuration.
//!
//! [`ConfigFile`] is stored as INI at [`config_file_path`] and converts into
//! the builder-style [`InstallerConfig`](crate::installer::InstallerConfig)
//! and [`SupervisorConfig`](crate::process::SupervisorConfig).

mod error;
mod file;
mod keys;

pub use error::{ConfigError, ConfigResult};
pub use file::{
    config_file_path, ConfigFile, DownloadSettings, HookSettings, PathsSettings,
    ProcessSettings, ReleaseSettings,
};
pub use keys::ConfigKey;
