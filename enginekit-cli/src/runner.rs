//! Shared command setup: configuration, logging and the engine manager.

use std::sync::Arc;

use enginekit::config::ConfigFile;
use enginekit::control::{ControlChannel, JsonLinesChannel};
use enginekit::logging::{self, WorkerGuard};
use enginekit::EngineManager;
use tracing::info;

use crate::error::CliError;

/// Environment variable selecting worker output.
pub const WORKER_ENV: &str = "ENGINEKIT_WORKER";

/// Whether the environment asks for worker output.
pub fn worker_from_env() -> bool {
    std::env::var(WORKER_ENV)
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

/// Loaded configuration plus the logging guard for one CLI invocation.
pub struct CliRunner {
    config: ConfigFile,
    _log_guard: Option<WorkerGuard>,
}

impl CliRunner {
    /// Load configuration and install logging.
    pub fn new(verbose: bool) -> Result<Self, CliError> {
        let config = ConfigFile::load()?;
        let log_dir = logging::log_dir(&config.paths.data_dir);
        let log_guard = match logging::init_logging(&log_dir, verbose) {
            Ok(guard) => Some(guard),
            Err(e) => {
                eprintln!(
                    "Warning: file logging disabled ({}): {}",
                    log_dir.display(),
                    e
                );
                None
            }
        };
        Ok(Self {
            config,
            _log_guard: log_guard,
        })
    }

    pub fn config(&self) -> &ConfigFile {
        &self.config
    }

    /// Log the command being run.
    pub fn log_startup(&self, command: &str) {
        info!(
            command,
            version = enginekit::VERSION,
            data_dir = %self.config.paths.data_dir.display(),
            "enginekit starting"
        );
    }

    /// Engine manager reporting to `channel`.
    pub fn manager(&self, channel: Arc<dyn ControlChannel>) -> Result<EngineManager, CliError> {
        Ok(EngineManager::from_config(&self.config, channel)?)
    }

    /// Engine manager writing JSON lines to stdout.
    pub fn worker_manager(&self) -> Result<EngineManager, CliError> {
        self.manager(Arc::new(JsonLinesChannel::stdout()))
    }
}
