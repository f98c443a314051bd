//! Configuration management CLI commands.
//!
//! `config get|set` address one `section.key`; `config list` prints every
//! key grouped by section with its description, highlighting values that
//! differ from the defaults.

use clap::Subcommand;
use console::style;
use enginekit::config::{config_file_path, ConfigFile, ConfigKey};

use crate::error::CliError;

/// Config subcommands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    /// Get a configuration value
    Get {
        /// Configuration key in format section.key (e.g., download.max_retries)
        key: String,
    },

    /// Set a configuration value
    Set {
        /// Configuration key in format section.key (e.g., download.max_retries)
        key: String,

        /// Value to set
        value: String,
    },

    /// List all configuration settings
    List,

    /// Show the configuration file path
    Path,
}

/// Run a config subcommand.
pub fn run(command: ConfigCommands) -> Result<(), CliError> {
    match command {
        ConfigCommands::Get { key } => run_get(&key),
        ConfigCommands::Set { key, value } => run_set(&key, &value),
        ConfigCommands::List => run_list(),
        ConfigCommands::Path => run_path(),
    }
}

fn parse_key(key: &str) -> Result<ConfigKey, CliError> {
    key.parse().map_err(|_| {
        CliError::Config(format!(
            "Unknown configuration key '{}'. Use 'enginekit config list' to see available keys.",
            key
        ))
    })
}

fn run_get(key: &str) -> Result<(), CliError> {
    let config_key = parse_key(key)?;
    let config = ConfigFile::load()?;
    let value = config_key.get(&config);

    if value.is_empty() {
        println!("(not set)");
    } else {
        println!("{}", value);
    }
    Ok(())
}

fn run_set(key: &str, value: &str) -> Result<(), CliError> {
    let config_key = parse_key(key)?;
    let mut config = ConfigFile::load()?;
    config_key.set(&mut config, value)?;
    config.save()?;

    println!("Set {} = {}", config_key.name(), value.trim());
    Ok(())
}

fn run_list() -> Result<(), CliError> {
    let config = ConfigFile::load()?;
    let defaults = ConfigFile::default();
    let width = ConfigKey::all()
        .iter()
        .map(|key| key.key_name().len())
        .max()
        .unwrap_or(0);

    println!("{} {}", style("Config:").bold(), config_file_path().display());

    let mut section = "";
    for key in ConfigKey::all() {
        if key.section() != section {
            section = key.section();
            println!();
            println!("{}", style(format!("[{}]", section)).cyan().bold());
        }

        let value = key.get(&config);
        let shown = if value.is_empty() {
            style("(not set)".to_string()).dim()
        } else if value != key.get(&defaults) {
            style(value).yellow()
        } else {
            style(value)
        };
        println!(
            "  {:<width$} = {}  {}",
            key.key_name(),
            shown,
            style(format!("# {}", key.description())).dim(),
            width = width
        );
    }

    println!();
    println!("{}", style("Changed values are highlighted.").dim());
    Ok(())
}

fn run_path() -> Result<(), CliError> {
    println!("{}", config_file_path().display());
    Ok(())
}
