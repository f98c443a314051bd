//! enginekit CLI - install and supervise a local generation runtime
//!
//! Thin command layer over the `enginekit` library. Every command loads
//! `config.ini`, installs logging and delegates to [`EngineManager`].
//!
//! [`EngineManager`]: enginekit::EngineManager

mod commands;
mod error;
mod progress;
mod runner;

use clap::{Parser, Subcommand};
use console::style;

use commands::config::ConfigCommands;
use error::CliError;
use runner::{worker_from_env, CliRunner};

#[derive(Debug, Parser)]
#[command(name = "enginekit", version, about, long_about = None)]
struct Cli {
    /// Verbose logging (debug level unless ENGINEKIT_LOG is set)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Download, verify and install the latest runtime release
    Install {
        /// Print JSON lines instead of a progress bar (also ENGINEKIT_WORKER=1)
        #[arg(long)]
        worker: bool,
    },

    /// Remove the installed runtime and cached downloads
    Uninstall {
        /// Skip the confirmation prompt
        #[arg(short, long)]
        force: bool,
    },

    /// Show installation status
    Status,

    /// Detect the accelerator and show the startup script that would be used
    Probe,

    /// Start the installed runtime and supervise it until Ctrl+C
    Start,

    /// Install if needed, then start and supervise the runtime
    Run,

    /// Serve JSON commands on stdin for a supervising parent process
    Worker,

    /// View or edit configuration
    #[command(subcommand)]
    Config(ConfigCommands),
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = dispatch(cli) {
        match e {
            CliError::Cancelled => eprintln!("{}", style("Cancelled").yellow()),
            e => eprintln!("{} {}", style("Error:").red().bold(), e),
        }
        std::process::exit(1);
    }
}

fn dispatch(cli: Cli) -> Result<(), CliError> {
    // Config commands need neither logging nor a runtime.
    let command = match cli.command {
        Commands::Config(command) => return commands::config::run(command),
        other => other,
    };

    let runner = CliRunner::new(cli.verbose)?;
    let runtime = tokio::runtime::Runtime::new()?;

    runtime.block_on(async {
        match command {
            Commands::Install { worker } => {
                commands::install::run(&runner, worker || worker_from_env()).await
            }
            Commands::Uninstall { force } => commands::install::uninstall(&runner, force).await,
            Commands::Status => commands::process::status(&runner),
            Commands::Probe => commands::process::probe(&runner).await,
            Commands::Start => commands::process::start(&runner).await,
            Commands::Run => commands::process::run(&runner).await,
            Commands::Worker => commands::worker::run(&runner).await,
            Commands::Config(_) => Ok(()),
        }
    })
}
