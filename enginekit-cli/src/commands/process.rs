//! Runtime commands: status, probe, start and run.

use std::sync::Arc;

use console::style;
use enginekit::installer::extractor::tool_available;
use enginekit::process::CapabilityProbe;
use enginekit::EngineManager;
use tokio_util::sync::CancellationToken;

use super::common::{check, install_interruptible, interrupt_token, print_outcome};
use crate::error::CliError;
use crate::progress::ConsoleChannel;
use crate::runner::CliRunner;

/// Extraction tools worth reporting.
const EXTRACTION_TOOLS: &[&str] = &["7z", "tar", "unzip"];

/// Show installation state.
pub fn status(runner: &CliRunner) -> Result<(), CliError> {
    let config = runner.config();
    let manager = runner.manager(Arc::new(ConsoleChannel::hidden()))?;
    let installer = manager.orchestrator().config();

    println!("enginekit v{}", enginekit::VERSION);
    println!();
    println!("Product:        {}", installer.profile.name);
    println!("Data directory: {}", config.paths.data_dir.display());
    println!("Install dir:    {}", installer.install_dir().display());
    match manager.orchestrator().root_dir() {
        Some(root) => println!("Installed:      {} ({})", style("yes").green(), root.display()),
        None => println!("Installed:      {}", style("no").yellow()),
    }
    println!("Registry:       {}", installer.profile.registry_url);
    Ok(())
}

/// Report accelerator detection, script choice and extraction tools.
pub async fn probe(runner: &CliRunner) -> Result<(), CliError> {
    let config = runner.config();

    let detected = match config.probe() {
        Some(probe) => {
            println!("Probe command:  {}", config.process.probe_command);
            probe.has_accelerator().await
        }
        None => {
            println!("Probe command:  (disabled)");
            false
        }
    };
    println!(
        "Accelerator:    {}",
        if detected {
            style("detected").green()
        } else {
            style("not detected").yellow()
        }
    );

    let manager = runner.manager(Arc::new(ConsoleChannel::hidden()))?;
    match manager.orchestrator().root_dir() {
        Some(root) => match manager.supervisor().selector().select(&root, detected) {
            Ok(selection) => println!(
                "Startup script: {} ({} mode)",
                selection.script_path.display(),
                selection.mode
            ),
            Err(e) => println!("Startup script: {}", style(e).red()),
        },
        None => println!("Startup script: (not installed)"),
    }

    for tool in EXTRACTION_TOOLS {
        let available = tool_available(tool).await;
        println!(
            "Tool {:<9} {}",
            format!("{}:", tool),
            if available {
                style("available").green()
            } else {
                style("missing").dim()
            }
        );
    }
    Ok(())
}

/// Start the runtime and supervise it until Ctrl-C.
pub async fn start(runner: &CliRunner) -> Result<(), CliError> {
    runner.log_startup("start");
    let interrupt = interrupt_token()?;
    let manager = runner.manager(Arc::new(ConsoleChannel::hidden()))?;
    supervise(&manager, &interrupt).await
}

/// Install when missing, then start.
pub async fn run(runner: &CliRunner) -> Result<(), CliError> {
    runner.log_startup("run");
    let interrupt = interrupt_token()?;

    let channel = Arc::new(ConsoleChannel::new());
    let manager = Arc::new(runner.manager(channel.clone())?);

    if manager.is_installed() {
        channel.finish();
    } else {
        println!("Runtime not installed; installing first");
        let result = install_interruptible(&manager, &interrupt).await;
        channel.finish();
        print_outcome(result.success, &result.message);
        check(&result, CliError::Install)?;
    }

    supervise(&manager, &interrupt).await
}

async fn supervise(manager: &EngineManager, interrupt: &CancellationToken) -> Result<(), CliError> {
    let started = manager.start_process().await;
    print_outcome(started.success, &started.message);
    if !started.success {
        return Err(CliError::Process(started.message));
    }
    println!("Press Ctrl+C to stop");

    tokio::select! {
        _ = interrupt.cancelled() => {
            println!();
            println!("Stopping...");
            let stopped = manager.stop_process().await;
            print_outcome(stopped.success, &stopped.message);
            if !stopped.success {
                return Err(CliError::Process(stopped.message));
            }
        }
        _ = manager.supervisor().wait_for_exit() => {
            println!("Runtime exited");
        }
    }
    Ok(())
}
