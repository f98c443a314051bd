//! Supervised worker mode.
//!
//! A parent process drives one long-lived session over stdio:
//!
//! ```text
//! stdin   {"command":"install"}            one command per line
//! stdout  {"type":"progress",...}          control events
//!         {"type":"result","command":"install","result":{...}}
//! ```
//!
//! Installs run in the background so that `cancel` can arrive while one is
//! in flight. EOF on stdin stops a running process and exits.

use std::sync::Arc;

use enginekit::EngineManager;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::common::print_result_line;
use crate::error::CliError;
use crate::runner::CliRunner;

/// Command accepted on stdin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum WorkerCommand {
    Install,
    Cancel,
    Uninstall,
    Start,
    Stop,
    Status,
}

impl WorkerCommand {
    fn name(&self) -> &'static str {
        match self {
            Self::Install => "install",
            Self::Cancel => "cancel",
            Self::Uninstall => "uninstall",
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Status => "status",
        }
    }
}

#[derive(Debug, Serialize)]
struct StatusReport {
    installed: bool,
    installing: bool,
    process: enginekit::process::ProcessStatus,
}

#[derive(Debug, Serialize)]
struct InvalidCommand {
    success: bool,
    message: String,
}

/// Parse one stdin line. Blank lines yield `None`.
pub fn parse_command(line: &str) -> Option<Result<WorkerCommand, String>> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    Some(serde_json::from_str(line).map_err(|e| e.to_string()))
}

/// Run the worker loop until stdin closes.
pub async fn run(runner: &CliRunner) -> Result<(), CliError> {
    runner.log_startup("worker");
    let manager = Arc::new(runner.worker_manager()?);
    let mut install: Option<JoinHandle<()>> = None;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let command = match parse_command(&line) {
            None => continue,
            Some(Ok(command)) => command,
            Some(Err(reason)) => {
                warn!(line = %line, reason = %reason, "Invalid worker command");
                print_result_line(
                    "invalid",
                    &InvalidCommand {
                        success: false,
                        message: reason,
                    },
                );
                continue;
            }
        };
        debug!(command = command.name(), "Worker command");

        match command {
            WorkerCommand::Install => {
                if install.as_ref().is_some_and(|h| !h.is_finished()) {
                    // The façade rejects it too; answer without spawning.
                    print_result_line("install", &manager.install().await);
                    continue;
                }
                let manager = Arc::clone(&manager);
                install = Some(tokio::spawn(async move {
                    let result = manager.install().await;
                    print_result_line("install", &result);
                }));
            }
            WorkerCommand::Cancel => print_result_line("cancel", &manager.cancel_install()),
            WorkerCommand::Uninstall => print_result_line("uninstall", &manager.uninstall().await),
            WorkerCommand::Start => print_result_line("start", &manager.start_process().await),
            WorkerCommand::Stop => print_result_line("stop", &manager.stop_process().await),
            WorkerCommand::Status => print_result_line("status", &status(&manager)),
        }
    }

    debug!("Worker stdin closed");
    shutdown(&manager, install).await;
    Ok(())
}

fn status(manager: &EngineManager) -> StatusReport {
    StatusReport {
        installed: manager.is_installed(),
        installing: manager.install_in_progress(),
        process: manager.process_status(),
    }
}

async fn shutdown(manager: &EngineManager, install: Option<JoinHandle<()>>) {
    if let Some(handle) = install {
        if !handle.is_finished() {
            manager.cancel_install();
        }
        let _ = handle.await;
    }
    if manager.process_status().running {
        print_result_line("stop", &manager.stop_process().await);
    }
}
