//! Supervision of the managed runtime process.
//!
//! The supervisor owns at most one child. Starting spawns the selected
//! startup script detached from our own process group, forwards its output
//! to the control channel and watches it from a monitor task. Stopping asks
//! politely first and forces the issue after a bounded wait.
//!
//! ```text
//!  start()                       monitor task
//!    │ probe + select script          │
//!    │ spawn (own group)              │ child.wait()
//!    │ insert ManagedProcess ───────► │ publish exit on watch channel
//!    │ settle wait ◄───────────────── │ clear state (same generation only)
//!    ▼
//!  StartOutcome
//! ```

use std::collections::VecDeque;
use std::path::Path;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::error::{ProcessError, ProcessResult};
use super::probe::CapabilityProbe;
use super::script::{ScriptSelection, StartupMode, StartupScriptSelector};
use super::terminate::Terminator;
use crate::control::ControlChannel;
use crate::installer::ProductProfile;

/// Default wait before a fresh process counts as started.
pub const DEFAULT_SETTLE: Duration = Duration::from_secs(3);

/// Default wait after the graceful termination request.
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(10);

/// Default wait after the forceful termination request.
pub const DEFAULT_KILL_TIMEOUT: Duration = Duration::from_secs(5);

/// Output lines kept for diagnosing an early exit.
pub const DEFAULT_DIAGNOSTIC_LINES: usize = 40;

/// Time allowed for output readers to drain after an early exit.
const READER_DRAIN: Duration = Duration::from_millis(500);

/// Supervisor timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupervisorConfig {
    pub settle: Duration,
    pub stop_timeout: Duration,
    pub kill_timeout: Duration,
    pub diagnostic_lines: usize,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            settle: DEFAULT_SETTLE,
            stop_timeout: DEFAULT_STOP_TIMEOUT,
            kill_timeout: DEFAULT_KILL_TIMEOUT,
            diagnostic_lines: DEFAULT_DIAGNOSTIC_LINES,
        }
    }
}

impl SupervisorConfig {
    pub fn with_settle(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    pub fn with_stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = timeout;
        self
    }

    pub fn with_kill_timeout(mut self, timeout: Duration) -> Self {
        self.kill_timeout = timeout;
        self
    }
}

/// Lifecycle of the managed process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

/// Result of [`ProcessSupervisor::start`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StartOutcome {
    pub success: bool,
    pub message: String,
    pub mode: Option<StartupMode>,
    pub pid: Option<u32>,
}

impl StartOutcome {
    fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            mode: None,
            pid: None,
        }
    }
}

/// Result of [`ProcessSupervisor::stop`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StopOutcome {
    pub success: bool,
    pub message: String,
}

/// Snapshot of the supervisor state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessStatus {
    pub running: bool,
    pub state: ProcessState,
    pub pid: Option<u32>,
    pub mode: Option<StartupMode>,
}

struct ManagedProcess {
    pid: u32,
    state: ProcessState,
    mode: StartupMode,
    generation: u64,
    exited: watch::Receiver<Option<String>>,
}

type OutputTail = Arc<Mutex<VecDeque<String>>>;

/// Spawns, monitors and terminates the managed runtime.
pub struct ProcessSupervisor {
    config: SupervisorConfig,
    selector: StartupScriptSelector,
    probe: Arc<dyn CapabilityProbe>,
    terminator: Arc<dyn Terminator>,
    channel: Arc<dyn ControlChannel>,
    current: Arc<Mutex<Option<ManagedProcess>>>,
    tail: OutputTail,
    lifecycle: tokio::sync::Mutex<()>,
    generation: AtomicU64,
}

impl ProcessSupervisor {
    /// Create a supervisor.
    pub fn new(
        config: SupervisorConfig,
        profile: ProductProfile,
        probe: Arc<dyn CapabilityProbe>,
        terminator: Arc<dyn Terminator>,
        channel: Arc<dyn ControlChannel>,
    ) -> Self {
        Self {
            config,
            selector: StartupScriptSelector::new(profile),
            probe,
            terminator,
            channel,
            current: Arc::new(Mutex::new(None)),
            tail: Arc::new(Mutex::new(VecDeque::new())),
            lifecycle: tokio::sync::Mutex::new(()),
            generation: AtomicU64::new(0),
        }
    }

    /// Script selector used by [`start`](Self::start).
    pub fn selector(&self) -> &StartupScriptSelector {
        &self.selector
    }

    /// Probe the accelerator and pick the script under `root_dir`.
    pub async fn select_script(&self, root_dir: &Path) -> ProcessResult<ScriptSelection> {
        let has_accelerator = self.probe.has_accelerator().await;
        info!(has_accelerator, "Accelerator probe complete");
        self.selector.select(root_dir, has_accelerator)
    }

    /// Start the runtime from `root_dir`.
    ///
    /// Rejected (not queued) while a process is tracked.
    pub async fn start(&self, root_dir: &Path) -> StartOutcome {
        let _guard = self.lifecycle.lock().await;

        if let Some(p) = self.current.lock().as_ref() {
            return StartOutcome {
                success: false,
                message: format!("Process is already running (pid {})", p.pid),
                mode: Some(p.mode),
                pid: Some(p.pid),
            };
        }

        let selection = match self.select_script(root_dir).await {
            Ok(selection) => selection,
            Err(e) => {
                self.channel.emit_error(&e.to_string());
                return StartOutcome::failed(e.to_string());
            }
        };

        self.channel.emit_log(&format!(
            "Starting {} in {} mode",
            selection.script_path.display(),
            selection.mode
        ));

        let mut child = match spawn_detached(&selection.script_path, root_dir) {
            Ok(child) => child,
            Err(e) => {
                self.channel.emit_error(&e.to_string());
                return StartOutcome::failed(e.to_string());
            }
        };

        let Some(pid) = child.id() else {
            return StartOutcome::failed("Process exited before it could be tracked");
        };

        self.tail.lock().clear();
        let mut readers = Vec::new();
        if let Some(stdout) = child.stdout.take() {
            readers.push(self.spawn_reader(stdout));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(self.spawn_reader(stderr));
        }

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let (exit_tx, mut exit_rx) = watch::channel(None);
        *self.current.lock() = Some(ManagedProcess {
            pid,
            state: ProcessState::Starting,
            mode: selection.mode,
            generation,
            exited: exit_rx.clone(),
        });

        let current = Arc::clone(&self.current);
        let channel = Arc::clone(&self.channel);
        tokio::spawn(async move {
            let description = match child.wait().await {
                Ok(status) => status.to_string(),
                Err(e) => format!("wait failed: {}", e),
            };
            info!(pid, status = %description, "Managed process exited");
            channel.emit_log(&format!("Process {} exited: {}", pid, description));

            let mut current = current.lock();
            if current.as_ref().map(|p| p.generation) == Some(generation) {
                *current = None;
            }
            drop(current);
            let _ = exit_tx.send(Some(description));
        });

        let exited_early = matches!(
            tokio::time::timeout(self.config.settle, exit_rx.wait_for(|s| s.is_some())).await,
            Ok(Ok(_))
        );

        if exited_early {
            let status = exit_rx.borrow().clone().unwrap_or_default();
            let _ = tokio::time::timeout(READER_DRAIN, futures::future::join_all(readers)).await;
            let tail = self.recent_output();
            let message = format!(
                "Process exited during startup ({}). Check that the installation is \
                 complete and that the {} startup script works when run manually.{}",
                status,
                selection.mode,
                if tail.is_empty() {
                    String::new()
                } else {
                    format!("\nLast output:\n{}", tail.join("\n"))
                }
            );
            warn!(pid, status = %status, "Managed process exited during startup");
            self.channel.emit_error(&message);
            return StartOutcome {
                success: false,
                message,
                mode: Some(selection.mode),
                pid: Some(pid),
            };
        }

        if let Some(p) = self.current.lock().as_mut() {
            if p.generation == generation {
                p.state = ProcessState::Running;
            }
        }
        let message = format!("Started in {} mode (pid {})", selection.mode, pid);
        info!(pid, mode = %selection.mode, "Managed process started");
        self.channel.emit_log(&message);
        StartOutcome {
            success: true,
            message,
            mode: Some(selection.mode),
            pid: Some(pid),
        }
    }

    /// Stop the runtime: graceful request, bounded wait, forced request.
    ///
    /// Tracked state is cleared at the end regardless of the outcome.
    pub async fn stop(&self) -> StopOutcome {
        let _guard = self.lifecycle.lock().await;

        let (pid, mut exited) = match self.current.lock().as_mut() {
            Some(p) => {
                p.state = ProcessState::Stopping;
                (p.pid, p.exited.clone())
            }
            None => {
                return StopOutcome {
                    success: false,
                    message: "No process is running".to_string(),
                }
            }
        };

        self.channel.emit_log(&format!("Stopping process {}", pid));

        let outcome = if self
            .terminate_and_wait(pid, true, self.config.stop_timeout, &mut exited)
            .await
        {
            StopOutcome {
                success: true,
                message: format!("Process {} stopped", pid),
            }
        } else {
            warn!(pid, "Process ignored graceful stop; forcing");
            self.channel
                .emit_log("Process did not stop in time, forcing termination");
            if self
                .terminate_and_wait(pid, false, self.config.kill_timeout, &mut exited)
                .await
            {
                StopOutcome {
                    success: true,
                    message: format!("Process {} force-stopped", pid),
                }
            } else {
                StopOutcome {
                    success: false,
                    message: format!("Process {} did not exit after forced termination", pid),
                }
            }
        };

        *self.current.lock() = None;
        self.channel.emit_log(&outcome.message);
        outcome
    }

    /// Current state. Pure read.
    pub fn status(&self) -> ProcessStatus {
        match self.current.lock().as_ref() {
            Some(p) => ProcessStatus {
                running: matches!(p.state, ProcessState::Starting | ProcessState::Running),
                state: p.state,
                pid: Some(p.pid),
                mode: Some(p.mode),
            },
            None => ProcessStatus {
                running: false,
                state: ProcessState::Stopped,
                pid: None,
                mode: None,
            },
        }
    }

    /// Most recent output lines of the managed process.
    pub fn recent_output(&self) -> Vec<String> {
        self.tail.lock().iter().cloned().collect()
    }

    /// Wait until the tracked process exits on its own.
    ///
    /// Returns immediately if nothing is tracked.
    pub async fn wait_for_exit(&self) {
        let exited = self.current.lock().as_ref().map(|p| p.exited.clone());
        if let Some(mut exited) = exited {
            let _ = exited.wait_for(|s| s.is_some()).await;
        }
    }

    /// Returns whether the process exited within `timeout`.
    async fn terminate_and_wait(
        &self,
        pid: u32,
        graceful: bool,
        timeout: Duration,
        exited: &mut watch::Receiver<Option<String>>,
    ) -> bool {
        let terminator = Arc::clone(&self.terminator);
        let signalled = tokio::task::spawn_blocking(move || terminator.terminate(pid, graceful))
            .await
            .unwrap_or_else(|e| {
                Err(ProcessError::Termination {
                    pid,
                    reason: e.to_string(),
                })
            });

        match signalled {
            Ok(()) => debug!(pid, graceful, "Termination requested"),
            Err(ProcessError::NotFound { .. }) => debug!(pid, "Process already gone"),
            Err(e) => warn!(pid, graceful, error = %e, "Termination request failed"),
        }

        matches!(
            tokio::time::timeout(timeout, exited.wait_for(|s| s.is_some())).await,
            Ok(Ok(_))
        )
    }

    fn spawn_reader<R>(&self, stream: R) -> JoinHandle<()>
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let channel = Arc::clone(&self.channel);
        let tail = Arc::clone(&self.tail);
        let limit = self.config.diagnostic_lines.max(1);
        tokio::spawn(async move {
            let mut lines = BufReader::new(stream).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                channel.emit_log(&line);
                let mut tail = tail.lock();
                if tail.len() == limit {
                    tail.pop_front();
                }
                tail.push_back(line);
            }
        })
    }
}

/// Spawn `script` in its own process group with piped output.
fn spawn_detached(script: &Path, root_dir: &Path) -> ProcessResult<tokio::process::Child> {
    #[cfg(unix)]
    let mut cmd = {
        let mut cmd = Command::new("sh");
        cmd.arg(script).process_group(0);
        cmd
    };

    #[cfg(windows)]
    let mut cmd = {
        const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;
        const CREATE_NO_WINDOW: u32 = 0x0800_0000;
        let mut cmd = Command::new("cmd");
        cmd.arg("/C")
            .arg(script)
            .creation_flags(CREATE_NEW_PROCESS_GROUP | CREATE_NO_WINDOW);
        cmd
    };

    cmd.current_dir(root_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(false);

    cmd.spawn().map_err(|source| ProcessError::Spawn {
        script: script.to_path_buf(),
        source,
    })
}
