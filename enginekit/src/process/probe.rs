//! Hardware acceleration detection.
//!
//! A short-lived query command (by default `nvidia-smi`) is run with a hard
//! timeout. Any failure along the way means "no accelerator"; the probe
//! itself never errors.

use std::process::Stdio;
use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use tokio::process::Command;
use tracing::debug;

use crate::installer::BoxFuture;

/// Hard limit for the query command.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(3);

/// Default query command.
pub const DEFAULT_PROBE_COMMAND: &str = "nvidia-smi --query-gpu=name --format=csv,noheader";

/// Output the vendor tool prints on machines without a device.
const NO_DEVICE_SENTINEL: &str = "No devices were found";

/// Detects optional hardware acceleration.
pub trait CapabilityProbe: Send + Sync {
    /// Whether an accelerator is available. Never fails.
    fn has_accelerator(&self) -> BoxFuture<'_, bool>;
}

/// Probe answering with a fixed value.
#[derive(Debug, Clone, Copy)]
pub struct StaticProbe(pub bool);

impl CapabilityProbe for StaticProbe {
    fn has_accelerator(&self) -> BoxFuture<'_, bool> {
        let value = self.0;
        Box::pin(async move { value })
    }
}

/// Probe running an external query command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandProbe {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl Default for CommandProbe {
    fn default() -> Self {
        Self::from_command_line(DEFAULT_PROBE_COMMAND).unwrap_or_else(|| Self {
            program: "nvidia-smi".to_string(),
            args: Vec::new(),
            timeout: PROBE_TIMEOUT,
        })
    }
}

impl CommandProbe {
    /// Probe running `program` with `args`.
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            timeout: PROBE_TIMEOUT,
        }
    }

    /// Parse a whitespace-separated command line. `None` if it is empty.
    pub fn from_command_line(line: &str) -> Option<Self> {
        let mut parts = line.split_whitespace().map(str::to_string);
        let program = parts.next()?;
        Some(Self::new(program, parts.collect()))
    }

    /// Override the timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Program the probe runs.
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Run the query command and interpret its output.
    pub async fn detect(&self) -> bool {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                debug!(program = %self.program, error = %e, "Accelerator probe not available");
                return false;
            }
        };

        // Dropping the future on timeout kills the child.
        match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => {
                let stdout = String::from_utf8_lossy(&output.stdout);
                let detected = interpret_output(output.status.success(), &stdout);
                debug!(program = %self.program, detected, "Accelerator probe finished");
                detected
            }
            Ok(Err(e)) => {
                debug!(program = %self.program, error = %e, "Accelerator probe failed");
                false
            }
            Err(_) => {
                debug!(program = %self.program, timeout = ?self.timeout, "Accelerator probe timed out");
                false
            }
        }
    }
}

impl CapabilityProbe for CommandProbe {
    fn has_accelerator(&self) -> BoxFuture<'_, bool> {
        Box::pin(self.detect())
    }
}

fn device_line() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    // At least one word character somewhere on the line.
    PATTERN.get_or_init(|| Regex::new(r"\w").unwrap())
}

/// Decide from the query output whether a device is present.
pub fn interpret_output(success: bool, stdout: &str) -> bool {
    if !success || stdout.contains(NO_DEVICE_SENTINEL) {
        return false;
    }
    stdout.lines().any(|line| device_line().is_match(line.trim()))
}
