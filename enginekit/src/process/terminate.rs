//! Platform termination backends.
//!
//! ```text
//! Terminator (trait)
//!     ├── UnixTerminator     SIGTERM / SIGKILL to the process group
//!     └── WindowsTerminator  taskkill /T, taskkill /T /F
//! ```

use std::sync::Arc;

use tracing::debug;

use super::error::{ProcessError, ProcessResult};

/// Sends termination requests to a process tree.
pub trait Terminator: Send + Sync {
    /// Ask `pid` (and its children) to exit.
    ///
    /// `graceful = true` requests a clean shutdown; `false` forces it.
    fn terminate(&self, pid: u32, graceful: bool) -> ProcessResult<()>;
}

/// Terminator for the platform this binary was built for.
pub fn platform_terminator() -> Arc<dyn Terminator> {
    #[cfg(unix)]
    {
        Arc::new(UnixTerminator)
    }
    #[cfg(windows)]
    {
        Arc::new(WindowsTerminator)
    }
}

/// Signals the process group led by `pid`, falling back to the process alone.
#[cfg(unix)]
#[derive(Debug, Default, Clone, Copy)]
pub struct UnixTerminator;

#[cfg(unix)]
impl UnixTerminator {
    fn send_signal(target: i32, signal: i32) -> std::io::Result<()> {
        // SAFETY: kill has no memory-safety preconditions.
        let result = unsafe { libc::kill(target, signal) };
        if result == 0 {
            Ok(())
        } else {
            Err(std::io::Error::last_os_error())
        }
    }
}

#[cfg(unix)]
impl Terminator for UnixTerminator {
    fn terminate(&self, pid: u32, graceful: bool) -> ProcessResult<()> {
        let signal = if graceful { libc::SIGTERM } else { libc::SIGKILL };
        let pid_i32 = i32::try_from(pid).map_err(|_| ProcessError::Termination {
            pid,
            reason: "pid out of range".to_string(),
        })?;
        debug!(pid, signal, "Sending signal");

        // Negative pid targets the process group.
        let result = Self::send_signal(-pid_i32, signal).or_else(|e| {
            if e.raw_os_error() == Some(libc::ESRCH) {
                Self::send_signal(pid_i32, signal)
            } else {
                Err(e)
            }
        });

        match result {
            Ok(()) => Ok(()),
            Err(e) if e.raw_os_error() == Some(libc::ESRCH) => Err(ProcessError::NotFound { pid }),
            Err(e) => Err(ProcessError::Termination {
                pid,
                reason: e.to_string(),
            }),
        }
    }
}

/// Uses `taskkill` to end the whole process tree.
#[cfg(windows)]
#[derive(Debug, Default, Clone, Copy)]
pub struct WindowsTerminator;

#[cfg(windows)]
impl Terminator for WindowsTerminator {
    fn terminate(&self, pid: u32, graceful: bool) -> ProcessResult<()> {
        use std::os::windows::process::CommandExt;
        const CREATE_NO_WINDOW: u32 = 0x0800_0000;

        let pid_arg = pid.to_string();
        let mut args = vec!["/PID", pid_arg.as_str(), "/T"];
        if !graceful {
            args.push("/F");
        }
        debug!(pid, graceful, "Running taskkill");

        let output = std::process::Command::new("taskkill")
            .args(&args)
            .creation_flags(CREATE_NO_WINDOW)
            .output()
            .map_err(|e| ProcessError::Termination {
                pid,
                reason: e.to_string(),
            })?;

        if output.status.success() {
            Ok(())
        } else {
            // taskkill exits with 128 when the process does not exist.
            if output.status.code() == Some(128) {
                return Err(ProcessError::NotFound { pid });
            }
            Err(ProcessError::Termination {
                pid,
                reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }
}
