//! Runtime process supervision.
//!
//! # Components
//!
//! - [`CapabilityProbe`]: detects a hardware accelerator ([`CommandProbe`])
//! - [`StartupScriptSelector`]: picks the GPU or CPU startup script
//! - [`ProcessSupervisor`]: spawns, monitors and stops the runtime
//! - [`Terminator`]: platform process-tree termination

mod error;
mod probe;
mod script;
mod supervisor;
mod terminate;

pub use error::{ProcessError, ProcessResult};
pub use probe::{
    interpret_output, CapabilityProbe, CommandProbe, StaticProbe, DEFAULT_PROBE_COMMAND,
    PROBE_TIMEOUT,
};
pub use script::{ScriptSelection, StartupMode, StartupScriptSelector};
pub use supervisor::{
    ProcessState, ProcessStatus, ProcessSupervisor, StartOutcome, StopOutcome, SupervisorConfig,
    DEFAULT_KILL_TIMEOUT, DEFAULT_SETTLE, DEFAULT_STOP_TIMEOUT,
};
pub use terminate::{platform_terminator, Terminator};

#[cfg(unix)]
pub use terminate::UnixTerminator;
#[cfg(windows)]
pub use terminate::WindowsTerminator;
