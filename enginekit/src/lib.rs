//! enginekit - installer and supervisor for a local generation runtime
//!
//! This library downloads, verifies, extracts and configures an external
//! compute engine (by default the ComfyUI portable distribution), then
//! starts and stops it with GPU or CPU startup scripts.
//!
//! # Modules
//!
//! - [`installer`]: release lookup, resumable download, extraction, install state machine
//! - [`process`]: accelerator probe, script selection, process supervision
//! - [`control`]: progress and log events back to the host
//! - [`cancel`]: cancellation shared with a running install
//! - [`api`]: [`EngineManager`], the structured-result façade
//! - [`config`]: INI configuration file
//! - [`logging`]: tracing subscriber setup

pub mod api;
pub mod cancel;
pub mod config;
pub mod control;
pub mod installer;
pub mod logging;
pub mod process;

pub use api::{EngineManager, OperationResult};
pub use cancel::CancelToken;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
