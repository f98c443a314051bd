//! Control channel: how installer and supervisor report back to their host.
//!
//! The orchestrator and supervisor only ever talk to a
//! [`ControlChannel`] trait object, so the same code runs inline in a host
//! process or inside a supervised worker whose stdout is read by a parent.
//!
//! ```text
//! Orchestrator / Supervisor
//!         │
//!         ▼
//!   dyn ControlChannel
//!         ├── TracingChannel   (inline, events become log records)
//!         ├── EventChannel     (same-process bus, tokio mpsc)
//!         └── JsonLinesChannel (worker, one JSON event per line)
//! ```

use std::io::Write;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

/// Event delivered to the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlEvent {
    /// Progress of the current phase.
    Progress { percent: f64, status: String },
    /// Human-readable log line.
    Log { message: String },
    /// Failure reported to the user.
    Error { message: String },
    /// The operation was cancelled by the user.
    Cancelled { message: String },
}

impl ControlEvent {
    /// Encode as a single JSON line (without the trailing newline).
    pub fn to_json_line(&self) -> String {
        // Serializing a plain enum of strings and floats cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Decode a line produced by [`JsonLinesChannel`].
    pub fn from_json_line(line: &str) -> Option<Self> {
        serde_json::from_str(line.trim()).ok()
    }
}

/// Sink for installer and supervisor notifications.
pub trait ControlChannel: Send + Sync {
    /// Report progress, `percent` in 0..=100.
    fn emit_progress(&self, percent: f64, status: &str);

    /// Report a log line.
    fn emit_log(&self, message: &str);

    /// Report an error.
    fn emit_error(&self, message: &str);

    /// Report that the operation was cancelled.
    fn emit_cancelled(&self, message: &str);
}

/// Inline host: every event becomes a tracing record.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingChannel;

impl ControlChannel for TracingChannel {
    fn emit_progress(&self, percent: f64, status: &str) {
        info!(percent = %format!("{:.1}", percent), "{}", status);
    }

    fn emit_log(&self, message: &str) {
        info!("{}", message);
    }

    fn emit_error(&self, message: &str) {
        error!("{}", message);
    }

    fn emit_cancelled(&self, message: &str) {
        warn!(cancelled = true, "{}", message);
    }
}

/// Same-process event bus.
///
/// Events are pushed onto an unbounded tokio channel; a dropped receiver
/// silently discards further events.
#[derive(Debug, Clone)]
pub struct EventChannel {
    tx: mpsc::UnboundedSender<ControlEvent>,
}

impl EventChannel {
    /// Create a channel and the receiver the host listens on.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ControlEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn send(&self, event: ControlEvent) {
        let _ = self.tx.send(event);
    }
}

impl ControlChannel for EventChannel {
    fn emit_progress(&self, percent: f64, status: &str) {
        self.send(ControlEvent::Progress {
            percent,
            status: status.to_string(),
        });
    }

    fn emit_log(&self, message: &str) {
        self.send(ControlEvent::Log {
            message: message.to_string(),
        });
    }

    fn emit_error(&self, message: &str) {
        self.send(ControlEvent::Error {
            message: message.to_string(),
        });
    }

    fn emit_cancelled(&self, message: &str) {
        self.send(ControlEvent::Cancelled {
            message: message.to_string(),
        });
    }
}

/// Worker host: one JSON-encoded [`ControlEvent`] per line.
///
/// Used when the process runs under a supervising parent that reads its
/// stdout. Write failures are dropped; the parent going away must not abort
/// the install.
pub struct JsonLinesChannel<W: Write + Send> {
    writer: Mutex<W>,
}

impl<W: Write + Send> JsonLinesChannel<W> {
    /// Wrap a writer.
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    /// Unwrap the writer.
    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }

    fn write(&self, event: ControlEvent) {
        let mut writer = self.writer.lock();
        let _ = writeln!(writer, "{}", event.to_json_line());
        let _ = writer.flush();
    }
}

impl JsonLinesChannel<std::io::Stdout> {
    /// Channel writing to this process's stdout.
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write + Send> ControlChannel for JsonLinesChannel<W> {
    fn emit_progress(&self, percent: f64, status: &str) {
        self.write(ControlEvent::Progress {
            percent,
            status: status.to_string(),
        });
    }

    fn emit_log(&self, message: &str) {
        self.write(ControlEvent::Log {
            message: message.to_string(),
        });
    }

    fn emit_error(&self, message: &str) {
        self.write(ControlEvent::Error {
            message: message.to_string(),
        });
    }

    fn emit_cancelled(&self, message: &str) {
        self.write(ControlEvent::Cancelled {
            message: message.to_string(),
        });
    }
}
