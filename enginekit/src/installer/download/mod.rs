//! HTTP download of runtime archives.
//!
//! This module provides:
//! - Single file downloads with resume and retry (`http`)
//! - SHA-256 integrity verification and the size heuristic (`checksum`)
//! - Per-call session bookkeeping (`state`)
//! - Throttled progress reporting (`progress`)
//!
//! # Architecture
//!
//! ```text
//! DownloadManager
//!         │
//!         ├── <dest>.part       (staging file, renamed on success)
//!         │
//!         ├── DownloadSession   (offset, total, bytes, attempt)
//!         │
//!         ├── ProgressThrottle  (≤ 1 callback / 500ms + final)
//!         │
//!         └── CancelToken       (raced on send, every chunk, retry delay)
//!
//! checksum::verify / checksum::probably_complete  (used by the orchestrator)
//! ```
//!
//! # Example
//!
//! ```ignore
//! use enginekit::installer::download::{DownloadManager, DownloadOptions};
//!
//! let manager = DownloadManager::new(DownloadOptions::default())?;
//! let size = manager
//!     .download(url, &dest, Box::new(|bytes, total| println!("{bytes}/{total:?}")), &cancel)
//!     .await?;
//! ```

pub mod checksum;
mod http;
mod progress;
mod state;

pub use checksum::{probably_complete, verify, PROBABLY_COMPLETE_BYTES};
pub use http::{partial_path, DownloadManager, DownloadOptions, PARTIAL_SUFFIX};
pub use progress::{ProgressThrottle, PROGRESS_INTERVAL};
pub use state::DownloadSession;
