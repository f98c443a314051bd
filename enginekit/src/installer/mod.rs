//! Runtime installer.
//!
//! Fetches, verifies, extracts and configures the managed runtime.
//!
//! # Architecture
//!
//! ```text
//! InstallationOrchestrator
//!         │
//!         ├── ReleaseSource (trait) ── ReleaseResolver (registry + fallback)
//!         │
//!         ├── ArtifactDownloader (trait) ── DownloadManager (resume, retry)
//!         │                                     └── checksum (SHA-256, size heuristic)
//!         │
//!         ├── ArchiveInstaller
//!         │       └── ArchiveExtractor (trait) ── ShellExtractor (7z / tar / unzip)
//!         │
//!         └── ConfigurationHook (trait) ── HttpConfigHook (JSON POST)
//! ```
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use enginekit::cancel::CancelToken;
//! use enginekit::control::TracingChannel;
//! use enginekit::installer::{InstallationOrchestrator, InstallerConfig};
//!
//! let orchestrator =
//!     InstallationOrchestrator::new(InstallerConfig::default(), Arc::new(TracingChannel))?;
//! let report = orchestrator.install(&CancelToken::new()).await?;
//! println!("Installed {} at {}", report.release.version, report.root_dir.display());
//! ```

pub mod archive;
mod config;
pub mod download;
mod error;
pub mod extractor;
mod hook;
mod orchestrator;
mod profile;
pub mod release;
mod traits;

pub use archive::{locate_root, ArchiveInstaller};
pub use config::{default_data_dir, InstallerConfig};
pub use download::{partial_path, DownloadManager, DownloadOptions};
pub use error::{InstallError, InstallResult};
pub use extractor::ShellExtractor;
pub use hook::{HttpConfigHook, HOOK_TIMEOUT};
pub use orchestrator::{InstallReport, InstallationOrchestrator, InstallationState, UninstallReport};
pub use profile::{host_platform, ProductProfile, DEFAULT_REGISTRY_URL};
pub use release::{ReleaseDescriptor, ReleaseResolver};
pub use traits::{
    ArchiveExtractor, ArtifactDownloader, BoxFuture, ConfigurationHook, ProgressCallback,
    ReleaseSource,
};
