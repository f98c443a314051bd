//! Startup script selection.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::error::{ProcessError, ProcessResult};
use crate::installer::ProductProfile;

/// How the managed process was started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StartupMode {
    /// Using the hardware accelerator.
    Gpu,
    /// CPU only.
    Cpu,
}

impl std::fmt::Display for StartupMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Gpu => f.write_str("GPU"),
            Self::Cpu => f.write_str("CPU"),
        }
    }
}

/// Chosen startup script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptSelection {
    pub script_path: PathBuf,
    pub mode: StartupMode,
}

/// Picks a startup script under a product root.
#[derive(Debug, Clone)]
pub struct StartupScriptSelector {
    profile: ProductProfile,
}

impl StartupScriptSelector {
    pub fn new(profile: ProductProfile) -> Self {
        Self { profile }
    }

    /// Ordered candidates for the given capability.
    ///
    /// With an accelerator: accelerator scripts, then CPU scripts.
    /// Without: CPU scripts only.
    pub fn candidates(&self, has_accelerator: bool) -> Vec<(&str, StartupMode)> {
        let cpu = self
            .profile
            .cpu_scripts
            .iter()
            .map(|s| (s.as_str(), StartupMode::Cpu));

        if has_accelerator {
            self.profile
                .gpu_scripts
                .iter()
                .map(|s| (s.as_str(), StartupMode::Gpu))
                .chain(cpu)
                .collect()
        } else {
            cpu.collect()
        }
    }

    /// Select the script to launch from `root_dir`.
    ///
    /// Falls back to any known script present, in the profile's fixed
    /// order, when no preferred candidate exists.
    pub fn select(&self, root_dir: &Path, has_accelerator: bool) -> ProcessResult<ScriptSelection> {
        for (name, mode) in self.candidates(has_accelerator) {
            let path = root_dir.join(name);
            if path.is_file() {
                debug!(script = %path.display(), mode = %mode, "Selected startup script");
                return Ok(ScriptSelection {
                    script_path: path,
                    mode,
                });
            }
        }

        for name in self.profile.known_scripts() {
            let path = root_dir.join(name);
            if path.is_file() {
                let mode = if self.profile.is_gpu_script(&path) {
                    StartupMode::Gpu
                } else {
                    StartupMode::Cpu
                };
                debug!(script = %path.display(), mode = %mode, "Falling back to available script");
                return Ok(ScriptSelection {
                    script_path: path,
                    mode,
                });
            }
        }

        Err(ProcessError::NoStartupScript {
            root: root_dir.to_path_buf(),
        })
    }
}
