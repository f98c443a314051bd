//! Naming conventions of the managed product.
//!
//! A [`ProductProfile`] captures everything that is specific to the runtime
//! being installed: where releases are published, which asset to pick, what
//! the extracted tree looks like and which scripts start it. The default
//! profile describes the ComfyUI portable distribution.

use std::path::Path;

use super::release::ReleaseDescriptor;

/// Latest-release endpoint of the default product.
pub const DEFAULT_REGISTRY_URL: &str =
    "https://api.github.com/repos/comfyanonymous/ComfyUI/releases/latest";

/// Last known good release, used when the registry is unreachable.
const FALLBACK_VERSION: &str = "v0.3.43";

const FALLBACK_ASSET: &str = "ComfyUI_windows_portable_nvidia.7z";

/// Archive extensions the default extractor understands.
const ARCHIVE_EXTENSIONS: &[&str] = &[".7z", ".zip", ".tar.gz", ".tgz", ".tar.xz", ".tar"];

/// Describes one managed product.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductProfile {
    /// Display name.
    pub name: String,
    /// Registry endpoint returning the latest release.
    pub registry_url: String,
    /// Platform token expected in asset names (`windows`, `linux`, ...).
    pub platform: String,
    /// Accelerator variant token preferred in asset names (`nvidia`).
    pub accelerator: String,
    /// Supported archive extensions, lowercase, with leading dot.
    pub archive_extensions: Vec<String>,
    /// Name of the install directory below the data directory.
    pub install_dir_name: String,
    /// Candidate product root directories, in search order.
    pub root_candidates: Vec<String>,
    /// Entries that mark a directory as the product root itself.
    pub root_markers: Vec<String>,
    /// Startup scripts using the accelerator, in priority order.
    pub gpu_scripts: Vec<String>,
    /// CPU-only startup scripts, in priority order.
    pub cpu_scripts: Vec<String>,
    /// Glob matching stale downloaded artifacts in the temp area.
    pub artifact_pattern: String,
    /// Descriptor used when the registry lookup fails.
    pub fallback: ReleaseDescriptor,
}

impl Default for ProductProfile {
    fn default() -> Self {
        Self::comfyui_portable()
    }
}

impl ProductProfile {
    /// Profile for the ComfyUI portable distribution.
    pub fn comfyui_portable() -> Self {
        let (gpu_scripts, cpu_scripts) = if cfg!(windows) {
            (
                vec![
                    "run_nvidia_gpu.bat".to_string(),
                    "run_nvidia_gpu_fast_fp16_accumulation.bat".to_string(),
                ],
                vec!["run_cpu.bat".to_string()],
            )
        } else {
            (
                vec!["run_nvidia_gpu.sh".to_string()],
                vec!["run_cpu.sh".to_string()],
            )
        };

        let mut root_markers: Vec<String> = vec!["ComfyUI".to_string(), "main.py".to_string()];
        root_markers.extend(gpu_scripts.iter().cloned());
        root_markers.extend(cpu_scripts.iter().cloned());

        Self {
            name: "ComfyUI".to_string(),
            registry_url: DEFAULT_REGISTRY_URL.to_string(),
            platform: host_platform().to_string(),
            accelerator: "nvidia".to_string(),
            archive_extensions: ARCHIVE_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
            install_dir_name: "comfyui".to_string(),
            root_candidates: vec![
                "ComfyUI_windows_portable".to_string(),
                "ComfyUI_portable".to_string(),
                "ComfyUI".to_string(),
            ],
            root_markers,
            gpu_scripts,
            cpu_scripts,
            artifact_pattern: "ComfyUI*".to_string(),
            fallback: ReleaseDescriptor::new(
                FALLBACK_VERSION,
                format!(
                    "https://github.com/comfyanonymous/ComfyUI/releases/download/{}/{}",
                    FALLBACK_VERSION, FALLBACK_ASSET
                ),
                FALLBACK_ASSET,
            ),
        }
    }

    /// Set the registry endpoint.
    pub fn with_registry_url(mut self, url: impl Into<String>) -> Self {
        self.registry_url = url.into();
        self
    }

    /// Set the platform token.
    pub fn with_platform(mut self, platform: impl Into<String>) -> Self {
        self.platform = platform.into();
        self
    }

    /// Set the accelerator token.
    pub fn with_accelerator(mut self, accelerator: impl Into<String>) -> Self {
        self.accelerator = accelerator.into();
        self
    }

    /// Set the fallback descriptor.
    pub fn with_fallback(mut self, fallback: ReleaseDescriptor) -> Self {
        self.fallback = fallback;
        self
    }

    /// Whether `file_name` has one of the supported archive extensions.
    pub fn is_supported_archive(&self, file_name: &str) -> bool {
        let lower = file_name.to_lowercase();
        self.archive_extensions
            .iter()
            .any(|ext| lower.ends_with(ext.as_str()))
    }

    /// Every known startup script in fixed priority order.
    pub fn known_scripts(&self) -> impl Iterator<Item = &str> {
        self.gpu_scripts
            .iter()
            .chain(self.cpu_scripts.iter())
            .map(String::as_str)
    }

    /// Whether `script` is one of the accelerator scripts.
    pub fn is_gpu_script(&self, script: &Path) -> bool {
        script
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| self.gpu_scripts.iter().any(|s| s == n))
            .unwrap_or(false)
    }
}

/// Platform token of the running host.
pub fn host_platform() -> &'static str {
    match std::env::consts::OS {
        "macos" => "macos",
        "linux" => "linux",
        "windows" => "windows",
        other => other,
    }
}
