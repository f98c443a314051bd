//! Archive extraction through system tools.
//!
//! The installer treats decompression as an opaque capability. The default
//! [`ShellExtractor`] picks `7z`, `tar` or `unzip` from the archive
//! extension, runs it as a child process registered with the install's
//! [`CancelToken`], and kills it when the install is cancelled.

use std::path::Path;
use std::process::Stdio;

use tokio::process::Command;
use tracing::{debug, info};

use super::error::{InstallError, InstallResult};
use super::traits::{ArchiveExtractor, BoxFuture};
use crate::cancel::CancelToken;

/// Maximum number of stderr bytes kept in an extraction error.
const STDERR_TAIL: usize = 2048;

/// Tool invocation for one archive format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractCommand {
    pub program: String,
    pub args: Vec<String>,
}

/// Shell-based archive extractor.
#[derive(Debug, Clone)]
pub struct ShellExtractor {
    seven_zip: String,
}

impl Default for ShellExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl ShellExtractor {
    /// Create an extractor using `7z` from `PATH`.
    pub fn new() -> Self {
        Self {
            seven_zip: "7z".to_string(),
        }
    }

    /// Use a specific 7-Zip binary (e.g. `7za` or a bundled path).
    pub fn with_seven_zip(mut self, program: impl Into<String>) -> Self {
        self.seven_zip = program.into();
        self
    }

    /// Build the command line for `archive`, or `None` if the extension is unknown.
    pub fn command_for(&self, archive: &Path, dest_dir: &Path) -> Option<ExtractCommand> {
        let name = archive.file_name()?.to_string_lossy().to_lowercase();
        let archive_arg = archive.to_string_lossy().to_string();
        let dest_arg = dest_dir.to_string_lossy().to_string();

        let (program, args) = if name.ends_with(".7z") {
            (
                self.seven_zip.clone(),
                vec![
                    "x".to_string(),
                    "-y".to_string(),
                    format!("-o{}", dest_arg),
                    archive_arg,
                ],
            )
        } else if name.ends_with(".zip") {
            (
                "unzip".to_string(),
                vec![
                    "-q".to_string(),
                    "-o".to_string(),
                    archive_arg,
                    "-d".to_string(),
                    dest_arg,
                ],
            )
        } else if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            tar(&["-xzf"], archive_arg, dest_arg)
        } else if name.ends_with(".tar.xz") {
            tar(&["-xJf"], archive_arg, dest_arg)
        } else if name.ends_with(".tar") {
            tar(&["-xf"], archive_arg, dest_arg)
        } else {
            return None;
        };

        Some(ExtractCommand { program, args })
    }

    /// Run the extraction tool, racing it against cancellation.
    pub async fn extract_archive(
        &self,
        archive: &Path,
        dest_dir: &Path,
        cancel: &CancelToken,
    ) -> InstallResult<()> {
        cancel.check()?;

        let command = self
            .command_for(archive, dest_dir)
            .ok_or_else(|| InstallError::Extraction {
                path: archive.to_path_buf(),
                reason: "unsupported archive format".to_string(),
            })?;

        tokio::fs::create_dir_all(dest_dir)
            .await
            .map_err(|e| InstallError::io(dest_dir, e))?;

        info!(
            archive = %archive.display(),
            dest = %dest_dir.display(),
            tool = %command.program,
            "Extracting archive"
        );

        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);

        let child = cmd.spawn().map_err(|e| InstallError::Extraction {
            path: archive.to_path_buf(),
            reason: format!("failed to run {}: {}", command.program, e),
        })?;

        let _registration = child.id().map(|pid| cancel.register_child(pid));

        let output = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(archive = %archive.display(), "Extraction cancelled");
                return Err(InstallError::Cancelled);
            }
            out = child.wait_with_output() => out.map_err(|e| InstallError::Extraction {
                path: archive.to_path_buf(),
                reason: format!("failed to wait for {}: {}", command.program, e),
            })?,
        };

        if cancel.is_cancelled() {
            return Err(InstallError::Cancelled);
        }

        if !output.status.success() {
            return Err(InstallError::Extraction {
                path: archive.to_path_buf(),
                reason: format!(
                    "{} exited with {}: {}",
                    command.program,
                    output.status,
                    stderr_tail(&output.stderr)
                ),
            });
        }

        Ok(())
    }
}

impl ArchiveExtractor for ShellExtractor {
    fn extract<'a>(
        &'a self,
        archive: &'a Path,
        dest_dir: &'a Path,
        cancel: &'a CancelToken,
    ) -> BoxFuture<'a, InstallResult<()>> {
        Box::pin(self.extract_archive(archive, dest_dir, cancel))
    }
}

fn tar(flags: &[&str], archive: String, dest: String) -> (String, Vec<String>) {
    let mut args: Vec<String> = flags.iter().map(|f| f.to_string()).collect();
    args.push(archive);
    args.push("-C".to_string());
    args.push(dest);
    ("tar".to_string(), args)
}

fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let trimmed = text.trim();
    if trimmed.len() <= STDERR_TAIL {
        return trimmed.to_string();
    }
    let mut start = trimmed.len() - STDERR_TAIL;
    while !trimmed.is_char_boundary(start) {
        start += 1;
    }
    trimmed[start..].to_string()
}

/// Whether `program` can be started from `PATH`.
pub async fn tool_available(program: &str) -> bool {
    Command::new(program)
        .arg("--help")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .status()
        .await
        .is_ok()
}
