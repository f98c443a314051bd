//! Resumable HTTP downloader for runtime archives.
//!
//! This module provides the single-file transfer used by the installer:
//! - Resume from an existing partial file via HTTP Range requests
//! - Fallback to a full body when the server ignores the range
//! - Retry with a fixed delay, classifying failures as network or corruption
//! - Stall detection and cooperative cancellation on every await
//! - Throttled progress callbacks

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::header::{CONTENT_RANGE, RANGE};
use reqwest::{Client, StatusCode};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, info, warn};

use super::progress::ProgressThrottle;
use super::state::DownloadSession;
use crate::cancel::CancelToken;
use crate::control::ControlChannel;
use crate::installer::error::{InstallError, InstallResult};
use crate::installer::traits::{ArtifactDownloader, BoxFuture, ProgressCallback};

/// Default number of retries after the first attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default connect and stall timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default pause between attempts.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(3);

/// Extension appended to a transfer's staging file.
pub const PARTIAL_SUFFIX: &str = "part";

const USER_AGENT: &str = concat!("enginekit/", env!("CARGO_PKG_VERSION"));

/// Tuning for [`DownloadManager`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownloadOptions {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Connect timeout, and the longest allowed gap between two chunks.
    pub timeout: Duration,
    /// Fixed delay between attempts.
    pub retry_delay: Duration,
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            timeout: DEFAULT_TIMEOUT,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }
}

impl DownloadOptions {
    /// Set the retry count.
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Set the connect/stall timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the delay between attempts.
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Total number of attempts made before giving up.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

/// Resumable single-file HTTP downloader.
///
/// Bytes land in a staging file next to the destination (see
/// [`partial_path`]) that is renamed into place only after the size check
/// passes, so the destination path never holds a truncated artifact.
/// Network-class failures keep the staging file so the next attempt can
/// resume it; every other failure deletes it first. Once the last attempt
/// fails the staging file is always removed.
pub struct DownloadManager {
    client: Client,
    options: DownloadOptions,
    channel: Option<Arc<dyn ControlChannel>>,
}

impl std::fmt::Debug for DownloadManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadManager")
            .field("options", &self.options)
            .finish()
    }
}

impl DownloadManager {
    /// Create a downloader with the given options.
    pub fn new(options: DownloadOptions) -> InstallResult<Self> {
        let client = Client::builder()
            .connect_timeout(options.timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| InstallError::Network {
                url: String::new(),
                reason: format!("failed to build HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            options,
            channel: None,
        })
    }

    /// Report retries on a control channel.
    pub fn with_channel(mut self, channel: Arc<dyn ControlChannel>) -> Self {
        self.channel = Some(channel);
        self
    }

    /// Options in effect.
    pub fn options(&self) -> &DownloadOptions {
        &self.options
    }

    /// Download `url` to `dest`.
    ///
    /// Returns the final size of `dest` in bytes. A cancelled transfer keeps
    /// its staging file, and the next call for the same `dest` resumes it.
    pub async fn download(
        &self,
        url: &str,
        dest: &Path,
        on_progress: ProgressCallback,
        cancel: &CancelToken,
    ) -> InstallResult<u64> {
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| InstallError::io(parent, e))?;
        }

        let staging = partial_path(dest);
        let mut throttle = ProgressThrottle::new(on_progress);
        let mut session = DownloadSession::new();
        let max_attempts = self.options.max_attempts();

        loop {
            cancel.check()?;

            let offset = partial_size(&staging).await;
            session.begin_attempt(offset);
            debug!(
                url = %url,
                attempt = session.attempt_number,
                offset,
                "Starting download attempt"
            );

            let error = match self
                .attempt(url, &staging, &mut session, &mut throttle, cancel)
                .await
            {
                Ok(size) => {
                    fs::rename(&staging, dest)
                        .await
                        .map_err(|e| InstallError::io(dest, e))?;
                    throttle.finish(size, session.total_size_bytes.or(Some(size)));
                    info!(url = %url, bytes = size, "Download complete");
                    return Ok(size);
                }
                Err(InstallError::Cancelled) => {
                    info!(
                        url = %url,
                        bytes = session.downloaded_bytes,
                        "Download cancelled; keeping partial file"
                    );
                    return Err(InstallError::Cancelled);
                }
                Err(e) => e,
            };

            let last = session.attempt_number >= max_attempts;
            if last || !error.is_network() {
                remove_partial(&staging).await;
            }

            if last {
                return Err(InstallError::DownloadFailed {
                    url: url.to_string(),
                    attempts: session.attempt_number,
                    reason: error.to_string(),
                });
            }

            warn!(
                url = %url,
                attempt = session.attempt_number,
                max_attempts,
                error = %error,
                "Download attempt failed; retrying"
            );
            if let Some(channel) = &self.channel {
                channel.emit_log(&format!(
                    "Download attempt {}/{} failed: {}. Retrying in {}s",
                    session.attempt_number,
                    max_attempts,
                    error,
                    self.options.retry_delay.as_secs_f32()
                ));
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(InstallError::Cancelled),
                _ = tokio::time::sleep(self.options.retry_delay) => {}
            }
        }
    }

    /// One request/stream cycle into the staging file `dest`.
    async fn attempt(
        &self,
        url: &str,
        dest: &Path,
        session: &mut DownloadSession,
        throttle: &mut ProgressThrottle,
        cancel: &CancelToken,
    ) -> InstallResult<u64> {
        let offset = session.resume_offset_bytes;
        let mut request = self.client.get(url);
        if session.is_resume() {
            request = request.header(RANGE, format!("bytes={}-", offset));
        }

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(InstallError::Cancelled),
            sent = tokio::time::timeout(self.options.timeout, request.send()) => match sent {
                Ok(result) => result.map_err(|e| InstallError::from_reqwest(url, e))?,
                Err(_) => {
                    return Err(InstallError::Network {
                        url: url.to_string(),
                        reason: format!("no response within {:?}", self.options.timeout),
                    })
                }
            },
        };

        let status = response.status();
        if status == StatusCode::RANGE_NOT_SATISFIABLE {
            warn!(url = %url, offset, "Server rejected resume range; discarding partial file");
            return Err(InstallError::Http {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        if !status.is_success() {
            return Err(InstallError::Http {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let file = if session.is_resume() && status == StatusCode::PARTIAL_CONTENT {
            let header = response
                .headers()
                .get(CONTENT_RANGE)
                .and_then(|v| v.to_str().ok());
            session.total_size_bytes =
                parse_content_range(url, offset, header, response.content_length())?;
            debug!(url = %url, offset, total = ?session.total_size_bytes, "Resuming download");
            OpenOptions::new()
                .append(true)
                .open(dest)
                .await
                .map_err(|e| InstallError::io(dest, e))?
        } else {
            if session.is_resume() {
                info!(url = %url, offset, "Server ignored range request; restarting from zero");
                session.restart();
            }
            session.total_size_bytes = response.content_length();
            File::create(dest)
                .await
                .map_err(|e| InstallError::io(dest, e))?
        };

        let mut writer = BufWriter::new(file);
        let mut stream = response.bytes_stream();

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    flush_quietly(&mut writer, dest).await;
                    return Err(InstallError::Cancelled);
                }
                _ = tokio::time::sleep(self.options.timeout) => {
                    flush_quietly(&mut writer, dest).await;
                    return Err(InstallError::Network {
                        url: url.to_string(),
                        reason: format!("stalled: no data for {:?}", self.options.timeout),
                    });
                }
                chunk = stream.next() => chunk,
            };

            let Some(next) = next else {
                break;
            };

            let chunk = match next {
                Ok(chunk) => chunk,
                Err(e) => {
                    flush_quietly(&mut writer, dest).await;
                    return Err(InstallError::Network {
                        url: url.to_string(),
                        reason: format!("body stream interrupted: {}", e),
                    });
                }
            };

            writer
                .write_all(&chunk)
                .await
                .map_err(|e| InstallError::io(dest, e))?;
            session.record_chunk(chunk.len());
            throttle.update(session.downloaded_bytes, session.total_size_bytes);
        }

        writer
            .flush()
            .await
            .map_err(|e| InstallError::io(dest, e))?;
        drop(writer);

        let actual = fs::metadata(dest)
            .await
            .map_err(|e| InstallError::io(dest, e))?
            .len();

        if let Some(expected) = session.total_size_bytes {
            if actual != expected {
                return Err(InstallError::SizeMismatch {
                    filename: file_name(dest),
                    expected,
                    actual,
                });
            }
        }

        Ok(actual)
    }
}

impl ArtifactDownloader for DownloadManager {
    fn download<'a>(
        &'a self,
        url: &'a str,
        dest: &'a Path,
        on_progress: ProgressCallback,
        cancel: &'a CancelToken,
    ) -> BoxFuture<'a, InstallResult<u64>> {
        Box::pin(DownloadManager::download(self, url, dest, on_progress, cancel))
    }
}

/// Interpret `Content-Range: bytes <start>-<end>/<total>` for a resume.
///
/// Returns the total size of the resource. A start that differs from
/// `offset` means the server is not continuing our partial file.
fn parse_content_range(
    url: &str,
    offset: u64,
    header: Option<&str>,
    content_length: Option<u64>,
) -> InstallResult<Option<u64>> {
    let bad = |reason: &str| InstallError::BadContentRange {
        url: url.to_string(),
        reason: reason.to_string(),
    };

    let Some(value) = header else {
        return Ok(content_length.map(|len| offset + len));
    };

    let rest = value
        .trim()
        .strip_prefix("bytes ")
        .ok_or_else(|| bad(value))?;
    let (range, total) = rest.split_once('/').ok_or_else(|| bad(value))?;
    let start = range
        .split('-')
        .next()
        .and_then(|s| s.trim().parse::<u64>().ok())
        .ok_or_else(|| bad(value))?;

    if start != offset {
        return Err(bad(&format!(
            "range starts at {} but partial file has {} bytes",
            start, offset
        )));
    }

    match total.trim() {
        "*" => Ok(content_length.map(|len| offset + len)),
        t => t.parse::<u64>().map(Some).map_err(|_| bad(value)),
    }
}

/// Staging file used for `dest` while its transfer is incomplete.
pub fn partial_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().unwrap_or_default().to_os_string();
    name.push(".");
    name.push(PARTIAL_SUFFIX);
    dest.with_file_name(name)
}

async fn partial_size(dest: &Path) -> u64 {
    fs::metadata(dest)
        .await
        .ok()
        .filter(|m| m.is_file())
        .map(|m| m.len())
        .unwrap_or(0)
}

async fn remove_partial(dest: &Path) {
    match fs::remove_file(dest).await {
        Ok(()) => debug!(path = %dest.display(), "Removed partial download"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %dest.display(), error = %e, "Failed to remove partial download"),
    }
}

async fn flush_quietly(writer: &mut BufWriter<File>, dest: &Path) {
    if let Err(e) = writer.flush().await {
        warn!(path = %dest.display(), error = %e, "Failed to flush partial download");
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .unwrap_or_default()
        .to_string_lossy()
        .to_string()
}
