//! Progress throttling for single-file downloads.

use std::time::{Duration, Instant};

use crate::installer::traits::ProgressCallback;

/// Minimum interval between two progress callbacks.
pub const PROGRESS_INTERVAL: Duration = Duration::from_millis(500);

/// Rate-limits a [`ProgressCallback`].
///
/// At most one callback per interval is forwarded; [`finish`](Self::finish)
/// always forwards so the caller sees the final byte count.
pub struct ProgressThrottle {
    callback: ProgressCallback,
    interval: Duration,
    last_emit: Option<Instant>,
}

impl ProgressThrottle {
    /// Throttle with the default 500ms interval.
    pub fn new(callback: ProgressCallback) -> Self {
        Self::with_interval(callback, PROGRESS_INTERVAL)
    }

    /// Throttle with a custom interval.
    pub fn with_interval(callback: ProgressCallback, interval: Duration) -> Self {
        Self {
            callback,
            interval,
            last_emit: None,
        }
    }

    /// Forward the update if the interval has elapsed since the last one.
    ///
    /// Returns whether the callback was invoked.
    pub fn update(&mut self, downloaded: u64, total: Option<u64>) -> bool {
        let now = Instant::now();
        let due = self
            .last_emit
            .map(|last| now.duration_since(last) >= self.interval)
            .unwrap_or(true);

        if due {
            self.last_emit = Some(now);
            (self.callback)(downloaded, total);
        }
        due
    }

    /// Forward a final update unconditionally.
    pub fn finish(&mut self, downloaded: u64, total: Option<u64>) {
        self.last_emit = Some(Instant::now());
        (self.callback)(downloaded, total);
    }
}
