//! Per-call download session bookkeeping.

/// State of one [`DownloadManager`](super::DownloadManager) call.
///
/// `downloaded_bytes` never drops below `resume_offset_bytes` except through
/// [`restart`](Self::restart), which resets both.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DownloadSession {
    /// Bytes already on disk when the current attempt started.
    pub resume_offset_bytes: u64,
    /// Total size learned from the server, if announced.
    pub total_size_bytes: Option<u64>,
    /// Bytes present in the destination file.
    pub downloaded_bytes: u64,
    /// 1-based number of the current attempt.
    pub attempt_number: u32,
}

impl DownloadSession {
    /// Create an empty session.
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin a new attempt resuming from `offset` bytes.
    pub fn begin_attempt(&mut self, offset: u64) {
        self.attempt_number += 1;
        self.resume_offset_bytes = offset;
        self.downloaded_bytes = offset;
        self.total_size_bytes = None;
    }

    /// The server ignored the range request; the body starts at zero.
    pub fn restart(&mut self) {
        self.resume_offset_bytes = 0;
        self.downloaded_bytes = 0;
    }

    /// Record a received chunk.
    pub fn record_chunk(&mut self, len: usize) {
        self.downloaded_bytes += len as u64;
    }

    /// Whether the current attempt asked the server to resume.
    pub fn is_resume(&self) -> bool {
        self.resume_offset_bytes > 0
    }

    /// Progress as a percentage, if the total is known.
    pub fn progress_percent(&self) -> Option<f64> {
        match self.total_size_bytes {
            Some(0) => Some(100.0),
            Some(total) => Some((self.downloaded_bytes as f64 / total as f64) * 100.0),
            None => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_begin_attempt_counts_and_resumes() {
        let mut session = DownloadSession::new();
        session.begin_attempt(0);
        assert_eq!(session.attempt_number, 1);
        assert!(!session.is_resume());

        session.record_chunk(100);
        session.begin_attempt(100);
        assert_eq!(session.attempt_number, 2);
        assert!(session.is_resume());
        assert_eq!(session.downloaded_bytes, 100);
        assert!(session.downloaded_bytes >= session.resume_offset_bytes);
    }

    #[test]
    fn test_restart_resets_counters() {
        let mut session = DownloadSession::new();
        session.begin_attempt(500);
        session.restart();
        assert_eq!(session.resume_offset_bytes, 0);
        assert_eq!(session.downloaded_bytes, 0);
        assert_eq!(session.attempt_number, 1);
    }

    #[test]
    fn test_progress_percent() {
        let mut session = DownloadSession::new();
        session.begin_attempt(0);
        assert_eq!(session.progress_percent(), None);

        session.total_size_bytes = Some(1000);
        session.record_chunk(250);
        assert_eq!(session.progress_percent(), Some(25.0));
    }
}
