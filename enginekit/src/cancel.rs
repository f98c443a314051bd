//! Cancellation shared between the caller and a running install.
//!
//! [`CancelToken`] combines a monotonic flag (a `tokio_util` cancellation
//! token, which in-flight download streams select on) with a registry of
//! child processes started on behalf of the install. Cancelling flips the
//! flag, which drops any stream waiting on it, and signals every registered
//! child.
//!
//! ```ignore
//! let token = CancelToken::new();
//! let worker = token.clone();
//! tokio::spawn(async move { orchestrator.install(&worker).await });
//! token.cancel();
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};
use tracing::{debug, warn};

use crate::installer::{InstallError, InstallResult};
use crate::process::{platform_terminator, Terminator};

struct Inner {
    token: CancellationToken,
    children: Mutex<HashMap<u64, u32>>,
    next_id: AtomicU64,
    terminator: Arc<dyn Terminator>,
}

/// Shared, idempotent cancellation flag plus in-flight child registry.
///
/// Cloning is cheap; all clones observe the same state. Once cancelled a
/// token stays cancelled, so every new install needs a fresh token.
#[derive(Clone)]
pub struct CancelToken {
    inner: Arc<Inner>,
}

impl fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancelled", &self.is_cancelled())
            .field("children", &self.inner.children.lock().len())
            .finish()
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelToken {
    /// Create a token that signals children with the platform terminator.
    pub fn new() -> Self {
        Self::with_terminator(platform_terminator())
    }

    /// Create a token with a custom terminator.
    pub fn with_terminator(terminator: Arc<dyn Terminator>) -> Self {
        Self {
            inner: Arc::new(Inner {
                token: CancellationToken::new(),
                children: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(0),
                terminator,
            }),
        }
    }

    /// Cancel: flip the flag and signal every registered child.
    ///
    /// Calling this more than once has no further effect.
    pub fn cancel(&self) {
        if self.inner.token.is_cancelled() {
            return;
        }
        self.inner.token.cancel();

        let pids: Vec<u32> = self.inner.children.lock().drain().map(|(_, p)| p).collect();
        for pid in pids {
            self.signal(pid);
        }
    }

    /// Whether [`cancel`](Self::cancel) has been called.
    pub fn is_cancelled(&self) -> bool {
        self.inner.token.is_cancelled()
    }

    /// Future that completes once the token is cancelled.
    pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.inner.token.cancelled()
    }

    /// Return `Err(Cancelled)` if the token has fired.
    pub fn check(&self) -> InstallResult<()> {
        if self.is_cancelled() {
            Err(InstallError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Register a child process that must be signalled on cancellation.
    ///
    /// The registration is removed when the returned guard is dropped. If
    /// the token is already cancelled the child is signalled immediately.
    pub fn register_child(&self, pid: u32) -> ChildRegistration {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        if self.is_cancelled() {
            self.signal(pid);
        } else {
            self.inner.children.lock().insert(id, pid);
        }
        ChildRegistration {
            inner: Arc::clone(&self.inner),
            id,
        }
    }

    /// Number of children currently registered.
    pub fn registered_children(&self) -> usize {
        self.inner.children.lock().len()
    }

    fn signal(&self, pid: u32) {
        debug!(pid, "Signalling child on cancellation");
        if let Err(e) = self.inner.terminator.terminate(pid, false) {
            warn!(pid, error = %e, "Failed to signal child on cancellation");
        }
    }
}

/// Guard returned by [`CancelToken::register_child`].
pub struct ChildRegistration {
    inner: Arc<Inner>,
    id: u64,
}

impl Drop for ChildRegistration {
    fn drop(&mut self) {
        self.inner.children.lock().remove(&self.id);
    }
}
