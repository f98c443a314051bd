//! Post-install configuration handoff.
//!
//! After a successful install the host's configuration store learns where
//! the runtime lives through a small JSON POST to a local endpoint.

use std::path::Path;
use std::time::Duration;

use serde::Serialize;
use tracing::debug;

use super::error::{InstallError, InstallResult};
use super::release::ReleaseDescriptor;
use super::traits::{BoxFuture, ConfigurationHook};

/// Budget for the handoff request.
pub const HOOK_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Serialize)]
struct HookPayload<'a> {
    install_dir: &'a Path,
    root_dir: &'a Path,
    version: &'a str,
}

/// Notifies a local HTTP endpoint of the installed runtime.
#[derive(Debug, Clone)]
pub struct HttpConfigHook {
    client: reqwest::Client,
    url: String,
}

impl HttpConfigHook {
    /// Create a hook posting to `url`.
    pub fn new(url: impl Into<String>) -> InstallResult<Self> {
        let url = url.into();
        let client = reqwest::Client::builder()
            .timeout(HOOK_TIMEOUT)
            .build()
            .map_err(|e| InstallError::Hook {
                url: url.clone(),
                reason: e.to_string(),
            })?;
        Ok(Self { client, url })
    }

    /// Endpoint this hook posts to.
    pub fn url(&self) -> &str {
        &self.url
    }

    async fn post(
        &self,
        install_dir: &Path,
        root_dir: &Path,
        release: &ReleaseDescriptor,
    ) -> InstallResult<()> {
        let payload = HookPayload {
            install_dir,
            root_dir,
            version: &release.version,
        };
        debug!(url = %self.url, root = %root_dir.display(), "Posting install location");

        let response = self
            .client
            .post(&self.url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| InstallError::Hook {
                url: self.url.clone(),
                reason: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(InstallError::Hook {
                url: self.url.clone(),
                reason: format!("status {}", response.status()),
            });
        }
        Ok(())
    }
}

impl ConfigurationHook for HttpConfigHook {
    fn configure<'a>(
        &'a self,
        install_dir: &'a Path,
        root_dir: &'a Path,
        release: &'a ReleaseDescriptor,
    ) -> BoxFuture<'a, InstallResult<()>> {
        Box::pin(self.post(install_dir, root_dir, release))
    }
}
