//! Release discovery.
//!
//! Resolves the newest published release of the managed runtime from a
//! GitHub-style releases endpoint and picks the asset matching the local
//! platform and accelerator naming conventions.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::error::{InstallError, InstallResult};
use super::profile::ProductProfile;
use super::traits::{BoxFuture, ReleaseSource};

/// Fixed budget for the registry lookup.
pub const REGISTRY_TIMEOUT: Duration = Duration::from_secs(10);

/// User agent sent to the registry (GitHub rejects requests without one).
const USER_AGENT: &str = concat!("enginekit/", env!("CARGO_PKG_VERSION"));

/// Metadata identifying one downloadable version of the runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseDescriptor {
    /// Release tag, e.g. `v0.3.43`.
    pub version: String,
    /// Direct download URL of the archive.
    pub download_url: String,
    /// File name of the archive.
    pub file_name: String,
    /// Announced size in bytes.
    pub size_bytes: Option<u64>,
    /// Algorithm-prefixed digest, e.g. `sha256:<hex>`.
    pub digest: Option<String>,
}

impl ReleaseDescriptor {
    /// Create a descriptor without size or digest.
    pub fn new(
        version: impl Into<String>,
        download_url: impl Into<String>,
        file_name: impl Into<String>,
    ) -> Self {
        Self {
            version: version.into(),
            download_url: download_url.into(),
            file_name: file_name.into(),
            size_bytes: None,
            digest: None,
        }
    }

    /// Set the announced size.
    pub fn with_size(mut self, size: u64) -> Self {
        self.size_bytes = Some(size);
        self
    }

    /// Set the published digest.
    pub fn with_digest(mut self, digest: impl Into<String>) -> Self {
        self.digest = Some(digest.into());
        self
    }
}

/// Release object as returned by the registry.
#[derive(Debug, Clone, Deserialize)]
pub struct RegistryRelease {
    pub tag_name: String,
    #[serde(default)]
    pub assets: Vec<RegistryAsset>,
}

/// Asset entry of a [`RegistryRelease`].
#[derive(Debug, Clone, Deserialize)]
pub struct RegistryAsset {
    pub name: String,
    pub browser_download_url: String,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub digest: Option<String>,
}

/// Pick the asset for this platform.
///
/// Prefers an asset naming both the platform and the accelerator variant;
/// otherwise any asset naming the platform. Only archives with one of the
/// profile's extensions are considered.
pub fn select_asset<'a>(
    release: &'a RegistryRelease,
    profile: &ProductProfile,
) -> Option<&'a RegistryAsset> {
    let platform = profile.platform.to_lowercase();
    let accelerator = profile.accelerator.to_lowercase();

    let candidates: Vec<&RegistryAsset> = release
        .assets
        .iter()
        .filter(|a| profile.is_supported_archive(&a.name))
        .filter(|a| a.name.to_lowercase().contains(&platform))
        .collect();

    candidates
        .iter()
        .find(|a| !accelerator.is_empty() && a.name.to_lowercase().contains(&accelerator))
        .or_else(|| candidates.first())
        .copied()
}

/// Convert a registry release into a descriptor for this platform.
pub fn descriptor_from_release(
    release: &RegistryRelease,
    profile: &ProductProfile,
) -> InstallResult<ReleaseDescriptor> {
    let asset = select_asset(release, profile).ok_or_else(|| InstallError::NoSuitableAsset {
        version: release.tag_name.clone(),
    })?;

    Ok(ReleaseDescriptor {
        version: release.tag_name.clone(),
        download_url: asset.browser_download_url.clone(),
        file_name: asset.name.clone(),
        size_bytes: asset.size.filter(|s| *s > 0),
        digest: asset.digest.clone().filter(|d| !d.trim().is_empty()),
    })
}

/// Resolves the latest release from a remote registry.
#[derive(Debug, Clone)]
pub struct ReleaseResolver {
    client: reqwest::Client,
    endpoint: String,
    profile: ProductProfile,
}

impl ReleaseResolver {
    /// Create a resolver for the profile's registry endpoint.
    pub fn new(profile: ProductProfile) -> InstallResult<Self> {
        let endpoint = profile.registry_url.clone();
        Self::with_endpoint(profile, endpoint)
    }

    /// Create a resolver against a custom endpoint.
    pub fn with_endpoint(
        profile: ProductProfile,
        endpoint: impl Into<String>,
    ) -> InstallResult<Self> {
        let endpoint = endpoint.into();
        let client = reqwest::Client::builder()
            .timeout(REGISTRY_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| InstallError::from_reqwest(&endpoint, e))?;

        Ok(Self {
            client,
            endpoint,
            profile,
        })
    }

    /// Registry endpoint queried by this resolver.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Query the registry and select the matching asset.
    pub async fn resolve_latest(&self) -> InstallResult<ReleaseDescriptor> {
        debug!(endpoint = %self.endpoint, "Querying release registry");

        let response = self
            .client
            .get(&self.endpoint)
            .header("Accept", "application/vnd.github+json")
            .send()
            .await
            .map_err(|e| InstallError::from_reqwest(&self.endpoint, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(InstallError::Http {
                url: self.endpoint.clone(),
                status: status.as_u16(),
            });
        }

        let release: RegistryRelease =
            response
                .json()
                .await
                .map_err(|e| InstallError::ReleaseParse {
                    url: self.endpoint.clone(),
                    reason: e.to_string(),
                })?;

        descriptor_from_release(&release, &self.profile)
    }
}

impl ReleaseSource for ReleaseResolver {
    fn latest(&self) -> BoxFuture<'_, InstallResult<ReleaseDescriptor>> {
        Box::pin(self.resolve_latest())
    }
}
