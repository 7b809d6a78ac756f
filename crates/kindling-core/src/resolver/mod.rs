//! Release version resolution for every supported distribution.
//!
//! Each distribution has a [`VersionFinder`] that knows where its releases
//! are published. Resolution always goes through the on-disk cache first;
//! upstream endpoints are only consulted when the cache is empty.

pub mod channel;
pub mod github;

mod k0s;
mod k3s;
mod kubeadm;
mod rancherd;
mod rke;
mod rke2;
mod skuba;

use std::collections::BTreeMap;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::config::{BootstrapperVersion, ConfigStore};
use crate::error::{Error, Result};
use crate::types::BootstrapperKind;
use crate::version::{Version, SUPPORTED_MINOR_VERSION_COUNT};

pub use k0s::K0sVersionFinder;
pub use k3s::K3sVersionFinder;
pub use kubeadm::KubeadmVersionFinder;
pub use rancherd::RancherdVersionFinder;
pub use rke::RkeVersionFinder;
pub use rke2::Rke2VersionFinder;
pub use skuba::SkubaVersionFinder;

/// Knows where one distribution publishes its releases.
#[async_trait]
pub trait VersionFinder: Send + Sync {
    fn kind(&self) -> BootstrapperKind;

    /// Newest stable release.
    async fn latest_version(&self) -> Result<Version>;

    /// Supported window anchored at `anchor`: newest first, at most one
    /// release per distinct minor, at most
    /// [`SUPPORTED_MINOR_VERSION_COUNT`] entries.
    async fn versions_after(&self, anchor: &Version) -> Result<Vec<Version>>;

    /// Whether an exact release exists upstream for the given version.
    async fn has_patch_version(&self, version: &Version) -> bool;

    /// Attach companion versions to a resolved window. The default carries
    /// the bare version only.
    async fn bootstrapper_versions(
        &self,
        versions: &[Version],
    ) -> Result<Vec<BootstrapperVersion>> {
        Ok(versions
            .iter()
            .cloned()
            .map(|v| BootstrapperVersion::plain(self.kind(), v))
            .collect())
    }
}

/// Construct the finder for a distribution.
pub fn new_finder(kind: BootstrapperKind) -> Result<Box<dyn VersionFinder>> {
    Ok(match kind {
        BootstrapperKind::Kubeadm => Box::new(KubeadmVersionFinder::new()?),
        BootstrapperKind::K3s => Box::new(K3sVersionFinder::new()?),
        BootstrapperKind::Rke => Box::new(RkeVersionFinder::new()?),
        BootstrapperKind::Rke2 => Box::new(Rke2VersionFinder::new()?),
        BootstrapperKind::K0s => Box::new(K0sVersionFinder::new()?),
        BootstrapperKind::Skuba => Box::new(SkubaVersionFinder::new()),
        BootstrapperKind::Rancherd => Box::new(RancherdVersionFinder::new()?),
    })
}

/// Pure windowing walk over a release list: keep the newest patch of each
/// distinct minor at or below the anchor's minor, newest first, bounded by
/// `count`. Minors absent from the list are skipped; running out of minors
/// in a major rolls into the previous major.
pub fn supported_window(anchor: &Version, releases: &[Version], count: usize) -> Vec<Version> {
    let anchor_key = (anchor.major(), anchor.minor());

    let mut best: BTreeMap<(u64, u64), Version> = BTreeMap::new();
    for release in releases {
        let key = (release.major(), release.minor());
        if key > anchor_key {
            continue;
        }
        match best.get(&key) {
            Some(existing) if existing >= release => {}
            _ => {
                best.insert(key, release.clone());
            }
        }
    }

    best.into_values().rev().take(count).collect()
}

/// Resolve every installable version of a distribution, reading the cache
/// first. A non-empty cache short-circuits all upstream calls.
pub async fn ensure_versions(
    finder: &dyn VersionFinder,
    store: &ConfigStore,
) -> Result<Vec<BootstrapperVersion>> {
    let kind = finder.kind();

    let cached = store.load_version_cache(kind)?;
    if !cached.is_empty() {
        debug!(bootstrapper = %kind, entries = cached.len(), "using cached version window");
        return Ok(cached);
    }

    let latest = finder.latest_version().await?;
    let window = finder.versions_after(&latest).await?;
    let records = finder.bootstrapper_versions(&window).await?;
    store.save_version_cache(&records)?;
    info!(bootstrapper = %kind, latest = %latest, entries = records.len(), "resolved version window");
    Ok(records)
}

/// Resolve a user-supplied version string to an installable record.
///
/// Order: empty input takes the newest supported version; then an exact
/// match against the window; then a `vX.Y` prefix match; then a full
/// `vX.Y.Z` confirmed upstream as an existing patch release. Anything else
/// is [`Error::VersionNotFound`].
pub async fn resolve_version(
    finder: &dyn VersionFinder,
    store: &ConfigStore,
    requested: &str,
    force: bool,
) -> Result<BootstrapperVersion> {
    let kind = finder.kind();
    if force {
        store.delete_version_cache(kind)?;
    }

    let records = ensure_versions(finder, store).await?;

    let requested = requested.trim();
    if requested.is_empty() {
        return records
            .first()
            .cloned()
            .ok_or_else(|| not_found(kind, "latest"));
    }

    let wanted = Version::parse(requested).map_err(|_| not_found(kind, requested))?;

    if let Some(record) = records.iter().find(|r| r.version() == &wanted) {
        return Ok(record.clone());
    }

    let requested_patch = requested
        .trim_start_matches('v')
        .split('.')
        .nth(2)
        .is_some();

    if !requested_patch {
        // vX.Y picks whatever patch of that minor the window carries
        if let Some(record) = records.iter().find(|r| r.version().same_minor(&wanted)) {
            return Ok(record.clone());
        }
        return Err(not_found(kind, requested));
    }

    if finder.has_patch_version(&wanted).await {
        let record = records
            .iter()
            .find(|r| r.version().same_minor(&wanted))
            .map(|r| r.with_version(wanted.clone()))
            .unwrap_or_else(|| BootstrapperVersion::plain(kind, wanted));
        return Ok(record);
    }

    Err(not_found(kind, requested))
}

fn not_found(kind: BootstrapperKind, requested: &str) -> Error {
    Error::VersionNotFound {
        bootstrapper: kind.to_string(),
        version: requested.to_string(),
    }
}

/// Window bound shared by all finders.
pub(crate) fn window_count() -> usize {
    SUPPORTED_MINOR_VERSION_COUNT
}
