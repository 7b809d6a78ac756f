//! rancherd releases from the rancher/rancher repository, anchored to the
//! v2.5 line where rancherd first shipped.

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::types::BootstrapperKind;
use crate::version::Version;

use super::github::GithubReleases;
use super::{supported_window, window_count, VersionFinder};

pub struct RancherdVersionFinder {
    releases: GithubReleases,
    anchor: Version,
}

impl RancherdVersionFinder {
    pub fn new() -> Result<Self> {
        Ok(Self {
            releases: GithubReleases::new("rancher", "rancher")?,
            // upper bound inside the v2.5 minor line
            anchor: Version::parse("v2.5.100")?,
        })
    }
}

#[async_trait]
impl VersionFinder for RancherdVersionFinder {
    fn kind(&self) -> BootstrapperKind {
        BootstrapperKind::Rancherd
    }

    async fn latest_version(&self) -> Result<Version> {
        let releases = self.releases.release_versions(2).await?;
        releases
            .into_iter()
            .filter(|v| v <= &self.anchor)
            .max()
            .ok_or_else(|| Error::VersionNotFound {
                bootstrapper: self.kind().to_string(),
                version: self.anchor.major_minor_string(),
            })
    }

    async fn versions_after(&self, anchor: &Version) -> Result<Vec<Version>> {
        let releases = self.releases.release_versions(2).await?;
        let bounded: Vec<Version> = releases
            .into_iter()
            .filter(|v| v <= &self.anchor)
            .collect();
        Ok(supported_window(anchor, &bounded, window_count()))
    }

    async fn has_patch_version(&self, version: &Version) -> bool {
        version <= &self.anchor && self.releases.has_release_version(version).await
    }
}
