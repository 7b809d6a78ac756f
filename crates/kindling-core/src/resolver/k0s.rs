//! k0s releases from GitHub.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::BootstrapperKind;
use crate::version::Version;

use super::github::GithubReleases;
use super::{supported_window, window_count, VersionFinder};

pub struct K0sVersionFinder {
    releases: GithubReleases,
}

impl K0sVersionFinder {
    pub fn new() -> Result<Self> {
        Ok(Self {
            releases: GithubReleases::new("k0sproject", "k0s")?,
        })
    }
}

#[async_trait]
impl VersionFinder for K0sVersionFinder {
    fn kind(&self) -> BootstrapperKind {
        BootstrapperKind::K0s
    }

    async fn latest_version(&self) -> Result<Version> {
        self.releases.latest_release().await
    }

    async fn versions_after(&self, anchor: &Version) -> Result<Vec<Version>> {
        let releases = self.releases.release_versions(2).await?;
        Ok(supported_window(anchor, &releases, window_count()))
    }

    async fn has_patch_version(&self, version: &Version) -> bool {
        self.releases.has_release_version(version).await
    }
}
