//! RKE2 releases via the Rancher channel feed.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::BootstrapperKind;
use crate::version::Version;

use super::channel::ChannelClient;
use super::github::GithubReleases;
use super::{supported_window, window_count, VersionFinder};

const CHANNEL_URL: &str = "https://update.rke2.io/v1-release/channels";

pub struct Rke2VersionFinder {
    channels: ChannelClient,
    releases: GithubReleases,
}

impl Rke2VersionFinder {
    pub fn new() -> Result<Self> {
        Ok(Self {
            channels: ChannelClient::new(CHANNEL_URL)?,
            releases: GithubReleases::new("rancher", "rke2")?,
        })
    }
}

#[async_trait]
impl VersionFinder for Rke2VersionFinder {
    fn kind(&self) -> BootstrapperKind {
        BootstrapperKind::Rke2
    }

    async fn latest_version(&self) -> Result<Version> {
        self.channels.latest().await
    }

    async fn versions_after(&self, anchor: &Version) -> Result<Vec<Version>> {
        let minors = self.channels.minor_versions().await?;
        Ok(supported_window(anchor, &minors, window_count()))
    }

    async fn has_patch_version(&self, version: &Version) -> bool {
        self.releases.has_release_tag(&release_tag(version)).await
    }
}

/// Release tags carry a +rke2rN revision; every released patch ships a
/// first revision.
fn release_tag(version: &Version) -> String {
    let tag = version.to_string();
    if tag.contains('+') {
        tag
    } else {
        format!("{tag}+rke2r1")
    }
}
