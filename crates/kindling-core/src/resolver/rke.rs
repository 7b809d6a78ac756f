//! RKE releases from GitHub, plus the Kubernetes versions each release
//! can deploy from the kontainer-driver-metadata feed.

use std::collections::BTreeSet;

use async_trait::async_trait;
use serde::Deserialize;

use crate::config::BootstrapperVersion;
use crate::error::Result;
use crate::types::BootstrapperKind;
use crate::version::Version;

use super::github::GithubReleases;
use super::{window_count, VersionFinder};

const DRIVER_METADATA_URL: &str =
    "https://raw.githubusercontent.com/rancher/kontainer-driver-metadata/master/data/data.json";

#[derive(Debug, Deserialize)]
struct DriverMetadata {
    #[serde(rename = "K8sVersionRKESystemImages", default)]
    k8s_version_rke_system_images: serde_json::Map<String, serde_json::Value>,
}

pub struct RkeVersionFinder {
    releases: GithubReleases,
    client: reqwest::Client,
}

impl RkeVersionFinder {
    pub fn new() -> Result<Self> {
        Ok(Self {
            releases: GithubReleases::new("rancher", "rke")?,
            client: reqwest::Client::builder()
                .user_agent(concat!("kindling/", env!("CARGO_PKG_VERSION")))
                .build()?,
        })
    }

    /// Deployable Kubernetes versions, newest minors first, bounded by the
    /// shared window count. The feed keys look like `v1.19.2-rancher1-1`.
    async fn kubernetes_versions(&self) -> Result<Vec<String>> {
        let metadata: DriverMetadata = self
            .client
            .get(DRIVER_METADATA_URL)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let mut tagged: Vec<(Version, String)> = metadata
            .k8s_version_rke_system_images
            .keys()
            .filter_map(|tag| Version::parse(tag).ok().map(|v| (v, tag.clone())))
            .collect();
        tagged.sort_by(|a, b| b.0.cmp(&a.0));

        let mut minors = BTreeSet::new();
        let mut versions = Vec::new();
        for (version, tag) in tagged {
            if minors.insert((version.major(), version.minor())) {
                versions.push(tag);
            }
            if minors.len() >= window_count() {
                break;
            }
        }
        Ok(versions)
    }
}

#[async_trait]
impl VersionFinder for RkeVersionFinder {
    fn kind(&self) -> BootstrapperKind {
        BootstrapperKind::Rke
    }

    async fn latest_version(&self) -> Result<Version> {
        self.releases.latest_release().await
    }

    /// RKE installs as a single local binary; only the anchored release
    /// itself is offered.
    async fn versions_after(&self, anchor: &Version) -> Result<Vec<Version>> {
        Ok(vec![anchor.clone()])
    }

    async fn has_patch_version(&self, version: &Version) -> bool {
        self.releases.has_release_version(version).await
    }

    async fn bootstrapper_versions(
        &self,
        versions: &[Version],
    ) -> Result<Vec<BootstrapperVersion>> {
        let kubernetes_versions = self.kubernetes_versions().await?;
        Ok(versions
            .iter()
            .cloned()
            .map(|version| BootstrapperVersion::Rke {
                version,
                kubernetes_versions: kubernetes_versions.clone(),
            })
            .collect())
    }
}
