//! Upstream Kubernetes releases for the kubeadm engine.

use async_trait::async_trait;

use crate::config::BootstrapperVersion;
use crate::error::Result;
use crate::types::BootstrapperKind;
use crate::version::Version;

use super::github::GithubReleases;
use super::{supported_window, window_count, VersionFinder};

const STABLE_VERSION_URL: &str =
    "https://storage.googleapis.com/kubernetes-release/release/stable.txt";

pub struct KubeadmVersionFinder {
    kubernetes: GithubReleases,
    crictl: GithubReleases,
    kube_release: GithubReleases,
    client: reqwest::Client,
}

impl KubeadmVersionFinder {
    pub fn new() -> Result<Self> {
        Ok(Self {
            kubernetes: GithubReleases::new("kubernetes", "kubernetes")?,
            crictl: GithubReleases::new("kubernetes-sigs", "cri-tools")?,
            kube_release: GithubReleases::new("kubernetes", "release")?,
            client: reqwest::Client::builder()
                .user_agent(concat!("kindling/", env!("CARGO_PKG_VERSION")))
                .build()?,
        })
    }
}

#[async_trait]
impl VersionFinder for KubeadmVersionFinder {
    fn kind(&self) -> BootstrapperKind {
        BootstrapperKind::Kubeadm
    }

    async fn latest_version(&self) -> Result<Version> {
        let body = self
            .client
            .get(STABLE_VERSION_URL)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        Version::parse(body.trim())
    }

    async fn versions_after(&self, anchor: &Version) -> Result<Vec<Version>> {
        let releases = self.kubernetes.release_versions(3).await?;
        Ok(supported_window(anchor, &releases, window_count()))
    }

    async fn has_patch_version(&self, version: &Version) -> bool {
        self.kubernetes.has_release_version(version).await
    }

    /// Pairs each Kubernetes version with a crictl release of the same
    /// minor (falling back to the newest older one) and the newest release
    /// of the kube release tooling.
    async fn bootstrapper_versions(
        &self,
        versions: &[Version],
    ) -> Result<Vec<BootstrapperVersion>> {
        let crictl_releases = self.crictl.release_versions(1).await?;
        let kube_release_version = self.kube_release.latest_release().await?;

        let records = versions
            .iter()
            .map(|version| {
                let crictl_version = crictl_releases
                    .iter()
                    .find(|c| c.same_minor(version))
                    .or_else(|| crictl_releases.iter().filter(|c| *c <= version).max())
                    .or_else(|| crictl_releases.iter().max())
                    .cloned()
                    .unwrap_or_else(|| version.clone());

                BootstrapperVersion::Kubeadm {
                    version: version.clone(),
                    crictl_version,
                    kube_release_version: kube_release_version.clone(),
                }
            })
            .collect();

        Ok(records)
    }
}
