//! Minimal GitHub releases client used by several finders.

use serde::Deserialize;
use tracing::debug;

use crate::error::Result;
use crate::version::Version;

const GITHUB_API: &str = "https://api.github.com";
const PER_PAGE: usize = 100;

#[derive(Debug, Deserialize)]
struct Release {
    tag_name: String,
    #[serde(default)]
    draft: bool,
    #[serde(default)]
    prerelease: bool,
}

/// Release listing for one `owner/repo`.
#[derive(Debug, Clone)]
pub struct GithubReleases {
    client: reqwest::Client,
    owner: String,
    repo: String,
}

impl GithubReleases {
    pub fn new(owner: impl Into<String>, repo: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("kindling/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            owner: owner.into(),
            repo: repo.into(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{GITHUB_API}/repos/{}/{}/{path}", self.owner, self.repo)
    }

    /// Tag of the newest published release.
    pub async fn latest_release(&self) -> Result<Version> {
        let release: Release = self
            .client
            .get(self.url("releases/latest"))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Version::parse(&release.tag_name)
    }

    /// Stable release versions from the first `pages` pages, newest first
    /// as GitHub returns them. Drafts, prereleases, and unparseable tags
    /// are skipped.
    pub async fn release_versions(&self, pages: usize) -> Result<Vec<Version>> {
        let mut versions = Vec::new();

        for page in 1..=pages {
            let releases: Vec<Release> = self
                .client
                .get(self.url("releases"))
                .query(&[("per_page", PER_PAGE), ("page", page)])
                .send()
                .await?
                .error_for_status()?
                .json()
                .await?;

            let last_page = releases.len() < PER_PAGE;
            for release in releases {
                if release.draft || release.prerelease {
                    continue;
                }
                if let Ok(version) = Version::parse(&release.tag_name) {
                    versions.push(version);
                }
            }
            if last_page {
                break;
            }
        }

        debug!(owner = %self.owner, repo = %self.repo, count = versions.len(), "fetched release list");
        Ok(versions)
    }

    /// Public URL of a release tag page. `+` must be percent-encoded or
    /// GitHub treats it as a space.
    fn tag_url(&self, tag: &str) -> String {
        format!(
            "https://github.com/{}/{}/releases/tag/{}",
            self.owner,
            self.repo,
            tag.replace('+', "%2B")
        )
    }

    /// Whether a release tag exists upstream, probed by status code so an
    /// old release far beyond the paged list is still found.
    pub async fn has_release_tag(&self, tag: &str) -> bool {
        match self.client.get(self.tag_url(tag)).send().await {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }

    /// Whether a release exists for the plain `vX.Y.Z` rendering of
    /// `version`.
    pub async fn has_release_version(&self, version: &Version) -> bool {
        self.has_release_tag(&version.to_string()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_url_percent_encodes_build_metadata() {
        let releases = GithubReleases::new("k3s-io", "k3s").unwrap();
        assert_eq!(
            releases.tag_url("v1.18.8+k3s1"),
            "https://github.com/k3s-io/k3s/releases/tag/v1.18.8%2Bk3s1"
        );
        assert_eq!(
            releases.tag_url("v1.19.2"),
            "https://github.com/k3s-io/k3s/releases/tag/v1.19.2"
        );
    }
}
