//! Release channel feeds (`update.k3s.io` / `update.rke2.io` style).

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::version::Version;

#[derive(Debug, Deserialize)]
struct ChannelFeed {
    data: Vec<Channel>,
}

#[derive(Debug, Deserialize)]
struct Channel {
    id: String,
    #[serde(default)]
    latest: String,
}

/// Typed client for a `/v1-release/channels` feed.
#[derive(Debug, Clone)]
pub struct ChannelClient {
    client: reqwest::Client,
    url: String,
}

impl ChannelClient {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("kindling/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    async fn fetch(&self) -> Result<ChannelFeed> {
        Ok(self
            .client
            .get(&self.url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?)
    }

    /// The version behind the `latest` channel.
    pub async fn latest(&self) -> Result<Version> {
        let feed = self.fetch().await?;
        let channel = feed
            .data
            .into_iter()
            .find(|c| c.id == "latest")
            .ok_or_else(|| Error::InvalidVersion("latest channel missing".to_string()))?;
        Version::parse(&channel.latest)
    }

    /// Versions behind the per-minor channels (`v1.19`, `v1.18`, ...),
    /// sorted newest first.
    pub async fn minor_versions(&self) -> Result<Vec<Version>> {
        let feed = self.fetch().await?;
        let mut versions: Vec<Version> = feed
            .data
            .into_iter()
            .filter(|c| is_minor_channel_id(&c.id))
            .filter_map(|c| Version::parse(&c.latest).ok())
            .collect();
        versions.sort_by(|a, b| b.cmp(a));
        Ok(versions)
    }
}

/// `vMAJOR.MINOR` channel ids only; named channels like `stable` or
/// `testing` are skipped.
fn is_minor_channel_id(id: &str) -> bool {
    let Some(rest) = id.strip_prefix('v') else {
        return false;
    };
    let mut parts = rest.split('.');
    let (Some(major), Some(minor), None) = (parts.next(), parts.next(), parts.next()) else {
        return false;
    };
    !major.is_empty()
        && !minor.is_empty()
        && major.bytes().all(|b| b.is_ascii_digit())
        && minor.bytes().all(|b| b.is_ascii_digit())
}
