//! skuba carries a fixed supported list; there is no public release feed
//! to query.

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::types::BootstrapperKind;
use crate::version::Version;

use super::VersionFinder;

const SUPPORTED: [&str; 2] = ["v1.4.1", "v1.3.5"];

#[derive(Debug, Default)]
pub struct SkubaVersionFinder;

impl SkubaVersionFinder {
    pub fn new() -> Self {
        Self
    }

    fn supported() -> Vec<Version> {
        SUPPORTED
            .iter()
            .filter_map(|tag| Version::parse(tag).ok())
            .collect()
    }
}

#[async_trait]
impl VersionFinder for SkubaVersionFinder {
    fn kind(&self) -> BootstrapperKind {
        BootstrapperKind::Skuba
    }

    async fn latest_version(&self) -> Result<Version> {
        Self::supported()
            .into_iter()
            .max()
            .ok_or_else(|| Error::VersionNotFound {
                bootstrapper: self.kind().to_string(),
                version: "latest".to_string(),
            })
    }

    async fn versions_after(&self, anchor: &Version) -> Result<Vec<Version>> {
        let mut versions: Vec<Version> = Self::supported()
            .into_iter()
            .filter(|v| v <= anchor)
            .collect();
        versions.sort_by(|a, b| b.cmp(a));
        Ok(versions)
    }

    async fn has_patch_version(&self, version: &Version) -> bool {
        Self::supported().iter().any(|v| v == version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_list() {
        let finder = SkubaVersionFinder::new();
        let latest = finder.latest_version().await.unwrap();
        assert_eq!(latest.to_string(), "v1.4.1");

        let window = finder.versions_after(&latest).await.unwrap();
        assert_eq!(window.len(), 2);
        assert!(finder.has_patch_version(&Version::parse("v1.3.5").unwrap()).await);
        assert!(!finder.has_patch_version(&Version::parse("v1.3.6").unwrap()).await);
    }
}
