//! Application context for unified dependency injection.

use std::path::{Path, PathBuf};

use crate::config::ConfigStore;
use crate::node::FileInventory;

/// Build tag keying the version cache layout. Bump when the cache schema
/// changes so stale entries are left behind rather than misread.
pub const BUILD_TAG: &str = "v0";

/// Unified application context.
///
/// Provides access to the on-disk layout rooted at the kindling home
/// directory. Frontends create this once and pass it to commands.
#[derive(Debug, Clone)]
pub struct AppContext {
    home_dir: PathBuf,
}

impl AppContext {
    /// Create a context rooted at an explicit home directory.
    pub fn new(home_dir: PathBuf) -> Self {
        Self { home_dir }
    }

    /// Create a context rooted at `~/.kindling`.
    pub fn from_user_home() -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        Self::new(home.join(".kindling"))
    }

    pub fn home_dir(&self) -> &Path {
        &self.home_dir
    }

    /// Per-cluster directories live under here, one per cluster name.
    pub fn cluster_root_dir(&self) -> PathBuf {
        self.home_dir.join("clusters")
    }

    pub fn cluster_dir(&self, cluster: &str) -> PathBuf {
        self.cluster_root_dir().join(cluster)
    }

    /// Version cache root, keyed first by [`BUILD_TAG`].
    pub fn cache_dir(&self) -> PathBuf {
        self.home_dir.join("cache").join(BUILD_TAG)
    }

    /// Downloaded installer scripts and local tools.
    pub fn bin_dir(&self) -> PathBuf {
        self.home_dir.join("bin")
    }

    /// Get a ConfigStore over this layout.
    pub fn config_store(&self) -> ConfigStore {
        ConfigStore::new(self.cluster_root_dir(), self.cache_dir())
    }

    /// Get the file-backed node inventory.
    pub fn node_inventory(&self) -> FileInventory {
        FileInventory::new(self.cluster_root_dir())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_paths() {
        let ctx = AppContext::new(PathBuf::from("/tmp/kindling-home"));
        assert_eq!(
            ctx.cluster_dir("demo"),
            PathBuf::from("/tmp/kindling-home/clusters/demo")
        );
        assert!(ctx.cache_dir().ends_with(format!("cache/{BUILD_TAG}")));
        assert!(ctx.bin_dir().ends_with("bin"));
    }
}
