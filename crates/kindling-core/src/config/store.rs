//! On-disk store for cluster configs, keypairs, and the version cache.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{Error, Result};
use crate::types::BootstrapperKind;

use super::cache::BootstrapperVersion;
use super::ClusterConfig;

const CLUSTER_CONFIG_FILE: &str = "cluster.yaml";
const KEY_FILE: &str = "key";

/// Persistence over the kindling home layout: one directory per cluster
/// plus a shared version cache.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    cluster_root: PathBuf,
    cache_root: PathBuf,
}

impl ConfigStore {
    pub fn new(cluster_root: PathBuf, cache_root: PathBuf) -> Self {
        Self {
            cluster_root,
            cache_root,
        }
    }

    pub fn cluster_dir(&self, cluster: &str) -> PathBuf {
        self.cluster_root.join(cluster)
    }

    fn cluster_config_path(&self, cluster: &str) -> PathBuf {
        self.cluster_dir(cluster).join(CLUSTER_CONFIG_FILE)
    }

    pub fn cluster_exists(&self, cluster: &str) -> bool {
        self.cluster_config_path(cluster).exists()
    }

    pub fn load_cluster(&self, cluster: &str) -> Result<ClusterConfig> {
        let path = self.cluster_config_path(cluster);
        if !path.exists() {
            return Err(Error::ClusterNotFound(cluster.to_string()));
        }

        let raw = std::fs::read_to_string(&path)?;
        Ok(serde_yaml::from_str(&raw)?)
    }

    pub fn save_cluster(&self, config: &ClusterConfig) -> Result<()> {
        let dir = self.cluster_dir(&config.name);
        std::fs::create_dir_all(&dir)?;
        let yaml = serde_yaml::to_string(config)?;
        std::fs::write(self.cluster_config_path(&config.name), yaml)?;
        debug!(cluster = %config.name, "saved cluster config");
        Ok(())
    }

    /// Remove the cluster directory and everything in it.
    pub fn delete_cluster(&self, cluster: &str) -> Result<()> {
        let dir = self.cluster_dir(cluster);
        if dir.exists() {
            std::fs::remove_dir_all(&dir)?;
        }
        Ok(())
    }

    pub fn list_clusters(&self) -> Result<Vec<String>> {
        if !self.cluster_root.exists() {
            return Ok(Vec::new());
        }

        let mut names = Vec::new();
        for entry in std::fs::read_dir(&self.cluster_root)? {
            let entry = entry?;
            if entry.path().join(CLUSTER_CONFIG_FILE).exists() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }

    /// Generate an ed25519 keypair in the cluster directory. Returns the
    /// (private, public) key paths.
    pub fn generate_keypair(&self, cluster: &str) -> Result<(PathBuf, PathBuf)> {
        let dir = self.cluster_dir(cluster);
        std::fs::create_dir_all(&dir)?;

        let private =
            ssh_key::PrivateKey::random(&mut rand::rngs::OsRng, ssh_key::Algorithm::Ed25519)
                .map_err(|e| Error::Key(e.to_string()))?;

        let prikey_path = dir.join(KEY_FILE);
        let pubkey_path = dir.join(format!("{KEY_FILE}.pub"));

        let prikey_pem = private
            .to_openssh(ssh_key::LineEnding::LF)
            .map_err(|e| Error::Key(e.to_string()))?;
        let pubkey_line = private
            .public_key()
            .to_openssh()
            .map_err(|e| Error::Key(e.to_string()))?;

        std::fs::write(&prikey_path, prikey_pem.as_bytes())?;
        std::fs::write(&pubkey_path, format!("{pubkey_line}\n"))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&prikey_path, std::fs::Permissions::from_mode(0o600))?;
        }

        debug!(cluster, "generated cluster keypair");
        Ok((prikey_path, pubkey_path))
    }

    fn cache_dir(&self, kind: BootstrapperKind) -> PathBuf {
        self.cache_root.join(kind.as_str())
    }

    fn cache_entry_path(&self, record: &BootstrapperVersion) -> PathBuf {
        self.cache_dir(record.kind())
            .join(format!("{}.yaml", record.version()))
    }

    /// Persist a resolved version window, one file per record.
    pub fn save_version_cache(&self, records: &[BootstrapperVersion]) -> Result<()> {
        for record in records {
            let path = self.cache_entry_path(record);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&path, serde_yaml::to_string(record)?)?;
        }
        Ok(())
    }

    /// Load every cached record for a distribution, newest first. An empty
    /// result means nothing was cached; no upstream call is made here.
    pub fn load_version_cache(&self, kind: BootstrapperKind) -> Result<Vec<BootstrapperVersion>> {
        let dir = self.cache_dir(kind);
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut records = Vec::new();
        for entry in std::fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "yaml") {
                let raw = std::fs::read_to_string(&path)?;
                records.push(serde_yaml::from_str::<BootstrapperVersion>(&raw)?);
            }
        }
        records.sort_by(|a, b| b.version().cmp(a.version()));
        Ok(records)
    }

    /// Drop the cached window for a distribution.
    pub fn delete_version_cache(&self, kind: BootstrapperKind) -> Result<()> {
        let dir = self.cache_dir(kind);
        if dir.exists() {
            std::fs::remove_dir_all(&dir)?;
        }
        Ok(())
    }

    pub fn cluster_root(&self) -> &Path {
        &self.cluster_root
    }
}
