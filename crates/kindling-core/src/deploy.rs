//! Cluster lifecycle orchestration over the engines.

use std::path::{Path, PathBuf};

use tracing::info;

use crate::bootstrap::{new_bootstrapper, EngineDeps};
use crate::config::{Cluster, ClusterConfig};
use crate::error::{Error, Result};
use crate::resolver::{new_finder, resolve_version};

/// Optional caller-supplied step run before the engine takes over, e.g.
/// starting the VMs through the external tool.
pub type PreStep = Box<dyn FnOnce() -> Result<()> + Send>;

/// Facade tying the config store, resolver, and engines together.
pub struct ClusterService {
    deps: EngineDeps,
}

impl ClusterService {
    pub fn new(deps: EngineDeps) -> Self {
        Self { deps }
    }

    /// Create a cluster configuration: resolve the requested version,
    /// generate the keypair, and persist. Fails when the cluster already
    /// exists unless `force` recreates it (busting the version cache).
    pub async fn init_cluster(&self, mut config: ClusterConfig, force: bool) -> Result<ClusterConfig> {
        if self.deps.store.cluster_exists(&config.name) {
            if !force {
                return Err(Error::ClusterAlreadyExists(config.name));
            }
            self.deps.store.delete_cluster(&config.name)?;
        }

        let finder = new_finder(config.bootstrapper)?;
        let record =
            resolve_version(&*finder, &self.deps.store, &config.version, force).await?;
        config.version = record.version().to_string();

        let (prikey, pubkey) = self.deps.store.generate_keypair(&config.name)?;
        config.prikey = prikey.to_string_lossy().into_owned();
        config.pubkey = pubkey.to_string_lossy().into_owned();

        self.deps.store.save_cluster(&config)?;
        info!(cluster = %config.name, version = %config.version, "cluster initialized");
        Ok(config)
    }

    /// Remove the cluster directory and everything generated into it.
    pub fn delete_cluster(&self, name: &str) -> Result<()> {
        self.deps.store.delete_cluster(name)?;
        info!(cluster = name, "cluster deleted");
        Ok(())
    }

    /// Deploy a configured cluster: optional pre-step, engine prepare and
    /// deploy, persist the deployed flag, then fetch the kubeconfig.
    /// Returns the downloaded kubeconfig path.
    pub async fn deploy(&self, name: &str, pre_step: Option<PreStep>) -> Result<PathBuf> {
        let mut config = self.deps.store.load_cluster(name)?;
        let engine = new_bootstrapper(config.bootstrapper, self.deps.clone());

        if let Some(step) = pre_step {
            step().map_err(|e| e.context(format!("deploying cluster {name}")))?;
        }

        engine
            .prepare(&config, false)
            .await
            .map_err(|e| e.context(format!("deploying cluster {name}")))?;

        let cluster = self.assemble(&config).await?;
        engine
            .deploy(&cluster)
            .await
            .map_err(|e| e.context(format!("deploying cluster {name}")))?;

        config.deployed = true;
        self.deps.store.save_cluster(&config)?;

        // re-read the inventory so the download sees final addresses
        let cluster = self.assemble(&config).await?;
        let kubeconfig = engine
            .download_kubeconfig(&cluster, None)
            .await
            .map_err(|e| e.context(format!("deploying cluster {name}")))?;

        info!(cluster = name, kubeconfig = %kubeconfig.display(), "cluster deployed");
        Ok(kubeconfig)
    }

    /// Fetch the admin kubeconfig of an already deployed cluster.
    pub async fn download_kubeconfig(
        &self,
        name: &str,
        dest_dir: Option<&Path>,
    ) -> Result<PathBuf> {
        let config = self.deps.store.load_cluster(name)?;
        let engine = new_bootstrapper(config.bootstrapper, self.deps.clone());
        let cluster = self.assemble(&config).await?;
        engine.download_kubeconfig(&cluster, dest_dir).await
    }

    async fn assemble(&self, config: &ClusterConfig) -> Result<Cluster> {
        let nodes = self.deps.inventory.list_nodes(&config.name).await?;
        Ok(Cluster::new(
            config.clone(),
            nodes,
            self.deps.store.cluster_dir(&config.name),
        ))
    }
}
