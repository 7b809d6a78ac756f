//! rancherd engine: RKE2 underneath, rancherd services on top.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::config::Cluster;
use crate::error::Result;
use crate::types::BootstrapperKind;

use super::rke2::{deploy_rke2_family, download_rke2_kubeconfig, rancherd_flavor};
use super::{Bootstrapper, EngineDeps};

pub struct RancherdBootstrapper {
    deps: EngineDeps,
}

impl RancherdBootstrapper {
    pub fn new(deps: EngineDeps) -> Self {
        Self { deps }
    }
}

#[async_trait]
impl Bootstrapper for RancherdBootstrapper {
    fn kind(&self) -> BootstrapperKind {
        BootstrapperKind::Rancherd
    }

    async fn deploy(&self, cluster: &Cluster) -> Result<()> {
        deploy_rke2_family(&self.deps, cluster, &rancherd_flavor()).await
    }

    async fn download_kubeconfig(
        &self,
        cluster: &Cluster,
        dest_dir: Option<&Path>,
    ) -> Result<PathBuf> {
        download_rke2_kubeconfig(&self.deps, cluster, &rancherd_flavor(), dest_dir).await
    }
}
