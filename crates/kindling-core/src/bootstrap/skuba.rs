//! skuba engine for SUSE CaaSP. Nodes are registered in parallel, then
//! the local `skuba` binary drives bootstrap and joins from the cluster
//! directory.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Deserialize;
use tracing::info;

use crate::config::{Cluster, ClusterConfig};
use crate::error::Result;
use crate::exec::run_local;
use crate::script;
use crate::ssh::RemoteCommand;
use crate::types::BootstrapperKind;

use super::{
    first_control_plane, init_nodes, joining_nodes, wait_nodes_running, Bootstrapper,
    EngineDeps,
};

const SSH_USER: &str = "sles";

#[derive(Debug, Default, Deserialize)]
struct SkubaOptions {
    /// SUSE registration code applied on every node before install.
    #[serde(default)]
    registration_code: String,
}

pub struct SkubaBootstrapper {
    deps: EngineDeps,
}

impl SkubaBootstrapper {
    pub fn new(deps: EngineDeps) -> Self {
        Self { deps }
    }

    /// Directory `skuba cluster init` creates and every later skuba
    /// command runs from.
    fn skuba_dir(cluster: &Cluster) -> PathBuf {
        cluster.path(cluster.name())
    }
}

#[async_trait]
impl Bootstrapper for SkubaBootstrapper {
    fn kind(&self) -> BootstrapperKind {
        BootstrapperKind::Skuba
    }

    /// Install the `skuba` binary locally. Idempotent unless forced.
    async fn prepare(&self, config: &ClusterConfig, force: bool) -> Result<()> {
        let path = script::download_script(
            &self.deps.bin_dir,
            &script::scripts_tag(),
            script::script_name(self.kind()),
            force,
        )
        .await?;
        run_local(
            &path.to_string_lossy(),
            &[],
            None,
            &[("SKUBA_VERSION".to_string(), config.version.clone())],
        )
        .await
    }

    async fn deploy(&self, cluster: &Cluster) -> Result<()> {
        let expected = cluster.config.total_node_count();
        let nodes =
            wait_nodes_running(&*self.deps.inventory, cluster.name(), expected).await?;

        let options: SkubaOptions = cluster.config.parse_extra_options()?;
        let registration_code = options.registration_code.clone();

        // registration pre-phase, in parallel like the other engines'
        // init phase
        init_nodes(self.deps.factory.clone(), &nodes, move |_node| {
            vec![
                RemoteCommand::new("sudo swapoff -a"),
                RemoteCommand::new(format!("sudo SUSEConnect -r {registration_code}"))
                    .enabled_if(!registration_code.is_empty()),
                RemoteCommand::new(
                    "sudo SUSEConnect -p sle-module-containers/15.2/x86_64",
                )
                .enabled_if(!registration_code.is_empty()),
            ]
        })
        .await?;

        let first = first_control_plane(&nodes)?;

        tokio::fs::create_dir_all(&cluster.dir).await?;
        info!(cluster = %cluster.name(), "running skuba cluster init");
        run_local(
            "skuba",
            &[
                "cluster",
                "init",
                "--control-plane",
                &first.status.ip_address,
                cluster.name(),
            ],
            Some(&cluster.dir),
            &[],
        )
        .await?;

        let skuba_dir = Self::skuba_dir(cluster);
        info!(node = %first.name, "bootstrapping first control-plane node");
        run_local(
            "skuba",
            &[
                "node",
                "bootstrap",
                "--user",
                SSH_USER,
                "--sudo",
                "--target",
                &first.status.ip_address,
                &first.name,
            ],
            Some(&skuba_dir),
            &[],
        )
        .await?;

        for node in joining_nodes(&nodes, first) {
            info!(node = %node.name, "joining node");
            let role = if node.is_master() { "master" } else { "worker" };
            run_local(
                "skuba",
                &[
                    "node",
                    "join",
                    "--role",
                    role,
                    "--user",
                    SSH_USER,
                    "--sudo",
                    "--target",
                    &node.status.ip_address,
                    &node.name,
                ],
                Some(&skuba_dir),
                &[],
            )
            .await?;
        }

        Ok(())
    }

    /// `skuba node bootstrap` left admin.conf in the skuba directory.
    async fn download_kubeconfig(
        &self,
        cluster: &Cluster,
        dest_dir: Option<&Path>,
    ) -> Result<PathBuf> {
        let dest_dir = dest_dir.unwrap_or(&cluster.dir);
        tokio::fs::create_dir_all(dest_dir).await?;
        let dest = dest_dir.join("admin.conf");
        tokio::fs::copy(Self::skuba_dir(cluster).join("admin.conf"), &dest).await?;
        Ok(dest)
    }
}
