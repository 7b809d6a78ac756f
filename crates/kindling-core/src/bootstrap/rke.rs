//! RKE engine. Unlike the others, the bootstrap itself runs locally
//! through the `rke` binary against a generated cluster file.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::{BootstrapperVersion, Cluster, ClusterConfig};
use crate::error::Result;
use crate::exec::run_local;
use crate::node::Node;
use crate::script;
use crate::ssh::RemoteCommand;
use crate::types::BootstrapperKind;

use super::{
    init_nodes, merge_cluster_config, wait_nodes_running, Bootstrapper, EngineDeps,
};

const CLUSTER_FILE: &str = "cluster.yml";
const GENERATED_KUBECONFIG: &str = "kube_config_cluster.yml";
const SSH_USER: &str = "root";

#[derive(Debug, Default, Deserialize)]
struct RkeOptions {
    /// Local path to a user cluster.yml overlay.
    #[serde(default)]
    config_path: String,
    /// Kubernetes version to deploy; defaults to the newest one the
    /// resolved RKE release supports.
    #[serde(default)]
    kubernetes_version: String,
}

#[derive(Debug, Serialize)]
struct RkeNode {
    address: String,
    user: String,
    role: Vec<String>,
    ssh_key_path: String,
}

#[derive(Debug, Serialize)]
struct RkeClusterFile {
    nodes: Vec<RkeNode>,
    #[serde(skip_serializing_if = "String::is_empty")]
    kubernetes_version: String,
}

pub struct RkeBootstrapper {
    deps: EngineDeps,
}

impl RkeBootstrapper {
    pub fn new(deps: EngineDeps) -> Self {
        Self { deps }
    }

    fn node_roles(node: &Node, single_node: bool) -> Vec<String> {
        if node.is_master() {
            let mut roles = vec!["controlplane".to_string(), "etcd".to_string()];
            if single_node {
                roles.push("worker".to_string());
            }
            roles
        } else {
            vec!["worker".to_string()]
        }
    }

    fn render_cluster_file(
        cluster: &Cluster,
        nodes: &[Node],
        kubernetes_version: String,
        override_path: &str,
    ) -> Result<String> {
        let single_node = nodes.len() == 1;
        let generated = RkeClusterFile {
            nodes: nodes
                .iter()
                .map(|node| RkeNode {
                    address: node.status.ip_address.clone(),
                    user: SSH_USER.to_string(),
                    role: Self::node_roles(node, single_node),
                    ssh_key_path: cluster.config.prikey.clone(),
                })
                .collect(),
            kubernetes_version,
        };

        let mut config: serde_yaml::Value =
            serde_yaml::from_str(&serde_yaml::to_string(&generated)?)?;
        if !override_path.is_empty() {
            let raw = std::fs::read_to_string(override_path)?;
            let overlay: serde_yaml::Value = serde_yaml::from_str(&raw)?;
            // node identity stays with the inventory
            merge_cluster_config(&mut config, &overlay, &["nodes", "ssh_key_path"]);
        }

        Ok(serde_yaml::to_string(&config)?)
    }
}

#[async_trait]
impl Bootstrapper for RkeBootstrapper {
    fn kind(&self) -> BootstrapperKind {
        BootstrapperKind::Rke
    }

    /// Install the `rke` binary locally. Idempotent unless forced.
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
            &[("RKE_VERSION".to_string(), config.version.clone())],
        )
        .await
    }

    async fn deploy(&self, cluster: &Cluster) -> Result<()> {
        let expected = cluster.config.total_node_count();
        let nodes =
            wait_nodes_running(&*self.deps.inventory, cluster.name(), expected).await?;

        let options: RkeOptions = cluster.config.parse_extra_options()?;
        let kind = self.kind();

        // nodes only need a container runtime; rke drives them over SSH
        init_nodes(self.deps.factory.clone(), &nodes, move |_node| {
            let mut commands = vec![RemoteCommand::new("sudo swapoff -a")];
            commands.extend(
                script::fetch_script_commands(kind)
                    .into_iter()
                    .map(RemoteCommand::new),
            );
            commands.push(RemoteCommand::new(format!(
                "sudo sh -c \"export RKE_PREPARE_NODE='true' && ./{}\"",
                script::script_name(kind)
            )));
            commands
        })
        .await?;

        let kubernetes_version = if !options.kubernetes_version.is_empty() {
            options.kubernetes_version.clone()
        } else {
            match self.deps.version_record(&cluster.config)? {
                BootstrapperVersion::Rke {
                    kubernetes_versions,
                    ..
                } => kubernetes_versions.first().cloned().unwrap_or_default(),
                _ => String::new(),
            }
        };

        let rendered =
            Self::render_cluster_file(cluster, &nodes, kubernetes_version, &options.config_path)?;
        let cluster_file = cluster.path(CLUSTER_FILE);
        tokio::fs::create_dir_all(&cluster.dir).await?;
        tokio::fs::write(&cluster_file, rendered).await?;

        info!(cluster = %cluster.name(), "running rke up");
        run_local(
            "rke",
            &["up", "--config", CLUSTER_FILE],
            Some(&cluster.dir),
            &[],
        )
        .await
    }

    /// `rke up` already left the kubeconfig next to the cluster file.
    async fn download_kubeconfig(
        &self,
        cluster: &Cluster,
        dest_dir: Option<&Path>,
    ) -> Result<PathBuf> {
        let dest_dir = dest_dir.unwrap_or(&cluster.dir);
        tokio::fs::create_dir_all(dest_dir).await?;
        let dest = dest_dir.join("admin.conf");
        tokio::fs::copy(cluster.path(GENERATED_KUBECONFIG), &dest).await?;
        Ok(dest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{NodeRole, NodeStatus};

    fn node(name: &str, role: NodeRole, ip: &str) -> Node {
        Node {
            name: name.to_string(),
            role,
            status: NodeStatus {
                running: true,
                ip_address: ip.to_string(),
            },
        }
    }

    fn cluster(nodes: Vec<Node>) -> Cluster {
        let mut config = ClusterConfig::new("demo", BootstrapperKind::Rke);
        config.prikey = "/tmp/demo/key".to_string();
        Cluster::new(config, nodes, PathBuf::from("/tmp/demo"))
    }

    #[test]
    fn test_single_node_control_plane_is_also_worker() {
        let nodes = vec![node("demo-master-1", NodeRole::Master, "10.0.0.1")];
        let rendered = RkeBootstrapper::render_cluster_file(
            &cluster(nodes.clone()),
            &nodes,
            "v1.19.2-rancher1-1".to_string(),
            "",
        )
        .unwrap();

        assert!(rendered.contains("- controlplane"));
        assert!(rendered.contains("- worker"));
        assert!(rendered.contains("kubernetes_version: v1.19.2-rancher1-1"));
    }

    #[test]
    fn test_override_cannot_replace_nodes() {
        let temp = tempfile::TempDir::new().unwrap();
        let override_path = temp.path().join("cluster.yml");
        std::fs::write(
            &override_path,
            "nodes: []\nnetwork:\n  plugin: calico\n",
        )
        .unwrap();

        let nodes = vec![
            node("demo-master-1", NodeRole::Master, "10.0.0.1"),
            node("demo-worker-1", NodeRole::Worker, "10.0.0.2"),
        ];
        let rendered = RkeBootstrapper::render_cluster_file(
            &cluster(nodes.clone()),
            &nodes,
            String::new(),
            override_path.to_str().unwrap(),
        )
        .unwrap();

        assert!(rendered.contains("address: 10.0.0.1"));
        assert!(rendered.contains("plugin: calico"));
        assert!(!rendered.contains("kubernetes_version"));
    }
}
