//! kubeadm engine against upstream Kubernetes releases.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::info;

use crate::config::Cluster;
use crate::error::{Error, Result};
use crate::node::Node;
use crate::script;
use crate::ssh::RemoteCommand;
use crate::types::BootstrapperKind;

use super::{
    download_kubeconfig_from, first_control_plane, init_nodes, joining_nodes, run_on_node,
    wait_nodes_running, Bootstrapper, EngineDeps, JoinCredential,
};

const REMOTE_KUBECONFIG: &str = "/etc/kubernetes/admin.conf";
const CNI_MANIFEST_URL: &str =
    "https://raw.githubusercontent.com/flannel-io/flannel/master/Documentation/kube-flannel.yml";

pub struct KubeadmBootstrapper {
    deps: EngineDeps,
}

impl KubeadmBootstrapper {
    pub fn new(deps: EngineDeps) -> Self {
        Self { deps }
    }

    fn bootstrap_commands(node: &Node, single_node: bool) -> Vec<RemoteCommand> {
        let advertise = format!("--apiserver-advertise-address={}", node.status.ip_address);
        vec![
            RemoteCommand::new(format!("sudo kubeadm init phase control-plane all {advertise}")),
            RemoteCommand::new(format!(
                "sudo kubeadm init --skip-phases=control-plane {advertise}"
            )),
            RemoteCommand::new(format!(
                "mkdir -p $HOME/.kube && sudo cp -f {REMOTE_KUBECONFIG} $HOME/.kube/config && sudo chown $(id -u):$(id -g) $HOME/.kube/config"
            )),
            RemoteCommand::new(format!(
                "sudo kubectl apply -f {CNI_MANIFEST_URL} --kubeconfig {REMOTE_KUBECONFIG}"
            )),
            RemoteCommand::capture("sudo kubeadm token create --print-join-command"),
            RemoteCommand::new(format!(
                "sudo kubectl taint nodes --all node-role.kubernetes.io/master- --kubeconfig {REMOTE_KUBECONFIG}"
            ))
            .enabled_if(single_node),
        ]
    }
}

#[async_trait]
impl Bootstrapper for KubeadmBootstrapper {
    fn kind(&self) -> BootstrapperKind {
        BootstrapperKind::Kubeadm
    }

    async fn deploy(&self, cluster: &Cluster) -> Result<()> {
        let expected = cluster.config.total_node_count();
        let nodes =
            wait_nodes_running(&*self.deps.inventory, cluster.name(), expected).await?;

        let record = self.deps.version_record(&cluster.config)?;
        let envs = script::kubeadm_envs(&record);
        let kind = self.kind();

        init_nodes(self.deps.factory.clone(), &nodes, move |_node| {
            let mut commands = vec![RemoteCommand::new("sudo swapoff -a")];
            commands.extend(
                script::fetch_script_commands(kind)
                    .into_iter()
                    .map(|line| RemoteCommand::new(format!("sudo sh -c '{line}'"))),
            );
            commands.push(RemoteCommand::new(format!(
                "sudo sh -c \"{}./{}\"",
                script::env_prefix(&envs),
                script::script_name(kind)
            )));
            commands
        })
        .await?;

        let first = first_control_plane(&nodes)?;
        info!(node = %first.name, "bootstrapping first control-plane node");

        let outputs = run_on_node(
            &*self.deps.factory,
            first,
            &Self::bootstrap_commands(first, nodes.len() == 1),
        )
        .await?;

        let join_line = outputs
            .iter()
            .find(|o| o.command.contains("--print-join-command"))
            .map(|o| o.stdout.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                Error::command(
                    &first.name,
                    "kubeadm token create --print-join-command",
                    std::io::Error::other("empty join command"),
                )
            })?;
        let credential = JoinCredential::JoinCommand(join_line);

        for node in joining_nodes(&nodes, first) {
            info!(node = %node.name, "joining node");
            let JoinCredential::JoinCommand(ref line) = credential else {
                unreachable!()
            };
            let mut join = format!("sudo {line}");
            if node.is_master() {
                join.push_str(" --control-plane");
            }
            run_on_node(&*self.deps.factory, node, &[RemoteCommand::new(join)]).await?;
        }

        Ok(())
    }

    async fn download_kubeconfig(
        &self,
        cluster: &Cluster,
        dest_dir: Option<&Path>,
    ) -> Result<PathBuf> {
        let first = first_control_plane(&cluster.nodes)?;
        download_kubeconfig_from(
            &*self.deps.factory,
            first,
            REMOTE_KUBECONFIG,
            dest_dir.unwrap_or(&cluster.dir),
        )
        .await
    }
}
