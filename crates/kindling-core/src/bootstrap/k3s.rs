//! k3s engine.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Deserialize;
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

const REMOTE_KUBECONFIG: &str = "/etc/rancher/k3s/k3s.yaml";
const NODE_TOKEN_PATH: &str = "/var/lib/rancher/k3s/server/node-token";

#[derive(Debug, Default, Deserialize)]
struct K3sOptions {
    #[serde(default)]
    extra_server_args: String,
    #[serde(default)]
    extra_agent_args: String,
}

pub struct K3sBootstrapper {
    deps: EngineDeps,
}

impl K3sBootstrapper {
    pub fn new(deps: EngineDeps) -> Self {
        Self { deps }
    }

    fn install_command(envs: &[(String, String)]) -> RemoteCommand {
        RemoteCommand::new(format!(
            "sudo sh -c \"{}./{}\"",
            script::env_prefix(envs),
            script::script_name(BootstrapperKind::K3s)
        ))
    }
}

#[async_trait]
impl Bootstrapper for K3sBootstrapper {
    fn kind(&self) -> BootstrapperKind {
        BootstrapperKind::K3s
    }

    async fn deploy(&self, cluster: &Cluster) -> Result<()> {
        let expected = cluster.config.total_node_count();
        let nodes =
            wait_nodes_running(&*self.deps.inventory, cluster.name(), expected).await?;

        let options: K3sOptions = cluster.config.parse_extra_options()?;
        let version = cluster.config.version.clone();
        let kind = self.kind();

        init_nodes(self.deps.factory.clone(), &nodes, move |_node| {
            let mut commands = vec![RemoteCommand::new("sudo swapoff -a")];
            commands.extend(
                script::fetch_script_commands(kind)
                    .into_iter()
                    .map(RemoteCommand::new),
            );
            commands
        })
        .await?;

        let first = first_control_plane(&nodes)?;
        let multi_master = nodes.iter().filter(|n| n.is_master()).count() > 1;

        let mut server_exec = String::from("server");
        if multi_master {
            server_exec.push_str(" --cluster-init");
        }
        if !options.extra_server_args.is_empty() {
            server_exec.push(' ');
            server_exec.push_str(&options.extra_server_args);
        }

        info!(node = %first.name, "bootstrapping first control-plane node");
        let envs = script::k3s_envs(&version, &server_exec);
        let outputs = run_on_node(
            &*self.deps.factory,
            first,
            &[
                Self::install_command(&envs),
                RemoteCommand::new("sudo systemctl enable --now k3s"),
                RemoteCommand::capture(format!("sudo cat {NODE_TOKEN_PATH}")),
            ],
        )
        .await?;

        let token = outputs
            .iter()
            .find(|o| o.command.contains(NODE_TOKEN_PATH))
            .map(|o| o.stdout.trim().to_string())
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                Error::command(
                    &first.name,
                    format!("cat {NODE_TOKEN_PATH}"),
                    std::io::Error::other("empty node token"),
                )
            })?;
        let credential = JoinCredential::Token(token);

        let server_url = format!("https://{}:6443", first.status.ip_address);
        for node in joining_nodes(&nodes, first) {
            info!(node = %node.name, "joining node");
            let JoinCredential::Token(ref token) = credential else {
                unreachable!()
            };

            let (exec, service) = if node.is_master() {
                let mut exec = format!("server --server {server_url}");
                if !options.extra_server_args.is_empty() {
                    exec.push(' ');
                    exec.push_str(&options.extra_server_args);
                }
                (exec, "k3s")
            } else {
                let mut exec = String::from("agent");
                if !options.extra_agent_args.is_empty() {
                    exec.push(' ');
                    exec.push_str(&options.extra_agent_args);
                }
                (exec, "k3s-agent")
            };

            let mut envs = script::k3s_envs(&version, &exec);
            // K3S_URL switches the installer into agent mode; servers
            // join through the --server flag instead
            if !node.is_master() {
                envs.push(("K3S_URL".to_string(), server_url.clone()));
            }
            envs.push(("K3S_TOKEN".to_string(), token.clone()));

            run_on_node(
                &*self.deps.factory,
                node,
                &[
                    Self::install_command(&envs),
                    RemoteCommand::new(format!("sudo systemctl enable --now {service}")),
                ],
            )
            .await?;
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
