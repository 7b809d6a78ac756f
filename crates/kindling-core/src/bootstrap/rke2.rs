//! RKE2 engine, shared with the rancherd engine which layers on the same
//! server/agent service pair.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Deserialize;
use tracing::info;

use crate::config::Cluster;
use crate::error::Result;
use crate::script;
use crate::ssh::RemoteCommand;
use crate::types::BootstrapperKind;

use super::{
    download_kubeconfig_from, first_control_plane, generate_token, init_nodes, joining_nodes,
    run_on_node, wait_nodes_running, Bootstrapper, EngineDeps, JoinCredential,
};

const JOIN_PORT: u16 = 9345;
const TOKEN_LEN: usize = 32;

/// Knobs distinguishing RKE2 proper from rancherd.
pub(super) struct Rke2Flavor {
    pub kind: BootstrapperKind,
    pub server_service: &'static str,
    pub agent_service: &'static str,
    pub config_dir: &'static str,
    pub kubeconfig: &'static str,
}

const RKE2_FLAVOR: Rke2Flavor = Rke2Flavor {
    kind: BootstrapperKind::Rke2,
    server_service: "rke2-server",
    agent_service: "rke2-agent",
    config_dir: "/etc/rancher/rke2",
    kubeconfig: "/etc/rancher/rke2/rke2.yaml",
};

#[derive(Debug, Default, Deserialize)]
struct Rke2Options {
    /// Extra `key: value` lines appended to the generated config.
    #[serde(default)]
    server_config: Vec<String>,
    #[serde(default)]
    agent_config: Vec<String>,
}

fn render_config(token: &str, server: Option<&str>, extra: &[String]) -> String {
    let mut lines = vec![format!("token: {token}")];
    if let Some(server) = server {
        lines.push(format!("server: {server}"));
    }
    lines.extend(extra.iter().cloned());
    lines.join("\n")
}

fn write_config_command(flavor: &Rke2Flavor, config: &str) -> RemoteCommand {
    RemoteCommand::new(format!(
        "sudo mkdir -p {dir} && printf '%s\\n' {payload} | sudo tee {dir}/config.yaml > /dev/null",
        dir = flavor.config_dir,
        payload = script::shell_quote(config),
    ))
}

fn install_command(flavor: &Rke2Flavor, version: &str, install_type: &str) -> RemoteCommand {
    RemoteCommand::new(format!(
        "sudo sh -c \"{}./{}\"",
        script::env_prefix(&script::rke2_envs(version, install_type)),
        script::script_name(flavor.kind)
    ))
}

pub(super) async fn deploy_rke2_family(
    deps: &EngineDeps,
    cluster: &Cluster,
    flavor: &Rke2Flavor,
) -> Result<()> {
    let expected = cluster.config.total_node_count();
    let nodes = wait_nodes_running(&*deps.inventory, cluster.name(), expected).await?;

    let options: Rke2Options = cluster.config.parse_extra_options()?;
    let kind = flavor.kind;

    init_nodes(deps.factory.clone(), &nodes, move |_node| {
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
    let credential = JoinCredential::SharedSecret(generate_token(TOKEN_LEN));
    let JoinCredential::SharedSecret(ref token) = credential else {
        unreachable!()
    };

    info!(node = %first.name, "bootstrapping first control-plane node");
    run_on_node(
        &*deps.factory,
        first,
        &[
            write_config_command(flavor, &render_config(token, None, &options.server_config)),
            install_command(flavor, &cluster.config.version, "server"),
            RemoteCommand::new(format!(
                "sudo systemctl enable --now {}",
                flavor.server_service
            )),
        ],
    )
    .await?;

    let server_url = format!("https://{}:{JOIN_PORT}", first.status.ip_address);
    for node in joining_nodes(&nodes, first) {
        info!(node = %node.name, "joining node");
        let (install_type, service, extra): (_, _, &[String]) = if node.is_master() {
            ("server", flavor.server_service, &options.server_config)
        } else {
            ("agent", flavor.agent_service, &options.agent_config)
        };

        run_on_node(
            &*deps.factory,
            node,
            &[
                write_config_command(
                    flavor,
                    &render_config(token, Some(&server_url), extra),
                ),
                install_command(flavor, &cluster.config.version, install_type),
                RemoteCommand::new(format!("sudo systemctl enable --now {service}")),
            ],
        )
        .await?;
    }

    Ok(())
}

pub(super) async fn download_rke2_kubeconfig(
    deps: &EngineDeps,
    cluster: &Cluster,
    flavor: &Rke2Flavor,
    dest_dir: Option<&Path>,
) -> Result<PathBuf> {
    let first = first_control_plane(&cluster.nodes)?;
    download_kubeconfig_from(
        &*deps.factory,
        first,
        flavor.kubeconfig,
        dest_dir.unwrap_or(&cluster.dir),
    )
    .await
}

pub struct Rke2Bootstrapper {
    deps: EngineDeps,
}

impl Rke2Bootstrapper {
    pub fn new(deps: EngineDeps) -> Self {
        Self { deps }
    }
}

#[async_trait]
impl Bootstrapper for Rke2Bootstrapper {
    fn kind(&self) -> BootstrapperKind {
        BootstrapperKind::Rke2
    }

    async fn deploy(&self, cluster: &Cluster) -> Result<()> {
        deploy_rke2_family(&self.deps, cluster, &RKE2_FLAVOR).await
    }

    async fn download_kubeconfig(
        &self,
        cluster: &Cluster,
        dest_dir: Option<&Path>,
    ) -> Result<PathBuf> {
        download_rke2_kubeconfig(&self.deps, cluster, &RKE2_FLAVOR, dest_dir).await
    }
}

pub(super) fn rancherd_flavor() -> Rke2Flavor {
    Rke2Flavor {
        kind: BootstrapperKind::Rancherd,
        server_service: "rancherd-server",
        agent_service: "rancherd-agent",
        config_dir: "/etc/rancher/rke2",
        kubeconfig: "/etc/rancher/rke2/rke2.yaml",
    }
}
