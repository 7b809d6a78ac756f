//! k0s engine.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::info;

use crate::config::Cluster;
use crate::error::{Error, Result};
use crate::script;
use crate::ssh::RemoteCommand;
use crate::types::BootstrapperKind;

use super::{
    download_kubeconfig_from, first_control_plane, init_nodes, joining_nodes,
    merge_cluster_config, run_on_node, wait_nodes_running, Bootstrapper, EngineDeps,
    JoinCredential,
};

const REMOTE_KUBECONFIG: &str = "/var/lib/k0s/pki/admin.conf";
const REMOTE_CONFIG: &str = "/etc/k0s/k0s.yaml";
const REMOTE_TOKEN_FILE: &str = "/etc/k0s/token";
/// The API needs a moment after the controller starts before token
/// creation succeeds.
const TOKEN_CREATE_DELAY: Duration = Duration::from_secs(30);

#[derive(Debug, Default, Deserialize)]
struct K0sOptions {
    /// Local path to a user cluster-config override.
    #[serde(default)]
    config_path: String,
    /// Extra options passed to `k0s install`.
    #[serde(default)]
    extra_install_opts: String,
}

pub struct K0sBootstrapper {
    deps: EngineDeps,
}

impl K0sBootstrapper {
    pub fn new(deps: EngineDeps) -> Self {
        Self { deps }
    }

    /// Generated cluster config with the API advertised on the first
    /// node's address, overlaid with the user's override file when given.
    fn render_config(
        cluster_name: &str,
        api_address: &str,
        override_path: &str,
    ) -> Result<String> {
        let mut config: serde_yaml::Value = serde_yaml::from_str(&format!(
            "apiVersion: k0s.k0sproject.io/v1beta1\n\
             kind: Cluster\n\
             metadata:\n  name: {cluster_name}\n\
             spec:\n  api:\n    externalAddress: {api_address}\n"
        ))?;

        if !override_path.is_empty() {
            let raw = std::fs::read_to_string(override_path)?;
            let overlay: serde_yaml::Value = serde_yaml::from_str(&raw)?;
            merge_cluster_config(&mut config, &overlay, &["apiVersion", "kind", "metadata"]);
            // the overlay must not move the API off the first node
            config["spec"]["api"]["externalAddress"] = serde_yaml::Value::from(api_address);
        }

        Ok(serde_yaml::to_string(&config)?)
    }

    fn write_config_command(config: &str) -> RemoteCommand {
        RemoteCommand::new(format!(
            "sudo mkdir -p /etc/k0s && printf '%s\\n' {} | sudo tee {REMOTE_CONFIG} > /dev/null",
            script::shell_quote(config)
        ))
    }
}

#[async_trait]
impl Bootstrapper for K0sBootstrapper {
    fn kind(&self) -> BootstrapperKind {
        BootstrapperKind::K0s
    }

    async fn deploy(&self, cluster: &Cluster) -> Result<()> {
        let expected = cluster.config.total_node_count();
        let nodes =
            wait_nodes_running(&*self.deps.inventory, cluster.name(), expected).await?;

        let options: K0sOptions = cluster.config.parse_extra_options()?;
        let kind = self.kind();
        let version = cluster.config.version.clone();

        init_nodes(self.deps.factory.clone(), &nodes, move |_node| {
            let mut commands = vec![RemoteCommand::new("sudo swapoff -a")];
            commands.extend(
                script::fetch_script_commands(kind)
                    .into_iter()
                    .map(RemoteCommand::new),
            );
            commands.push(RemoteCommand::new(format!(
                "sudo sh -c \"{}./{}\"",
                script::env_prefix(&script::k0s_envs(&version, REMOTE_CONFIG, "")),
                script::script_name(kind)
            )));
            commands
        })
        .await?;

        let first = first_control_plane(&nodes)?;
        let config =
            Self::render_config(cluster.name(), &first.status.ip_address, &options.config_path)?;

        let single_node = nodes.len() == 1;
        let more_masters = nodes.iter().filter(|n| n.is_master()).count() > 1;
        let has_workers = nodes.iter().any(|n| !n.is_master());

        let mut install_opts = String::new();
        if single_node {
            install_opts.push_str("--enable-worker");
        }
        if !options.extra_install_opts.is_empty() {
            if !install_opts.is_empty() {
                install_opts.push(' ');
            }
            install_opts.push_str(&options.extra_install_opts);
        }

        info!(node = %first.name, "bootstrapping first control-plane node");
        run_on_node(
            &*self.deps.factory,
            first,
            &[
                Self::write_config_command(&config),
                RemoteCommand::new(format!(
                    "sudo k0s install controller -c {REMOTE_CONFIG} {install_opts}"
                )),
                RemoteCommand::new("sudo systemctl start k0scontroller"),
            ],
        )
        .await?;

        tokio::time::sleep(TOKEN_CREATE_DELAY).await;

        let outputs = run_on_node(
            &*self.deps.factory,
            first,
            &[
                RemoteCommand::capture("sudo k0s token create --role=controller")
                    .enabled_if(more_masters),
                RemoteCommand::capture("sudo k0s token create --role=worker")
                    .enabled_if(has_workers),
            ],
        )
        .await?;

        let token_for = |role: &str| {
            outputs
                .iter()
                .find(|o| o.command.contains(&format!("--role={role}")))
                .map(|o| o.stdout.trim().to_string())
                .filter(|t| !t.is_empty())
        };
        let credential = JoinCredential::ControllerWorker {
            controller: token_for("controller").unwrap_or_default(),
            worker: token_for("worker").unwrap_or_default(),
        };

        for node in joining_nodes(&nodes, first) {
            info!(node = %node.name, "joining node");
            let JoinCredential::ControllerWorker {
                ref controller,
                ref worker,
            } = credential
            else {
                unreachable!()
            };

            let (token, install, service) = if node.is_master() {
                (
                    controller,
                    format!("sudo k0s install controller --token-file {REMOTE_TOKEN_FILE} -c {REMOTE_CONFIG}"),
                    "k0scontroller",
                )
            } else {
                (
                    worker,
                    format!("sudo k0s install worker --token-file {REMOTE_TOKEN_FILE}"),
                    "k0sworker",
                )
            };
            if token.is_empty() {
                return Err(Error::command(
                    &node.name,
                    "k0s token create",
                    std::io::Error::other("missing join token for role"),
                ));
            }

            let mut commands = vec![RemoteCommand::new(format!(
                "sudo mkdir -p /etc/k0s && printf '%s\\n' {} | sudo tee {REMOTE_TOKEN_FILE} > /dev/null",
                script::shell_quote(token)
            ))];
            if node.is_master() {
                commands.push(Self::write_config_command(&config));
            }
            commands.push(RemoteCommand::new(install));
            commands.push(RemoteCommand::new(format!("sudo systemctl start {service}")));

            run_on_node(&*self.deps.factory, node, &commands).await?;
        }

        Ok(())
    }

    async fn download_kubeconfig(
        &self,
        cluster: &Cluster,
        dest_dir: Option<&Path>,
    ) -> Result<PathBuf> {
        let first = first_control_plane(&cluster.nodes)?;
        let dest = download_kubeconfig_from(
            &*self.deps.factory,
            first,
            REMOTE_KUBECONFIG,
            dest_dir.unwrap_or(&cluster.dir),
        )
        .await?;

        // the downloaded kubeconfig points at the loopback listener
        let contents = tokio::fs::read_to_string(&dest).await?;
        let rewritten = contents.replace("localhost", &first.status.ip_address);
        tokio::fs::write(&dest, rewritten).await?;

        Ok(dest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_config_without_override() {
        let config = K0sBootstrapper::render_config("demo", "10.0.0.1", "").unwrap();
        assert!(config.contains("externalAddress: 10.0.0.1"));
        assert!(config.contains("name: demo"));
    }

    #[test]
    fn test_render_config_override_cannot_move_api() {
        let temp = tempfile::TempDir::new().unwrap();
        let override_path = temp.path().join("k0s.yaml");
        std::fs::write(
            &override_path,
            "spec:\n  api:\n    externalAddress: 1.2.3.4\n  network:\n    provider: calico\n",
        )
        .unwrap();

        let config = K0sBootstrapper::render_config(
            "demo",
            "10.0.0.1",
            override_path.to_str().unwrap(),
        )
        .unwrap();
        assert!(config.contains("externalAddress: 10.0.0.1"));
        assert!(config.contains("provider: calico"));
    }

    #[test]
    fn test_write_config_command_survives_embedded_quotes() {
        let command = K0sBootstrapper::write_config_command("metadata:\n  name: bob's cluster");
        assert!(command.line.contains(r"bob'\''s cluster"));
        assert!(command.line.contains("printf '%s\\n' 'metadata:"));
    }
}
