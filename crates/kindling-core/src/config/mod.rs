//! Cluster configuration model and persistence.

pub mod cache;
pub mod store;

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::node::Node;
use crate::types::BootstrapperKind;

pub use cache::BootstrapperVersion;
pub use store::ConfigStore;

const DEFAULT_IMAGE: &str = "ghcr.io/kindling/images/ubuntu:20.04";
const DEFAULT_KERNEL_IMAGE: &str = "ghcr.io/kindling/images/kernel:5.10";
const DEFAULT_KERNEL_ARGS: &str = "console=ttyS0 reboot=k panic=1 pci=off ro";

/// Sizing for one node role within a cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeGroup {
    #[serde(default)]
    pub count: usize,
    pub cpus: u32,
    pub memory: String,
    pub disk_size: String,
}

impl NodeGroup {
    fn sized(count: usize) -> Self {
        Self {
            count,
            cpus: 2,
            memory: "2GB".to_string(),
            disk_size: "10GB".to_string(),
        }
    }
}

impl Default for NodeGroup {
    fn default() -> Self {
        Self::sized(0)
    }
}

/// Declarative description of a cluster, persisted as
/// `<cluster-dir>/cluster.yaml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterConfig {
    pub name: String,
    pub bootstrapper: BootstrapperKind,
    /// Resolved distribution version, `v`-prefixed.
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub kernel_image: String,
    #[serde(default)]
    pub kernel_args: String,
    /// Path to the public key installed on every node.
    #[serde(default)]
    pub pubkey: String,
    /// Path to the private key used by the command channel.
    #[serde(default)]
    pub prikey: String,
    /// Free-form bootstrapper options, string keyed.
    #[serde(default)]
    pub extra_options: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub admin: NodeGroup,
    #[serde(default)]
    pub master: NodeGroup,
    #[serde(default)]
    pub worker: NodeGroup,
    /// Set to true once a deploy completes. Never reset by this engine.
    #[serde(default)]
    pub deployed: bool,
}

impl ClusterConfig {
    /// A config with default image references and sizing: one
    /// control-plane node, no workers.
    pub fn new(name: impl Into<String>, bootstrapper: BootstrapperKind) -> Self {
        Self {
            name: name.into(),
            bootstrapper,
            version: String::new(),
            image: DEFAULT_IMAGE.to_string(),
            kernel_image: DEFAULT_KERNEL_IMAGE.to_string(),
            kernel_args: DEFAULT_KERNEL_ARGS.to_string(),
            pubkey: String::new(),
            prikey: String::new(),
            extra_options: HashMap::new(),
            admin: NodeGroup::default(),
            master: NodeGroup::sized(1),
            worker: NodeGroup::default(),
            deployed: false,
        }
    }

    /// Deserialize `extra_options` into a typed options struct. Unknown
    /// keys are ignored, missing keys take the struct's defaults.
    pub fn parse_extra_options<T: DeserializeOwned>(&self) -> Result<T> {
        let value = serde_json::to_value(&self.extra_options)?;
        Ok(serde_json::from_value(value)?)
    }

    pub fn total_node_count(&self) -> usize {
        self.admin.count + self.master.count + self.worker.count
    }
}

/// A cluster config paired with the live node inventory.
#[derive(Debug, Clone)]
pub struct Cluster {
    pub config: ClusterConfig,
    pub nodes: Vec<Node>,
    /// Directory holding cluster.yaml, keys, and generated artifacts.
    pub dir: PathBuf,
}

impl Cluster {
    pub fn new(config: ClusterConfig, nodes: Vec<Node>, dir: PathBuf) -> Self {
        Self { config, nodes, dir }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn admin_conf_path(&self) -> PathBuf {
        self.dir.join("admin.conf")
    }

    pub fn path(&self, file: impl AsRef<Path>) -> PathBuf {
        self.dir.join(file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default, Deserialize, PartialEq)]
    struct FakeOptions {
        #[serde(default)]
        config_path: String,
        #[serde(default)]
        server_install: bool,
    }

    #[test]
    fn test_default_config_shape() {
        let config = ClusterConfig::new("demo", BootstrapperKind::Kubeadm);
        assert_eq!(config.master.count, 1);
        assert_eq!(config.worker.count, 0);
        assert!(!config.deployed);
        assert_eq!(config.total_node_count(), 1);
    }

    #[test]
    fn test_parse_extra_options() {
        let mut config = ClusterConfig::new("demo", BootstrapperKind::K0s);
        config
            .extra_options
            .insert("config_path".to_string(), "k0s.yaml".into());
        config
            .extra_options
            .insert("server_install".to_string(), true.into());
        config
            .extra_options
            .insert("unrelated".to_string(), 42.into());

        let options: FakeOptions = config.parse_extra_options().unwrap();
        assert_eq!(options.config_path, "k0s.yaml");
        assert!(options.server_install);
    }

    #[test]
    fn test_yaml_round_trip_keeps_deployed_flag() {
        let mut config = ClusterConfig::new("demo", BootstrapperKind::K3s);
        config.deployed = true;
        let yaml = serde_yaml::to_string(&config).unwrap();
        let back: ClusterConfig = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(back, config);
    }
}
