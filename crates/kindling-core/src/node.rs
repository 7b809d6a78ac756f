//! Node identity and the inventory collaborator boundary.
//!
//! Node lifecycle (create/start/stop/delete of the underlying VMs) is owned
//! by an external tool; the bootstrap engines only read identity, role, and
//! runtime status through [`NodeInventory`].

use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Role a node plays inside its cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeRole {
    Admin,
    Master,
    Worker,
}

impl NodeRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeRole::Admin => "admin",
            NodeRole::Master => "master",
            NodeRole::Worker => "worker",
        }
    }
}

/// Runtime status reported by the VM tool.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeStatus {
    #[serde(default)]
    pub running: bool,
    #[serde(default)]
    pub ip_address: String,
}

/// A VM instance belonging to exactly one cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub name: String,
    pub role: NodeRole,
    #[serde(default)]
    pub status: NodeStatus,
}

impl Node {
    pub fn is_master(&self) -> bool {
        self.role == NodeRole::Master
    }
}

/// Node name format: `<cluster>-<role>-<index>` (1-based index).
pub fn node_name(cluster: &str, role: NodeRole, index: usize) -> String {
    format!("{}-{}-{}", cluster, role.as_str(), index)
}

/// Read access to the externally managed node inventory.
#[async_trait]
pub trait NodeInventory: Send + Sync {
    /// All nodes belonging to the named cluster.
    async fn list_nodes(&self, cluster: &str) -> Result<Vec<Node>>;

    /// A single node by its full name.
    async fn get_node(&self, name: &str) -> Result<Node>;
}

/// Inventory backed by a `nodes.yaml` file inside each cluster directory,
/// maintained by the external VM tool. Re-read on every call so the
/// wait-running poll observes status changes.
#[derive(Debug, Clone)]
pub struct FileInventory {
    cluster_root: PathBuf,
}

impl FileInventory {
    pub fn new(cluster_root: PathBuf) -> Self {
        Self { cluster_root }
    }

    fn nodes_file(&self, cluster: &str) -> PathBuf {
        self.cluster_root.join(cluster).join("nodes.yaml")
    }

    fn read_nodes(&self, cluster: &str) -> Result<Vec<Node>> {
        let path = self.nodes_file(cluster);
        if !path.exists() {
            return Ok(Vec::new());
        }

        let raw = std::fs::read_to_string(&path)?;
        let nodes: Vec<Node> = serde_yaml::from_str(&raw)?;
        Ok(nodes)
    }
}

#[async_trait]
impl NodeInventory for FileInventory {
    async fn list_nodes(&self, cluster: &str) -> Result<Vec<Node>> {
        self.read_nodes(cluster)
    }

    async fn get_node(&self, name: &str) -> Result<Node> {
        // name prefix up to "-<role>-<index>" is the cluster name
        let cluster = name
            .rsplitn(3, '-')
            .nth(2)
            .ok_or_else(|| Error::NodeNotFound(name.to_string()))?;

        self.read_nodes(cluster)?
            .into_iter()
            .find(|n| n.name == name)
            .ok_or_else(|| Error::NodeNotFound(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_name_format() {
        assert_eq!(node_name("demo", NodeRole::Master, 1), "demo-master-1");
        assert_eq!(node_name("demo", NodeRole::Worker, 2), "demo-worker-2");
    }

    #[tokio::test]
    async fn test_file_inventory_round_trip() {
        let temp = tempfile::TempDir::new().unwrap();
        let dir = temp.path().join("demo");
        std::fs::create_dir_all(&dir).unwrap();

        let nodes = vec![Node {
            name: "demo-master-1".to_string(),
            role: NodeRole::Master,
            status: NodeStatus {
                running: true,
                ip_address: "192.168.1.10".to_string(),
            },
        }];
        std::fs::write(dir.join("nodes.yaml"), serde_yaml::to_string(&nodes).unwrap()).unwrap();

        let inventory = FileInventory::new(temp.path().to_path_buf());
        let listed = inventory.list_nodes("demo").await.unwrap();
        assert_eq!(listed, nodes);

        let node = inventory.get_node("demo-master-1").await.unwrap();
        assert_eq!(node.status.ip_address, "192.168.1.10");

        assert!(inventory.get_node("demo-worker-9").await.is_err());
    }

    #[tokio::test]
    async fn test_file_inventory_missing_cluster_is_empty() {
        let temp = tempfile::TempDir::new().unwrap();
        let inventory = FileInventory::new(temp.path().to_path_buf());
        assert!(inventory.list_nodes("ghost").await.unwrap().is_empty());
    }
}
