//! Bootstrap engines and the phase protocol they share.
//!
//! Every engine runs the same four phases: wait for the inventory to
//! report all nodes running, prepare every node in parallel, bootstrap the
//! first control-plane node while capturing a join credential, then join
//! the remaining nodes one at a time.

mod k0s;
mod k3s;
mod kubeadm;
mod rancherd;
mod rke;
mod rke2;
mod skuba;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::config::{BootstrapperVersion, Cluster, ClusterConfig, ConfigStore};
use crate::error::{AggregateError, Error, Result};
use crate::node::{Node, NodeInventory, NodeRole};
use crate::ssh::{Commander, CommanderFactory, RemoteCommand};
use crate::types::BootstrapperKind;

pub use k0s::K0sBootstrapper;
pub use k3s::K3sBootstrapper;
pub use kubeadm::KubeadmBootstrapper;
pub use rancherd::RancherdBootstrapper;
pub use rke::RkeBootstrapper;
pub use rke2::Rke2Bootstrapper;
pub use skuba::SkubaBootstrapper;

const WAIT_TIMEOUT_MINUTES: u64 = 5;
const WAIT_POLL_DELAY: Duration = Duration::from_secs(5);
const INIT_BACKOFF_INITIAL: Duration = Duration::from_secs(10);
const INIT_BACKOFF_CAP: Duration = Duration::from_secs(60);
const INIT_MAX_ATTEMPTS: u32 = 5;

/// Credential captured on the first control-plane node and handed to the
/// joining nodes. Never persisted.
#[derive(Debug, Clone)]
pub enum JoinCredential {
    /// Opaque token read off the first node.
    Token(String),
    /// Complete join command line.
    JoinCommand(String),
    /// Secret generated locally and shared with every node.
    SharedSecret(String),
    /// Separate tokens per joining role.
    ControllerWorker { controller: String, worker: String },
}

/// One cluster bootstrap technology.
#[async_trait]
pub trait Bootstrapper: Send + Sync {
    fn kind(&self) -> BootstrapperKind;

    /// Run the full phase protocol against the cluster.
    async fn deploy(&self, cluster: &Cluster) -> Result<()>;

    /// Fetch the admin kubeconfig into `dest_dir` (the cluster dir when
    /// `None`) and return its path.
    async fn download_kubeconfig(&self, cluster: &Cluster, dest_dir: Option<&Path>)
        -> Result<PathBuf>;

    /// Install local tooling the engine needs before deploy. Most engines
    /// need nothing.
    async fn prepare(&self, _config: &ClusterConfig, _force: bool) -> Result<()> {
        Ok(())
    }
}

/// Shared collaborators injected into every engine.
#[derive(Clone)]
pub struct EngineDeps {
    pub factory: Arc<dyn CommanderFactory>,
    pub inventory: Arc<dyn NodeInventory>,
    pub store: ConfigStore,
    pub bin_dir: PathBuf,
}

/// Construct the engine for a distribution.
pub fn new_bootstrapper(kind: BootstrapperKind, deps: EngineDeps) -> Box<dyn Bootstrapper> {
    match kind {
        BootstrapperKind::Kubeadm => Box::new(KubeadmBootstrapper::new(deps)),
        BootstrapperKind::K3s => Box::new(K3sBootstrapper::new(deps)),
        BootstrapperKind::Rke => Box::new(RkeBootstrapper::new(deps)),
        BootstrapperKind::Rke2 => Box::new(Rke2Bootstrapper::new(deps)),
        BootstrapperKind::K0s => Box::new(K0sBootstrapper::new(deps)),
        BootstrapperKind::Skuba => Box::new(SkubaBootstrapper::new(deps)),
        BootstrapperKind::Rancherd => Box::new(RancherdBootstrapper::new(deps)),
    }
}

impl EngineDeps {
    /// Cached record matching the cluster's resolved version, falling back
    /// to a bare record when the cache was cleared since init.
    pub fn version_record(&self, config: &ClusterConfig) -> Result<BootstrapperVersion> {
        let version = crate::version::Version::parse(&config.version)?;
        let cached = self.store.load_version_cache(config.bootstrapper)?;
        Ok(cached
            .iter()
            .find(|r| r.version() == &version)
            .cloned()
            .unwrap_or_else(|| BootstrapperVersion::plain(config.bootstrapper, version)))
    }
}

/// Poll the inventory until every expected node reports running. Bounded
/// by [`WAIT_TIMEOUT_MINUTES`].
pub async fn wait_nodes_running(
    inventory: &dyn NodeInventory,
    cluster: &str,
    expected: usize,
) -> Result<Vec<Node>> {
    // a cluster with no nodes can never become ready
    if expected == 0 {
        return Err(Error::NodesNotRunning(cluster.to_string()));
    }

    let deadline = tokio::time::Instant::now() + Duration::from_secs(WAIT_TIMEOUT_MINUTES * 60);

    loop {
        let nodes = inventory.list_nodes(cluster).await?;
        if nodes.len() >= expected && nodes.iter().all(|n| n.status.running) {
            info!(cluster, count = nodes.len(), "all nodes running");
            return Ok(nodes);
        }

        if tokio::time::Instant::now() >= deadline {
            return Err(Error::NodesNotRunning(cluster.to_string()));
        }
        tokio::time::sleep(WAIT_POLL_DELAY).await;
    }
}

/// Run the preparation command sequence on every node in parallel, each
/// under bounded exponential backoff. Per-node failures are collected and
/// aggregated instead of failing fast.
pub async fn init_nodes<F>(
    factory: Arc<dyn CommanderFactory>,
    nodes: &[Node],
    commands: F,
) -> Result<()>
where
    F: Fn(&Node) -> Vec<RemoteCommand> + Send + Sync + 'static,
{
    let commands = Arc::new(commands);
    let (tx, mut rx) = mpsc::channel::<Error>(nodes.len().max(1));
    let mut set = JoinSet::new();

    for node in nodes {
        let factory = Arc::clone(&factory);
        let commands = Arc::clone(&commands);
        let node = node.clone();
        let tx = tx.clone();

        set.spawn(async move {
            if let Err(err) = init_one(factory, &node, &commands(&node)).await {
                let _ = tx.send(err).await;
            }
        });
    }
    drop(tx);

    while set.join_next().await.is_some() {}

    let mut errors = Vec::new();
    while let Ok(err) = rx.try_recv() {
        errors.push(err);
    }
    if errors.is_empty() {
        Ok(())
    } else {
        Err(Error::Aggregate(AggregateError::new(errors)))
    }
}

async fn init_one(
    factory: Arc<dyn CommanderFactory>,
    node: &Node,
    commands: &[RemoteCommand],
) -> Result<()> {
    let mut delay = INIT_BACKOFF_INITIAL;

    for attempt in 1..=INIT_MAX_ATTEMPTS {
        match run_once(&*factory, node, commands).await {
            Ok(()) => {
                info!(node = %node.name, "node initialized");
                return Ok(());
            }
            Err(err) if attempt == INIT_MAX_ATTEMPTS => return Err(err),
            Err(err) => {
                warn!(node = %node.name, attempt, error = %err, "node init failed, retrying");
                tokio::time::sleep(delay).await;
                delay = (delay * 2).min(INIT_BACKOFF_CAP);
            }
        }
    }
    unreachable!("retry loop returns before exhausting attempts")
}

async fn run_once(
    factory: &dyn CommanderFactory,
    node: &Node,
    commands: &[RemoteCommand],
) -> Result<()> {
    let commander = factory.connect(node).await?;
    let result = commander.run(commands).await;
    let _ = commander.close().await;
    result.map(|_| ())
}

/// Run a command sequence on one node over a fresh session, returning the
/// captured outputs. The session is closed on every exit path.
pub async fn run_on_node(
    factory: &dyn CommanderFactory,
    node: &Node,
    commands: &[RemoteCommand],
) -> Result<Vec<crate::ssh::CommandOutput>> {
    let commander = factory.connect(node).await?;
    let result = commander.run(commands).await;
    let _ = commander.close().await;
    result
}

/// The control-plane node bootstrap runs on: role master, index 1.
pub fn first_control_plane(nodes: &[Node]) -> Result<&Node> {
    nodes
        .iter()
        .find(|n| n.is_master() && n.name.ends_with("-master-1"))
        .or_else(|| nodes.iter().find(|n| n.is_master()))
        .ok_or_else(|| Error::NodeNotFound("first control-plane node".to_string()))
}

/// Every node except the first control-plane one, masters before workers.
pub fn joining_nodes<'a>(nodes: &'a [Node], first: &Node) -> Vec<&'a Node> {
    let mut rest: Vec<&Node> = nodes
        .iter()
        .filter(|n| n.name != first.name && n.role != NodeRole::Admin)
        .collect();
    rest.sort_by_key(|n| (!n.is_master(), n.name.clone()));
    rest
}

/// Download a remote kubeconfig to `<dest>/admin.conf` over a fresh
/// session.
pub async fn download_kubeconfig_from(
    factory: &dyn CommanderFactory,
    node: &Node,
    remote_path: &str,
    dest_dir: &Path,
) -> Result<PathBuf> {
    let dest = dest_dir.join("admin.conf");
    let commander = factory.connect(node).await?;
    let result = commander.download(remote_path, &dest).await;
    let _ = commander.close().await;
    result?;
    Ok(dest)
}

/// Deep-merge `overlay` into `base`. Top-level keys listed in `ignored`
/// are left untouched so cluster identity settings cannot be overridden.
pub fn merge_cluster_config(
    base: &mut serde_yaml::Value,
    overlay: &serde_yaml::Value,
    ignored: &[&str],
) {
    let (serde_yaml::Value::Mapping(base_map), serde_yaml::Value::Mapping(overlay_map)) =
        (&mut *base, overlay)
    else {
        return;
    };

    for (key, value) in overlay_map {
        if let serde_yaml::Value::String(name) = key {
            if ignored.contains(&name.as_str()) {
                continue;
            }
        }
        match base_map.get_mut(key) {
            Some(existing) => merge_value(existing, value),
            None => {
                base_map.insert(key.clone(), value.clone());
            }
        }
    }
}

fn merge_value(base: &mut serde_yaml::Value, overlay: &serde_yaml::Value) {
    match (&mut *base, overlay) {
        (serde_yaml::Value::Mapping(base_map), serde_yaml::Value::Mapping(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(key) {
                    Some(existing) => merge_value(existing, value),
                    None => {
                        base_map.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (base, overlay) => *base = overlay.clone(),
    }
}

/// Random lowercase alphanumeric secret for generated join tokens.
pub fn generate_token(len: usize) -> String {
    use rand::distributions::Alphanumeric;
    use rand::Rng;

    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect::<String>()
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodeStatus;

    fn node(name: &str, role: NodeRole) -> Node {
        Node {
            name: name.to_string(),
            role,
            status: NodeStatus::default(),
        }
    }

    #[test]
    fn test_first_control_plane_picks_index_one() {
        let nodes = vec![
            node("demo-worker-1", NodeRole::Worker),
            node("demo-master-2", NodeRole::Master),
            node("demo-master-1", NodeRole::Master),
        ];
        assert_eq!(first_control_plane(&nodes).unwrap().name, "demo-master-1");
    }

    #[test]
    fn test_first_control_plane_requires_a_master() {
        let nodes = vec![node("demo-worker-1", NodeRole::Worker)];
        assert!(first_control_plane(&nodes).is_err());
    }

    #[test]
    fn test_joining_nodes_masters_first() {
        let nodes = vec![
            node("demo-worker-1", NodeRole::Worker),
            node("demo-master-1", NodeRole::Master),
            node("demo-master-2", NodeRole::Master),
        ];
        let first = node("demo-master-1", NodeRole::Master);
        let joining: Vec<&str> = joining_nodes(&nodes, &first)
            .iter()
            .map(|n| n.name.as_str())
            .collect();
        assert_eq!(joining, ["demo-master-2", "demo-worker-1"]);
    }

    #[test]
    fn test_merge_keeps_ignored_keys() {
        let mut base: serde_yaml::Value =
            serde_yaml::from_str("nodes: [a]\noptions:\n  cni: flannel\n").unwrap();
        let overlay: serde_yaml::Value =
            serde_yaml::from_str("nodes: [b]\noptions:\n  cni: calico\n  mtu: 1400\n").unwrap();

        merge_cluster_config(&mut base, &overlay, &["nodes"]);

        assert_eq!(base["nodes"][0], serde_yaml::Value::from("a"));
        assert_eq!(base["options"]["cni"], serde_yaml::Value::from("calico"));
        assert_eq!(base["options"]["mtu"], serde_yaml::Value::from(1400));
    }

    #[test]
    fn test_generate_token_shape() {
        let token = generate_token(16);
        assert_eq!(token.len(), 16);
        assert!(token.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
        assert_ne!(generate_token(16), generate_token(16));
    }
}
