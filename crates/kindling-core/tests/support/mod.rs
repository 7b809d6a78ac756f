//! Shared test doubles for the channel, inventory, and finder traits.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use kindling_core::config::BootstrapperVersion;
use kindling_core::error::{Error, Result};
use kindling_core::node::{Node, NodeInventory, NodeRole, NodeStatus};
use kindling_core::resolver::VersionFinder;
use kindling_core::ssh::{CommandOutput, Commander, CommanderFactory, OutputMode, RemoteCommand};
use kindling_core::types::BootstrapperKind;
use kindling_core::version::Version;

pub fn node(name: &str, role: NodeRole, ip: &str) -> Node {
    Node {
        name: name.to_string(),
        role,
        status: NodeStatus {
            running: true,
            ip_address: ip.to_string(),
        },
    }
}

/// Everything the mock channel observed, shared across commanders.
#[derive(Default)]
pub struct ChannelLog {
    /// (node, command line) in execution order.
    pub commands: Mutex<Vec<(String, String)>>,
    /// (node, remote path) per download.
    pub downloads: Mutex<Vec<(String, String)>>,
}

impl ChannelLog {
    pub fn commands(&self) -> Vec<(String, String)> {
        self.commands.lock().unwrap().clone()
    }

    pub fn commands_for(&self, node: &str) -> Vec<String> {
        self.commands()
            .into_iter()
            .filter(|(n, _)| n == node)
            .map(|(_, line)| line)
            .collect()
    }
}

/// Factory producing recording commanders. Commands whose line contains
/// a configured substring produce canned stdout; a node listed in
/// `fail_nodes` fails its first matching command on every attempt.
pub struct MockFactory {
    pub log: Arc<ChannelLog>,
    responses: Mutex<HashMap<String, String>>,
    fail_nodes: Mutex<Vec<String>>,
}

impl MockFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            log: Arc::new(ChannelLog::default()),
            responses: Mutex::new(HashMap::new()),
            fail_nodes: Mutex::new(Vec::new()),
        })
    }

    pub fn respond(&self, needle: &str, stdout: &str) {
        self.responses
            .lock()
            .unwrap()
            .insert(needle.to_string(), stdout.to_string());
    }

    pub fn fail_node(&self, node: &str) {
        self.fail_nodes.lock().unwrap().push(node.to_string());
    }
}

#[async_trait]
impl CommanderFactory for MockFactory {
    async fn connect(&self, node: &Node) -> Result<Box<dyn Commander>> {
        Ok(Box::new(MockCommander {
            node: node.name.clone(),
            log: Arc::clone(&self.log),
            responses: self.responses.lock().unwrap().clone(),
            fail: self.fail_nodes.lock().unwrap().contains(&node.name),
        }))
    }
}

pub struct MockCommander {
    node: String,
    log: Arc<ChannelLog>,
    responses: HashMap<String, String>,
    fail: bool,
}

#[async_trait]
impl Commander for MockCommander {
    async fn run(&self, commands: &[RemoteCommand]) -> Result<Vec<CommandOutput>> {
        let mut outputs = Vec::new();
        for command in commands {
            if !command.enabled {
                continue;
            }
            if self.fail {
                return Err(Error::command(
                    &self.node,
                    &command.line,
                    std::io::Error::other("injected failure"),
                ));
            }
            self.log
                .commands
                .lock()
                .unwrap()
                .push((self.node.clone(), command.line.clone()));

            let stdout = match command.output {
                OutputMode::Capture => self
                    .responses
                    .iter()
                    .find(|(needle, _)| command.line.contains(needle.as_str()))
                    .map(|(_, stdout)| stdout.clone())
                    .unwrap_or_default(),
                OutputMode::Discard => String::new(),
            };
            outputs.push(CommandOutput {
                command: command.line.clone(),
                stdout,
            });
        }
        Ok(outputs)
    }

    async fn download(&self, remote_path: &str, dest: &Path) -> Result<()> {
        self.log
            .downloads
            .lock()
            .unwrap()
            .push((self.node.clone(), remote_path.to_string()));
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(dest, "apiVersion: v1\nclusters: []\n")?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// In-memory inventory, same nodes for every cluster name asked.
pub struct MemoryInventory {
    nodes: Vec<Node>,
}

impl MemoryInventory {
    pub fn new(nodes: Vec<Node>) -> Arc<Self> {
        Arc::new(Self { nodes })
    }
}

#[async_trait]
impl NodeInventory for MemoryInventory {
    async fn list_nodes(&self, _cluster: &str) -> Result<Vec<Node>> {
        Ok(self.nodes.clone())
    }

    async fn get_node(&self, name: &str) -> Result<Node> {
        self.nodes
            .iter()
            .find(|n| n.name == name)
            .cloned()
            .ok_or_else(|| Error::NodeNotFound(name.to_string()))
    }
}

/// Finder serving a fixed release list while counting upstream calls.
pub struct CountingFinder {
    kind: BootstrapperKind,
    releases: Vec<Version>,
    pub upstream_calls: AtomicUsize,
}

impl CountingFinder {
    pub fn new(kind: BootstrapperKind, tags: &[&str]) -> Self {
        Self {
            kind,
            releases: tags.iter().map(|t| Version::parse(t).unwrap()).collect(),
            upstream_calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.upstream_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VersionFinder for CountingFinder {
    fn kind(&self) -> BootstrapperKind {
        self.kind
    }

    async fn latest_version(&self) -> Result<Version> {
        self.upstream_calls.fetch_add(1, Ordering::SeqCst);
        self.releases.iter().max().cloned().ok_or_else(|| {
            Error::VersionNotFound {
                bootstrapper: self.kind.to_string(),
                version: "latest".to_string(),
            }
        })
    }

    async fn versions_after(&self, anchor: &Version) -> Result<Vec<Version>> {
        self.upstream_calls.fetch_add(1, Ordering::SeqCst);
        Ok(kindling_core::resolver::supported_window(
            anchor,
            &self.releases,
            kindling_core::version::SUPPORTED_MINOR_VERSION_COUNT,
        ))
    }

    async fn has_patch_version(&self, version: &Version) -> bool {
        self.upstream_calls.fetch_add(1, Ordering::SeqCst);
        self.releases.iter().any(|v| {
            v.major() == version.major()
                && v.minor() == version.minor()
                && v.patch() == version.patch()
        })
    }

    async fn bootstrapper_versions(
        &self,
        versions: &[Version],
    ) -> Result<Vec<BootstrapperVersion>> {
        Ok(versions
            .iter()
            .cloned()
            .map(|v| BootstrapperVersion::plain(self.kind, v))
            .collect())
    }
}
