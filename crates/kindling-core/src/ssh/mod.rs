//! Remote command channel abstraction.
//!
//! Engines never talk to `ssh2` directly; they receive a
//! [`CommanderFactory`] and open a [`Commander`] per node. Tests swap in
//! recording mocks.

mod client;

use std::path::Path;

use async_trait::async_trait;

use crate::error::Result;
use crate::node::Node;

pub use client::{SshCommander, SshCommanderFactory};

/// What to do with a remote command's stdout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Stream to the log, keep nothing.
    Discard,
    /// Collect stdout for the caller.
    Capture,
}

/// A single command to run on a node.
#[derive(Debug, Clone)]
pub struct RemoteCommand {
    pub line: String,
    pub output: OutputMode,
    /// Disabled commands are skipped without being sent.
    pub enabled: bool,
}

impl RemoteCommand {
    /// A command whose output is discarded.
    pub fn new(line: impl Into<String>) -> Self {
        Self {
            line: line.into(),
            output: OutputMode::Discard,
            enabled: true,
        }
    }

    /// A command whose stdout is captured and returned.
    pub fn capture(line: impl Into<String>) -> Self {
        Self {
            line: line.into(),
            output: OutputMode::Capture,
            enabled: true,
        }
    }

    pub fn enabled_if(mut self, condition: bool) -> Self {
        self.enabled = condition;
        self
    }
}

/// Result of one executed remote command.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub command: String,
    /// Captured stdout, empty for [`OutputMode::Discard`].
    pub stdout: String,
}

/// An established session to one node.
#[async_trait]
pub trait Commander: Send + Sync {
    /// Run commands in order. The first failure aborts the remainder and
    /// carries node and command context.
    async fn run(&self, commands: &[RemoteCommand]) -> Result<Vec<CommandOutput>>;

    /// Copy a remote file to a local destination, creating parent
    /// directories as needed.
    async fn download(&self, remote_path: &str, dest: &Path) -> Result<()>;

    /// Tear the session down. Idempotent.
    async fn close(&self) -> Result<()>;
}

/// Opens sessions to nodes. Injected into engines so tests can substitute
/// an in-memory implementation.
#[async_trait]
pub trait CommanderFactory: Send + Sync {
    async fn connect(&self, node: &Node) -> Result<Box<dyn Commander>>;
}
