//! Error types for kindling-core.

use std::fmt;

/// Result type alias using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

type BoxSource = Box<dyn std::error::Error + Send + Sync>;

/// Errors surfaced by the bootstrap engines, version resolver, and remote
/// command channel.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Session establishment to a node failed.
    #[error("failed to connect to node {node}")]
    Connection {
        /// Node the connection was addressed to.
        node: String,
        #[source]
        source: BoxSource,
    },

    /// A remote command returned a non-zero result or could not be started.
    #[error("command failed on node {node}: {command}")]
    Command {
        /// Node the command ran on.
        node: String,
        /// The failing command line.
        command: String,
        #[source]
        source: BoxSource,
    },

    /// A locally executed command failed.
    #[error("local command failed: {command} (exit status {status})")]
    LocalCommand { command: String, status: i32 },

    /// Multiple independent per-node failures from a parallel phase.
    #[error("{0}")]
    Aggregate(AggregateError),

    /// Requested version is not in the supported window and no matching
    /// patch release exists upstream.
    #[error("version not found: bootstrapper={bootstrapper}, version={version}")]
    VersionNotFound {
        bootstrapper: String,
        version: String,
    },

    /// Bootstrapper identifier not recognized.
    #[error("unsupported bootstrapper: {0}")]
    UnsupportedBootstrapper(String),

    /// Cluster configuration missing from the local store.
    #[error("cluster not found: {0}")]
    ClusterNotFound(String),

    /// Cluster initialization attempted over an existing configuration.
    #[error("cluster configuration already exists: {0}")]
    ClusterAlreadyExists(String),

    /// Node missing from the inventory.
    #[error("node not found: {0}")]
    NodeNotFound(String),

    /// Not every node reported running before the wait timeout elapsed.
    #[error("some nodes of cluster {0} are not running")]
    NodesNotRunning(String),

    /// A version string failed to parse as a semantic version.
    #[error("invalid semantic version: {0}")]
    InvalidVersion(String),

    /// Keypair generation or encoding failure.
    #[error("key generation failed: {0}")]
    Key(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// A wrapped error with additional caller context; the cause is kept
    /// intact for diagnostics.
    #[error("{context}")]
    Context {
        context: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Create a connection error for a node.
    #[must_use]
    pub fn connection(node: impl Into<String>, source: impl Into<BoxSource>) -> Self {
        Self::Connection {
            node: node.into(),
            source: source.into(),
        }
    }

    /// Create a remote command error for a node.
    #[must_use]
    pub fn command(
        node: impl Into<String>,
        command: impl Into<String>,
        source: impl Into<BoxSource>,
    ) -> Self {
        Self::Command {
            node: node.into(),
            command: command.into(),
            source: source.into(),
        }
    }

    /// Wrap this error with caller context, preserving the cause.
    #[must_use]
    pub fn context(self, context: impl Into<String>) -> Self {
        Self::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }
}

/// Zero or more independent per-node failures collected during a parallel
/// phase. Never constructed empty by the phase helpers.
#[derive(Debug)]
pub struct AggregateError(Vec<Error>);

impl AggregateError {
    pub fn new(errors: Vec<Error>) -> Self {
        Self(errors)
    }

    pub fn errors(&self) -> &[Error] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl fmt::Display for AggregateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} error(s) occurred:", self.0.len())?;
        for err in &self.0 {
            write!(f, "\n  * {err}")?;
        }
        Ok(())
    }
}

impl std::error::Error for AggregateError {}
