//! Kindling Core Library
//!
//! Provides the domain logic for bootstrapping Kubernetes-compatible
//! clusters on externally managed nodes: version resolution, the remote
//! command channel, per-distribution bootstrap engines, and the cluster
//! lifecycle facade.

pub mod bootstrap;
pub mod config;
pub mod context;
pub mod deploy;
pub mod error;
pub mod exec;
pub mod node;
pub mod resolver;
pub mod script;
pub mod ssh;
pub mod types;
pub mod version;

/// Re-exports of commonly used types
pub mod prelude {
    // Lifecycle
    pub use crate::deploy::{ClusterService, PreStep};

    // Engines
    pub use crate::bootstrap::{new_bootstrapper, Bootstrapper, EngineDeps, JoinCredential};

    // Configuration
    pub use crate::config::{
        BootstrapperVersion, Cluster, ClusterConfig, ConfigStore, NodeGroup,
    };
    pub use crate::context::AppContext;

    // Nodes and the command channel
    pub use crate::node::{FileInventory, Node, NodeInventory, NodeRole, NodeStatus};
    pub use crate::ssh::{
        CommandOutput, Commander, CommanderFactory, OutputMode, RemoteCommand, SshCommander,
        SshCommanderFactory,
    };

    // Versioning
    pub use crate::resolver::{new_finder, resolve_version, VersionFinder};
    pub use crate::types::BootstrapperKind;
    pub use crate::version::{Version, SUPPORTED_MINOR_VERSION_COUNT};

    // Errors
    pub use crate::error::{Error, Result};
}
