//! Kindling - Kubernetes cluster bootstrapper
//!
//! Usage:
//!   kindling init <name> --bootstrapper k3s       # Create a cluster config
//!   kindling deploy <name>                        # Bootstrap the cluster
//!   kindling kubeconfig <name>                    # Fetch admin.conf
//!   kindling cache show k3s                       # Inspect the version cache
//!   kindling delete <name>                        # Remove a cluster

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use kindling_core::bootstrap::EngineDeps;
use kindling_core::config::ClusterConfig;
use kindling_core::context::AppContext;
use kindling_core::deploy::ClusterService;
use kindling_core::node::NodeInventory;
use kindling_core::resolver::{ensure_versions, new_finder};
use kindling_core::ssh::{CommanderFactory, SshCommanderFactory};
use kindling_core::types::BootstrapperKind;

const SSH_USER: &str = "root";

#[derive(Parser)]
#[command(name = "kindling")]
#[command(about = "Bootstrap Kubernetes clusters on managed VMs", long_about = None)]
struct Cli {
    /// Home directory override (defaults to ~/.kindling)
    #[arg(long, global = true)]
    home: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a cluster configuration
    Init {
        /// Cluster name
        name: String,

        /// Bootstrap technology (kubeadm, k3s, rke, rke2, k0s, skuba, rancherd)
        #[arg(short, long, default_value = "kubeadm")]
        bootstrapper: BootstrapperKind,

        /// Version to deploy (latest when omitted; vX.Y and vX.Y.Z accepted)
        #[arg(short, long, default_value = "")]
        version: String,

        /// Number of control-plane nodes
        #[arg(long, default_value_t = 1)]
        masters: usize,

        /// Number of worker nodes
        #[arg(long, default_value_t = 0)]
        workers: usize,

        /// Recreate the config and bust the version cache
        #[arg(short, long)]
        force: bool,
    },

    /// Deploy a configured cluster
    Deploy {
        /// Cluster name
        name: String,
    },

    /// Download the admin kubeconfig of a deployed cluster
    Kubeconfig {
        /// Cluster name
        name: String,

        /// Destination directory (cluster dir when omitted)
        #[arg(short, long)]
        dest: Option<PathBuf>,
    },

    /// Manage the cached version windows
    Cache {
        #[command(subcommand)]
        command: CacheCommands,
    },

    /// Delete a cluster configuration and its artifacts
    #[command(alias = "rm")]
    Delete {
        /// Cluster name
        name: String,
    },
}

#[derive(Subcommand)]
enum CacheCommands {
    /// Show the supported versions of a bootstrapper
    Show {
        /// Bootstrapper kind
        bootstrapper: BootstrapperKind,
    },
    /// Drop the cached window of a bootstrapper
    Clear {
        /// Bootstrapper kind
        bootstrapper: BootstrapperKind,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "kindling=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let ctx = match cli.home {
        Some(home) => AppContext::new(home),
        None => AppContext::from_user_home(),
    };

    run(ctx, cli.command).await
}

fn service_for(ctx: &AppContext, prikey: &str) -> ClusterService {
    let deps = EngineDeps {
        factory: Arc::new(SshCommanderFactory::new(SSH_USER, prikey))
            as Arc<dyn CommanderFactory>,
        inventory: Arc::new(ctx.node_inventory()) as Arc<dyn NodeInventory>,
        store: ctx.config_store(),
        bin_dir: ctx.bin_dir(),
    };
    ClusterService::new(deps)
}

async fn run(ctx: AppContext, command: Commands) -> Result<()> {
    match command {
        Commands::Init {
            name,
            bootstrapper,
            version,
            masters,
            workers,
            force,
        } => {
            let mut config = ClusterConfig::new(&name, bootstrapper);
            config.version = version;
            config.master.count = masters;
            config.worker.count = workers;

            // keys do not exist yet; the service generates them
            let service = service_for(&ctx, "");
            let config = service.init_cluster(config, force).await?;
            println!(
                "cluster {} initialized (bootstrapper {}, version {})",
                config.name, config.bootstrapper, config.version
            );
        }

        Commands::Deploy { name } => {
            let store = ctx.config_store();
            let config = store.load_cluster(&name)?;
            let service = service_for(&ctx, &config.prikey);
            let kubeconfig = service.deploy(&name, None).await?;
            println!("cluster {name} deployed, kubeconfig at {}", kubeconfig.display());
        }

        Commands::Kubeconfig { name, dest } => {
            let store = ctx.config_store();
            let config = store.load_cluster(&name)?;
            let service = service_for(&ctx, &config.prikey);
            let path = service.download_kubeconfig(&name, dest.as_deref()).await?;
            println!("{}", path.display());
        }

        Commands::Cache { command } => match command {
            CacheCommands::Show { bootstrapper } => {
                let store = ctx.config_store();
                let finder = new_finder(bootstrapper)?;
                let records = ensure_versions(&*finder, &store).await?;
                print!("{}", serde_yaml::to_string(&records)?);
            }
            CacheCommands::Clear { bootstrapper } => {
                ctx.config_store().delete_version_cache(bootstrapper)?;
                println!("cache cleared for {bootstrapper}");
            }
        },

        Commands::Delete { name } => {
            let service = service_for(&ctx, "");
            service.delete_cluster(&name)?;
            println!("cluster {name} deleted");
        }
    }

    Ok(())
}
