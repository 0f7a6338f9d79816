//! Storage node binary

use clap::{Parser, Subcommand};
use placekv::common::{Config, TlsConfig};
use placekv::StorageNode;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "placekv-node")]
#[command(about = "placekv storage node: raw content store keyed by object key")]
#[command(version)]
struct Cli {
    /// Configuration file
    #[arg(long, default_value = placekv::common::config::DEFAULT_CONFIG_FILE)]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start storage node
    Serve {
        /// Bind address for the blob surface
        #[arg(long)]
        bind: Option<SocketAddr>,

        /// URL the coordinator hands out for this node
        #[arg(long)]
        advertise: Option<String>,

        /// Coordinator URL to register with
        #[arg(long)]
        coordinator: Option<String>,

        /// Data directory (in-memory when omitted)
        #[arg(long)]
        data: Option<PathBuf>,

        /// Largest accepted blob in bytes
        #[arg(long)]
        max_blob_size: Option<u64>,

        /// PEM certificate; enables TLS together with --tls-key
        #[arg(long, requires = "tls_key")]
        tls_cert: Option<PathBuf>,

        /// PEM private key
        #[arg(long, requires = "tls_cert")]
        tls_key: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::load_from(&cli.config)?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match cli.command {
        Commands::Serve {
            bind,
            advertise,
            coordinator,
            data,
            max_blob_size,
            tls_cert,
            tls_key,
        } => {
            let mut node_config = config.node;
            if let Some(bind) = bind {
                node_config.bind_addr = bind;
            }
            if advertise.is_some() {
                node_config.advertise_url = advertise;
            }
            if let Some(url) = coordinator {
                node_config.coordinator_url = url;
            }
            if data.is_some() {
                node_config.data_path = data;
            }
            if let Some(max) = max_blob_size {
                node_config.max_blob_size = max;
            }
            if let (Some(cert_path), Some(key_path)) = (tls_cert, tls_key) {
                node_config.tls = Some(TlsConfig {
                    cert_path,
                    key_path,
                });
            }

            if let Some(path) = &node_config.data_path {
                tokio::fs::create_dir_all(path).await?;
            }

            StorageNode::new(node_config).serve().await?;
        }
    }

    Ok(())
}
