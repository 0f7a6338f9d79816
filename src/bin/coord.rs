//! Coordinator binary

use clap::{Parser, Subcommand};
use placekv::common::{parse_duration, Config, TlsConfig};
use placekv::Coordinator;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "placekv-coord")]
#[command(about = "placekv coordinator: TTL metadata and storage-node placement")]
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
    /// Start coordinator server
    Serve {
        /// Bind address for the RPC surface
        #[arg(long)]
        bind: Option<SocketAddr>,

        /// Minimum time between expiration sweeps (e.g. 30s, 5m)
        #[arg(long)]
        sweep_interval: Option<String>,

        /// Snapshot loaded at startup and written on shutdown
        #[arg(long)]
        snapshot: Option<PathBuf>,

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

    // Load config from file and environment, then override with CLI arguments
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
            sweep_interval,
            snapshot,
            tls_cert,
            tls_key,
        } => {
            let mut coord_config = config.coordinator;
            if let Some(bind) = bind {
                coord_config.bind_addr = bind;
            }
            if let Some(interval) = sweep_interval {
                coord_config.sweep_interval_secs = parse_duration(&interval)?.as_secs();
            }
            if snapshot.is_some() {
                coord_config.snapshot_path = snapshot;
            }
            if let (Some(cert_path), Some(key_path)) = (tls_cert, tls_key) {
                coord_config.tls = Some(TlsConfig {
                    cert_path,
                    key_path,
                });
            }

            Coordinator::new(coord_config).serve().await?;
        }
    }

    Ok(())
}
