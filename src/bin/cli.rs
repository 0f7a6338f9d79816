//! CLI for object access and cluster operations

use anyhow::Context;
use clap::{Parser, Subcommand};
use placekv::common::{format_bytes, Config, Contents};
use placekv::proxy::MetadataService;
use placekv::{CoordinatorProxy, ObjectValue};
use std::io::Write;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "placekv")]
#[command(about = "placekv distributed object store CLI")]
#[command(version)]
struct Cli {
    /// Configuration file
    #[arg(long, default_value = placekv::common::config::DEFAULT_CONFIG_FILE)]
    config: String,

    /// Coordinator URL
    #[arg(long)]
    coordinator: Option<String>,

    /// Per-RPC timeout in milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Put an object
    Put {
        /// Key
        key: String,

        /// File holding the content
        #[arg(long, conflicts_with = "value")]
        file: Option<PathBuf>,

        /// Inline content
        #[arg(long)]
        value: Option<String>,

        /// Time to live in seconds
        #[arg(long)]
        ttl: Option<u64>,
    },

    /// Get an object
    Get {
        /// Key
        key: String,

        /// Output file (stdout if omitted)
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Delete an object's metadata
    Delete {
        /// Key
        key: String,
    },

    /// Check whether a key exists
    Contains {
        /// Key
        key: String,
    },

    /// Count live keys
    Count,

    /// List storage nodes and their placed bytes
    Nodes,

    /// Coordinator snapshot operations
    Snapshot {
        #[command(subcommand)]
        action: SnapshotAction,
    },
}

#[derive(Subcommand)]
enum SnapshotAction {
    /// Write the coordinator tables to a file on the coordinator host
    Persist { path: PathBuf },
    /// Replace the coordinator tables from a file on the coordinator host
    Load { path: PathBuf },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut proxy_config = Config::load_from(&cli.config)?.proxy;
    if let Some(url) = cli.coordinator {
        proxy_config.coordinator_url = url;
    }
    if let Some(timeout) = cli.timeout_ms {
        proxy_config.rpc_timeout_ms = timeout;
    }
    let proxy = CoordinatorProxy::connect(&proxy_config)?;

    match cli.command {
        Commands::Put {
            key,
            file,
            value,
            ttl,
        } => {
            let data = match (file, value) {
                (Some(path), _) => tokio::fs::read(&path)
                    .await
                    .with_context(|| format!("reading {}", path.display()))?,
                (None, Some(value)) => value.into_bytes(),
                (None, None) => anyhow::bail!("either --file or --value is required"),
            };
            let size = data.len() as u64;
            let object = ObjectValue::with_data(data);
            match ttl {
                Some(ttl) => proxy.put_with_ttl(&key, object, ttl).await?,
                None => proxy.put(&key, object).await?,
            }
            println!("✓ Stored {} ({})", key, format_bytes(size));
        }

        Commands::Get { key, output } => {
            let Some(value) = proxy.get(&key).await? else {
                anyhow::bail!("key not found: {}", key);
            };
            let bytes = match value.contents {
                Contents::Data(bytes) => bytes,
                Contents::Listing(entries) => entries.join("\n").into_bytes(),
                Contents::Empty | Contents::Placement(_) => Vec::new(),
            };
            match output {
                Some(path) => {
                    tokio::fs::write(&path, &bytes).await?;
                    println!("✓ Wrote {} to {}", format_bytes(bytes.len() as u64), path.display());
                }
                None => std::io::stdout().write_all(&bytes)?,
            }
        }

        Commands::Delete { key } => {
            if proxy.delete(&key).await? {
                println!("✓ Deleted {}", key);
            } else {
                println!("{} was not present", key);
            }
        }

        Commands::Contains { key } => {
            println!("{}", proxy.contains(&key).await?);
        }

        Commands::Count => {
            println!("{}", proxy.count().await?);
        }

        Commands::Nodes => {
            let nodes = proxy.metadata().node_loads().await?;
            if nodes.is_empty() {
                println!("No storage nodes registered");
            }
            for node in nodes {
                println!(
                    "{}  {}",
                    node.endpoint,
                    format_bytes(node.aggregate_bytes)
                );
            }
        }

        Commands::Snapshot { action } => match action {
            SnapshotAction::Persist { path } => {
                let records = proxy.metadata().persist_snapshot(&path).await?;
                println!("✓ Persisted {} records to {}", records, path.display());
            }
            SnapshotAction::Load { path } => {
                let records = proxy.metadata().load_snapshot(&path).await?;
                println!("✓ Loaded {} records from {}", records, path.display());
            }
        },
    }

    Ok(())
}
